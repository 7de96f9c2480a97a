use serde::{Deserialize, Serialize};

/// The structured error payload the API returns (an RFC 7807 problem body).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl Problem {
    /// Stand-in for responses whose error body didn't parse. The status code
    /// is all we actually know at that point.
    pub(crate) fn from_status(status: u16) -> Self {
        Self {
            problem_type: "about:blank".to_string(),
            title: format!("HTTP {status}"),
            status,
            detail: None,
            instance: None,
        }
    }
}

/// Everything a request can fail with. `Clone` because errors flow through
/// shared in-flight futures, where every waiter gets its own copy.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// The server rejected our token or credentials. When this comes back on
    /// any request, the whole session is invalid, not just that request.
    #[error("authentication rejected: {}", .0.title)]
    AuthRejected(Problem),

    /// A structured error from the API (validation failure, forbidden,
    /// conflict, ...). The detail string is meant for the user verbatim.
    #[error("{} ({})", .0.title, .0.status)]
    Api(Problem),

    /// The request never produced a usable response.
    #[error("network error: {0}")]
    Network(String),

    /// The response arrived but wasn't the shape the endpoint declares.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    /// The human-readable detail, when the server provided one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::AuthRejected(problem) | ApiError::Api(problem) => problem.detail.as_deref(),
            ApiError::Network(_) | ApiError::Decode(_) => None,
        }
    }

    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, ApiError::AuthRejected(_))
    }

    /// Not-found is an empty state, not a failure; callers render it as such.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Api(problem) if problem.status == 404)
    }
}
