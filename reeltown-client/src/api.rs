//! The HTTP client adapter: one place where requests pick up the bearer
//! token, responses get decoded into their declared types, and a 401 from
//! anywhere tears down the session.

use std::rc::Rc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ApiError, Problem};
use crate::session::SessionStore;

#[cfg(not(feature = "local-backend"))]
pub const DEFAULT_BASE_URL: &str = "https://api.reeltown.watch/api/v1";
#[cfg(feature = "local-backend")]
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api/v1";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// One request as the transport sees it: a path relative to the API base and
/// an already-serialized body. Keeping this plain makes fakes trivial.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub bearer: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The seam between the adapter and the wire. The real implementation is
/// [`HttpTransport`]; tests substitute a scripted one.
pub trait Transport {
    fn send(&self, request: ApiRequest) -> impl Future<Output = Result<ApiResponse, String>>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, String> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };
        if let Some(token) = &request.bearer {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| format!("{e:?}"))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| format!("{e:?}"))?;
        Ok(ApiResponse { status, body })
    }
}

pub struct ApiClient<T> {
    transport: T,
    session: Rc<SessionStore>,
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: T, session: Rc<SessionStore>) -> Self {
        Self { transport, session }
    }

    /// Send a request and decode the response into `R`. A body that doesn't
    /// match `R` is a [`ApiError::Decode`], raised here at the boundary.
    pub async fn request<R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> Result<R, ApiError> {
        let response = self.send_raw(method, path, body).await?;
        serde_json::from_str(&response.body)
            .map_err(|e| ApiError::Decode(format!("{method:?} {path}: {e}")))
    }

    /// For endpoints whose success response carries nothing we use.
    pub async fn request_no_content(
        &self,
        method: Method,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> Result<(), ApiError> {
        self.send_raw(method, path, body).await.map(|_| ())
    }

    async fn send_raw(
        &self,
        method: Method,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> Result<ApiResponse, ApiError> {
        let body = match body {
            Some(body) => Some(
                serde_json::to_value(body)
                    .map_err(|e| ApiError::Decode(format!("{method:?} {path}: {e}")))?,
            ),
            None => None,
        };
        let request = ApiRequest {
            method,
            path: path.to_string(),
            body,
            bearer: self.session.token(),
        };

        let response = self
            .transport
            .send(request)
            .await
            .map_err(ApiError::Network)?;

        if response.status == 401 {
            // a rejected token means the whole session is invalid, no matter
            // which resource we were after
            log::warn!("Authentication rejected on {method:?} {path}; clearing session");
            self.session.clear();
            return Err(ApiError::AuthRejected(decode_problem(&response)));
        }
        if !response.ok() {
            return Err(ApiError::Api(decode_problem(&response)));
        }
        Ok(response)
    }
}

fn decode_problem(response: &ApiResponse) -> Problem {
    serde_json::from_str(&response.body).unwrap_or_else(|e| {
        log::warn!("Unparseable error body (status {}): {e}", response.status);
        Problem::from_status(response.status)
    })
}

/// `None` with a concrete type, for bodyless requests.
pub const NO_BODY: Option<&()> = None;
