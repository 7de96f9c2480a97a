//! Search and the tag vocabulary.

use undertow::QueryKey;

use crate::ReeltownClient;
use crate::api::Transport;
use crate::error::ApiError;
use crate::models::{Paged, Video};
use crate::policy;

#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub query: Option<String>,
    pub tags: Vec<String>,
    pub page: u32,
}

impl SearchParams {
    pub fn query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }

    /// The canonical query string. Also the cache fingerprint, so the same
    /// search within the staleness window reuses the same entry.
    fn to_query_string(&self) -> String {
        let mut parts = Vec::new();
        if let Some(query) = &self.query {
            parts.push(format!("query={query}"));
        }
        for tag in &self.tags {
            parts.push(format!("tags={tag}"));
        }
        parts.push(format!("page={}", self.page));
        parts.join("&")
    }
}

impl<T: Transport + 'static> ReeltownClient<T> {
    pub async fn search_videos(&self, params: &SearchParams) -> Result<Paged<Video>, ApiError> {
        let query_string = params.to_query_string();
        self.get_cached(
            QueryKey::new(["search", "videos"]).child(query_string.as_str()),
            policy::search(),
            format!("/search/videos?{query_string}"),
        )
        .await
    }

    /// The tag vocabulary, for suggestion dropdowns. Near-static.
    pub async fn tag_suggestions(&self) -> Result<Vec<String>, ApiError> {
        self.get_cached(
            QueryKey::new(["tags", "suggestions"]),
            policy::tags(),
            "/tags/suggest".to_string(),
        )
        .await
    }
}
