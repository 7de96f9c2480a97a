//! Comment endpoints. Comments churn quickly, so their cache horizon is
//! short, and adding one invalidates the video's comment pages outright.
//! The server assigns the id, the timestamp, and the sentiment, so there is
//! nothing worth predicting locally.

use undertow::QueryKey;

use crate::ReeltownClient;
use crate::api::{Method, Transport};
use crate::error::ApiError;
use crate::models::{Comment, Paged};
use crate::policy;

fn comments_key(video_id: &str) -> QueryKey {
    QueryKey::new(["comments"]).child(video_id)
}

impl<T: Transport + 'static> ReeltownClient<T> {
    pub async fn add_comment(&self, video_id: &str, text: &str) -> Result<Comment, ApiError> {
        let body = serde_json::json!({ "text": text });
        let comment: Comment = self
            .api
            .request(
                Method::Post,
                &format!("/videos/{video_id}/comments"),
                Some(&body),
            )
            .await?;
        self.cache
            .borrow_mut()
            .invalidate_prefix(&comments_key(video_id));
        Ok(comment)
    }

    pub async fn comments(&self, video_id: &str, page: u32) -> Result<Paged<Comment>, ApiError> {
        self.get_cached(
            comments_key(video_id).child(page.to_string()),
            policy::comments(),
            format!("/videos/{video_id}/comments?page={page}"),
        )
        .await
    }

    pub async fn comments_by_user(
        &self,
        user_id: &str,
        page: u32,
    ) -> Result<Paged<Comment>, ApiError> {
        self.get_cached(
            QueryKey::new(["comments", "by-user"])
                .child(user_id)
                .child(page.to_string()),
            policy::comments(),
            format!("/users/{user_id}/comments?page={page}"),
        )
        .await
    }
}
