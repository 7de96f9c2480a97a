//! Recommendations: related-to-a-video and the personalized "for you" row.
//! Both are computed server-side; this layer only decides how long they're
//! worth keeping.

use undertow::QueryKey;

use crate::ReeltownClient;
use crate::api::Transport;
use crate::error::ApiError;
use crate::models::Video;
use crate::policy;

fn recommendations_prefix() -> QueryKey {
    QueryKey::new(["recommendations"])
}

impl<T: Transport + 'static> ReeltownClient<T> {
    pub async fn related_videos(&self, video_id: &str) -> Result<Vec<Video>, ApiError> {
        self.get_cached(
            recommendations_prefix().child("related").child(video_id),
            policy::recommendations(),
            format!("/videos/{video_id}/related"),
        )
        .await
    }

    /// Personalized recommendations for the logged-in user. Cleared on logout
    /// along with the rest of the per-user entries.
    pub async fn personalized_recommendations(&self) -> Result<Vec<Video>, ApiError> {
        self.get_cached(
            recommendations_prefix().child("foryou"),
            policy::recommendations(),
            "/recommendations/foryou".to_string(),
        )
        .await
    }
}
