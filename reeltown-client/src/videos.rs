//! Video endpoints, including the optimistic view-count increment.

use chrono::Utc;
use undertow::{OptimisticMutation, QueryKey};

use crate::ReeltownClient;
use crate::api::{Method, NO_BODY, Transport};
use crate::error::ApiError;
use crate::models::{Paged, Video, VideoStatusResponse, VideoSubmitRequest, VideoUpdateRequest};
use crate::policy;

pub(crate) fn videos_prefix() -> QueryKey {
    QueryKey::new(["videos"])
}

pub(crate) fn video_key(video_id: &str) -> QueryKey {
    videos_prefix().child(video_id)
}

fn video_list_key(kind: &str, param: &str, page: u32) -> QueryKey {
    videos_prefix()
        .child(kind)
        .child(param)
        .child(page.to_string())
}

impl<T: Transport + 'static> ReeltownClient<T> {
    /// Submit a video by external URL. The new video invalidates every video
    /// list, since it may appear in any of them once published.
    pub async fn submit_video(&self, request: &VideoSubmitRequest) -> Result<Video, ApiError> {
        let video: Video = self
            .api
            .request(Method::Post, "/videos", Some(request))
            .await?;
        self.cache.borrow_mut().invalidate_prefix(&videos_prefix());
        self.overwrite_cached(video_key(&video.id), policy::video(), &video)?;
        Ok(video)
    }

    pub async fn fetch_video(&self, video_id: &str) -> Result<Video, ApiError> {
        self.get_cached(
            video_key(video_id),
            policy::video(),
            format!("/videos/{video_id}"),
        )
        .await
    }

    /// The last-known video detail, without touching the network.
    pub fn video(&self, video_id: &str) -> Option<Video> {
        self.read_cached(&video_key(video_id))
    }

    /// Processing status for a just-submitted video. Polled while pending, so
    /// it's effectively uncached.
    pub async fn fetch_video_status(&self, video_id: &str) -> Result<VideoStatusResponse, ApiError> {
        self.get_cached(
            video_key(video_id).child("status"),
            policy::video_status(),
            format!("/videos/{video_id}/status"),
        )
        .await
    }

    pub async fn update_video(
        &self,
        video_id: &str,
        update: &VideoUpdateRequest,
    ) -> Result<Video, ApiError> {
        let video: Video = self
            .api
            .request(Method::Put, &format!("/videos/{video_id}"), Some(update))
            .await?;
        self.overwrite_cached(video_key(video_id), policy::video(), &video)?;
        Ok(video)
    }

    /// Count a view, optimistically: every subscribed view sees the bumped
    /// count immediately, and the server's count supersedes it on settlement.
    /// Never retried: a retry would double-count the view.
    pub async fn record_view(&self, video_id: &str) -> Result<Video, ApiError> {
        let key = video_key(video_id);
        let mut predictions = Vec::new();
        if let Some(mut video) = self.video(video_id) {
            video.views += 1;
            let predicted =
                serde_json::to_value(&video).map_err(|e| ApiError::Decode(e.to_string()))?;
            predictions.push((key.clone(), predicted, policy::video()));
        }
        let mutation =
            OptimisticMutation::begin(&self.cache, &self.pool, predictions, Utc::now());

        match self
            .api
            .request::<Video>(Method::Post, &format!("/videos/{video_id}/view"), NO_BODY)
            .await
        {
            Ok(video) => {
                let authoritative = serde_json::to_value(&video)
                    .map_err(|e| ApiError::Decode(e.to_string()))?;
                mutation.settle_success(
                    &self.cache,
                    &self.pool,
                    vec![(key, authoritative)],
                    Utc::now(),
                );
                Ok(video)
            }
            Err(e) => {
                mutation.settle_failure(&self.cache, &self.pool);
                Err(e)
            }
        }
    }

    pub async fn latest_videos(&self, page: u32) -> Result<Paged<Video>, ApiError> {
        self.get_cached(
            video_list_key("latest", "all", page),
            policy::video(),
            format!("/videos/latest?page={page}"),
        )
        .await
    }

    pub async fn videos_by_tag(&self, tag: &str, page: u32) -> Result<Paged<Video>, ApiError> {
        self.get_cached(
            video_list_key("by-tag", tag, page),
            policy::video(),
            format!("/videos/by-tag/{tag}?page={page}"),
        )
        .await
    }

    pub async fn videos_by_user(&self, user_id: &str, page: u32) -> Result<Paged<Video>, ApiError> {
        self.get_cached(
            video_list_key("by-user", user_id, page),
            policy::video(),
            format!("/users/{user_id}/videos?page={page}"),
        )
        .await
    }

    /// Most-viewed videos over a recent window.
    pub async fn trending_videos(&self, days: u32, limit: u32) -> Result<Vec<Video>, ApiError> {
        self.get_cached(
            videos_prefix()
                .child("trending")
                .child(days.to_string())
                .child(limit.to_string()),
            policy::video(),
            format!("/videos/trending?days={days}&limit={limit}"),
        )
        .await
    }
}
