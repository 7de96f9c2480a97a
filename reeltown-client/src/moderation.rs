//! The moderation console: flags, the review queue, and moderator role
//! management. Queue data is kept on a short horizon, since moderators act
//! on what they see.

use undertow::QueryKey;

use crate::ReeltownClient;
use crate::api::{Method, NO_BODY, Transport};
use crate::error::ApiError;
use crate::models::{Flag, FlagAction, FlagRequest, Paged, User};
use crate::policy;

fn moderation_prefix() -> QueryKey {
    QueryKey::new(["moderation"])
}

fn video_flags_key(video_id: &str) -> QueryKey {
    QueryKey::new(["flags", "video"]).child(video_id)
}

impl<T: Transport + 'static> ReeltownClient<T> {
    /// Report a video. The reporter's view of the video's flags and the
    /// moderation queue both go stale immediately.
    pub async fn flag_video(&self, video_id: &str, request: &FlagRequest) -> Result<Flag, ApiError> {
        let flag: Flag = self
            .api
            .request(
                Method::Post,
                &format!("/videos/{video_id}/flags"),
                Some(request),
            )
            .await?;
        let mut cache = self.cache.borrow_mut();
        cache.invalidate_prefix(&video_flags_key(video_id));
        cache.invalidate_prefix(&moderation_prefix());
        Ok(flag)
    }

    /// Report a comment.
    pub async fn flag_comment(
        &self,
        comment_id: &str,
        request: &FlagRequest,
    ) -> Result<Flag, ApiError> {
        let flag: Flag = self
            .api
            .request(
                Method::Post,
                &format!("/comments/{comment_id}/flags"),
                Some(request),
            )
            .await?;
        self.cache
            .borrow_mut()
            .invalidate_prefix(&moderation_prefix());
        Ok(flag)
    }

    pub async fn video_flags(&self, video_id: &str) -> Result<Vec<Flag>, ApiError> {
        self.get_cached(
            video_flags_key(video_id),
            policy::moderation(),
            format!("/videos/{video_id}/flags"),
        )
        .await
    }

    /// The queue of open flags awaiting review.
    pub async fn moderation_queue(&self, page: u32) -> Result<Paged<Flag>, ApiError> {
        self.get_cached(
            moderation_prefix().child("flags").child(page.to_string()),
            policy::moderation(),
            format!("/moderation/flags?page={page}"),
        )
        .await
    }

    pub async fn flag_detail(&self, flag_id: &str) -> Result<Flag, ApiError> {
        self.get_cached(
            moderation_prefix().child("flag").child(flag_id),
            policy::moderation(),
            format!("/moderation/flags/{flag_id}"),
        )
        .await
    }

    /// Resolve a flag. The whole moderation view is stale afterwards: the
    /// queue shrank, the detail changed, counts moved.
    pub async fn action_flag(&self, flag_id: &str, action: FlagAction) -> Result<Flag, ApiError> {
        let body = serde_json::json!({ "action": action });
        let flag: Flag = self
            .api
            .request(
                Method::Post,
                &format!("/moderation/flags/{flag_id}/action"),
                Some(&body),
            )
            .await?;
        self.cache
            .borrow_mut()
            .invalidate_prefix(&moderation_prefix());
        Ok(flag)
    }

    /// Find accounts by name or email, for the user management screen.
    /// Uncached on purpose: role decisions should see current state.
    pub async fn search_users(&self, query: &str) -> Result<Paged<User>, ApiError> {
        self.api
            .request(
                Method::Get,
                &format!("/moderation/users?query={query}"),
                NO_BODY,
            )
            .await
    }

    pub async fn assign_moderator(&self, user_id: &str) -> Result<(), ApiError> {
        self.api
            .request_no_content(
                Method::Post,
                &format!("/moderation/users/{user_id}/moderator"),
                NO_BODY,
            )
            .await
    }

    pub async fn revoke_moderator(&self, user_id: &str) -> Result<(), ApiError> {
        self.api
            .request_no_content(
                Method::Delete,
                &format!("/moderation/users/{user_id}/moderator"),
                NO_BODY,
            )
            .await
    }
}
