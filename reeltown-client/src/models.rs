//! Wire types for the Reeltown API. One struct per payload shape, validated
//! at the HTTP adapter boundary: a response that doesn't decode into its
//! declared type is a decode error, never a half-populated value.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Moderator,
    Admin,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
    Deactivated,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub created_at: String,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AccountStatus>,
}

impl User {
    pub fn is_moderator(&self) -> bool {
        self.roles
            .iter()
            .any(|role| matches!(role, Role::Moderator | Role::Admin))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Pending,
    Published,
    Rejected,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    pub title: String,
    pub description: String,
    pub youtube_url: String,
    pub youtube_id: String,
    pub creator_id: String,
    pub creator: String,
    pub duration: String,
    pub views: u64,
    pub rating: f64,
    pub tags: Vec<String>,
    pub upload_date: String,
    pub status: VideoStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub video_id: String,
    pub user_id: String,
    pub user: String,
    pub text: String,
    pub sentiment: Sentiment,
    pub created_at: String,
}

/// The aggregate rating for one video, plus the requesting user's own rating
/// when the request was authenticated. `average_rating` is always the weighted
/// mean of all individual ratings; the optimistic prediction in
/// [`crate::ratings`] preserves that.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub video_id: String,
    pub average_rating: f64,
    pub total_ratings_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_user_rating: Option<u8>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FlagStatus {
    Pending,
    Resolved,
    Dismissed,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<String>,
    pub user_id: String,
    pub reason: String,
    pub description: String,
    pub status: FlagStatus,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
}

// --- request bodies ---

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VideoSubmitRequest {
    pub title: String,
    pub description: String,
    pub youtube_url: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct VideoUpdateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FlagRequest {
    pub reason: String,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FlagAction {
    Approve,
    Reject,
    Dismiss,
}

// --- responses ---

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatusResponse {
    pub video_id: String,
    pub status: VideoStatus,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub page: u32,
    pub page_size: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl PageInfo {
    /// Whether a "load more" would fetch anything.
    pub fn has_more(&self) -> bool {
        self.page < self.total_pages
    }
}

/// Every list endpoint returns its data array plus pagination metadata.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Paged<T> {
    pub data: Vec<T>,
    pub pagination: PageInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_decodes_from_wire_shape() {
        let body = r#"{
            "id": "v1",
            "title": "Intro to partitioning",
            "description": "part one",
            "youtubeUrl": "https://youtube.com/watch?v=abc",
            "youtubeId": "abc",
            "creatorId": "u1",
            "creator": "ada",
            "duration": "12:03",
            "views": 41,
            "rating": 4.5,
            "tags": ["databases"],
            "uploadDate": "2024-11-02T10:00:00Z",
            "status": "published"
        }"#;
        let video: Video = serde_json::from_str(body).expect("video should decode");
        assert_eq!(video.status, VideoStatus::Published);
        assert_eq!(video.thumbnail, None);
    }

    #[test]
    fn test_missing_required_field_is_a_decode_error() {
        // no silent undefined-shaped values: a body without `views` fails fast
        let body = r#"{"id": "v1", "title": "x"}"#;
        assert!(serde_json::from_str::<Video>(body).is_err());
    }

    #[test]
    fn test_page_info_has_more() {
        let mut page = PageInfo {
            page: 1,
            page_size: 20,
            total_items: 45,
            total_pages: 3,
        };
        assert!(page.has_more());
        page.page = 3;
        assert!(!page.has_more());
    }

    #[test]
    fn test_moderator_check_covers_admin() {
        let user = User {
            id: "u1".into(),
            username: "ada".into(),
            email: "ada@example.com".into(),
            created_at: "2024-01-01T00:00:00Z".into(),
            roles: vec![Role::Admin],
            status: None,
        };
        assert!(user.is_moderator());
    }
}
