//! Ratings: the aggregate endpoint, the optimistic submission flow, and the
//! streaming-mean arithmetic that predicts the post-submission aggregate.

use chrono::Utc;
use undertow::{OptimisticMutation, QueryKey};

use crate::ReeltownClient;
use crate::api::{Method, Transport};
use crate::error::ApiError;
use crate::models::RatingSummary;
use crate::policy;
use crate::videos::video_key;

pub(crate) fn ratings_key(video_id: &str) -> QueryKey {
    QueryKey::new(["ratings"]).child(video_id)
}

/// Predict the aggregate after `user_rating` is applied.
///
/// A first-time rater grows the count and folds into the mean; a re-rating
/// keeps the count and swaps the old contribution for the new one. Replaying
/// any submission sequence through this against a fresh aggregate converges
/// to the server's weighted mean (within float tolerance), which is what
/// makes the prediction safe to show before the server confirms.
pub fn predict_rating(
    prior: Option<&RatingSummary>,
    video_id: &str,
    user_rating: u8,
) -> RatingSummary {
    let rating = f64::from(user_rating);
    match prior {
        None => RatingSummary {
            video_id: video_id.to_string(),
            average_rating: rating,
            total_ratings_count: 1,
            current_user_rating: Some(user_rating),
        },
        Some(prior) => {
            let count = prior.total_ratings_count;
            let (new_count, new_average) = match prior.current_user_rating {
                // updating an earlier rating: count unchanged, swap the
                // contribution
                Some(previous) if count > 0 => {
                    let count_f = count as f64;
                    (
                        count,
                        (prior.average_rating * count_f - f64::from(previous) + rating) / count_f,
                    )
                }
                // first rating from this user
                _ => {
                    let new_count = count + 1;
                    (
                        new_count,
                        (prior.average_rating * count as f64 + rating) / new_count as f64,
                    )
                }
            };
            RatingSummary {
                video_id: prior.video_id.clone(),
                average_rating: new_average,
                total_ratings_count: new_count,
                current_user_rating: Some(user_rating),
            }
        }
    }
}

impl<T: Transport + 'static> ReeltownClient<T> {
    pub async fn fetch_ratings(&self, video_id: &str) -> Result<RatingSummary, ApiError> {
        self.get_cached(
            ratings_key(video_id),
            policy::ratings(),
            format!("/videos/{video_id}/ratings"),
        )
        .await
    }

    /// The last-known aggregate, without touching the network.
    pub fn ratings(&self, video_id: &str) -> Option<RatingSummary> {
        self.read_cached(&ratings_key(video_id))
    }

    /// Submit a rating optimistically.
    ///
    /// The predicted aggregate (and the video detail's rating, if cached) is
    /// visible to every subscriber before the request is sent. On success the
    /// server's aggregate (which may differ if someone else rated concurrently)
    /// supersedes the prediction, and the video detail is invalidated for
    /// refetch. On failure the exact pre-mutation entries come back before the
    /// error reaches the caller. Never retried automatically: a duplicate
    /// submission would double-apply.
    pub async fn rate_video(&self, video_id: &str, rating: u8) -> Result<RatingSummary, ApiError> {
        let key = ratings_key(video_id);
        let detail_key = video_key(video_id);

        let prior: Option<RatingSummary> = self.read_cached(&key);
        let predicted = predict_rating(prior.as_ref(), video_id, rating);

        let mut predictions = vec![(
            key.clone(),
            serde_json::to_value(&predicted).map_err(|e| ApiError::Decode(e.to_string()))?,
            policy::ratings(),
        )];
        if let Some(mut video) = self.video(video_id) {
            video.rating = predicted.average_rating;
            predictions.push((
                detail_key,
                serde_json::to_value(&video).map_err(|e| ApiError::Decode(e.to_string()))?,
                policy::video(),
            ));
        }

        let mutation =
            OptimisticMutation::begin(&self.cache, &self.pool, predictions, Utc::now());

        let body = serde_json::json!({ "rating": rating });
        match self
            .api
            .request::<RatingSummary>(
                Method::Post,
                &format!("/videos/{video_id}/ratings"),
                Some(&body),
            )
            .await
        {
            Ok(summary) => {
                let authoritative = serde_json::to_value(&summary)
                    .map_err(|e| ApiError::Decode(e.to_string()))?;
                // the video detail key gets no authoritative value here, so
                // settlement invalidates it for refetch
                mutation.settle_success(
                    &self.cache,
                    &self.pool,
                    vec![(key, authoritative)],
                    Utc::now(),
                );
                Ok(summary)
            }
            Err(e) => {
                mutation.settle_failure(&self.cache, &self.pool);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    #[test]
    fn test_first_rating_ever() {
        let predicted = predict_rating(None, "v1", 4);
        assert_eq!(predicted.total_ratings_count, 1);
        assert!((predicted.average_rating - 4.0).abs() < TOLERANCE);
        assert_eq!(predicted.current_user_rating, Some(4));
    }

    #[test]
    fn test_first_time_rater_grows_count() {
        let prior = RatingSummary {
            video_id: "v1".into(),
            average_rating: 4.0,
            total_ratings_count: 3,
            current_user_rating: None,
        };
        let predicted = predict_rating(Some(&prior), "v1", 5);
        assert_eq!(predicted.total_ratings_count, 4);
        // (4.0 * 3 + 5) / 4
        assert!((predicted.average_rating - 4.25).abs() < TOLERANCE);
    }

    #[test]
    fn test_re_rating_keeps_count_and_swaps_contribution() {
        let prior = RatingSummary {
            video_id: "v1".into(),
            average_rating: 4.0,
            total_ratings_count: 4,
            current_user_rating: Some(2),
        };
        let predicted = predict_rating(Some(&prior), "v1", 5);
        assert_eq!(predicted.total_ratings_count, 4);
        // (4.0 * 4 - 2 + 5) / 4
        assert!((predicted.average_rating - 4.75).abs() < TOLERANCE);
    }

    #[test]
    fn test_replay_converges_to_true_mean() {
        let ratings = [5u8, 3, 4, 1, 5, 2, 4, 4, 3, 5];
        let mut aggregate: Option<RatingSummary> = None;
        for rating in ratings {
            // each submission comes from a fresh user
            let mut next = predict_rating(aggregate.as_ref(), "v1", rating);
            next.current_user_rating = None;
            aggregate = Some(next);
        }
        let aggregate = aggregate.expect("aggregate after ten ratings");
        let true_mean = ratings.iter().map(|&r| f64::from(r)).sum::<f64>() / ratings.len() as f64;

        assert_eq!(aggregate.total_ratings_count, ratings.len() as u64);
        assert!((aggregate.average_rating - true_mean).abs() < TOLERANCE);
    }

    #[test]
    fn test_two_ratings_by_same_user_shift_mean_by_difference() {
        let base = RatingSummary {
            video_id: "v1".into(),
            average_rating: 3.5,
            total_ratings_count: 9,
            current_user_rating: None,
        };
        let first = predict_rating(Some(&base), "v1", 1);
        let second = predict_rating(Some(&first), "v1", 5);

        assert_eq!(first.total_ratings_count, second.total_ratings_count);
        let expected =
            (first.average_rating * first.total_ratings_count as f64 - 1.0 + 5.0)
                / first.total_ratings_count as f64;
        assert!((second.average_rating - expected).abs() < TOLERANCE);
    }
}
