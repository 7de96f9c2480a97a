use std::cell::RefCell;

use chrono::{DateTime, Utc};

use crate::data_model::{CacheEntry, CachePolicy, FetchPool, QueryCache, QueryKey};

struct MutationRecord {
    key: QueryKey,
    prior: Option<CacheEntry>,
    policy: CachePolicy,
    generation: u64,
}

/// One in-flight optimistic mutation: the snapshot taken before the predicted
/// values were written, plus the generation each key was claimed at.
///
/// Lifecycle: [`OptimisticMutation::begin`] captures the snapshot, writes the
/// predictions, and cancels outstanding fetches for the touched keys. Exactly
/// one of [`settle_success`](Self::settle_success) or
/// [`settle_failure`](Self::settle_failure) consumes it. A settlement is a
/// no-op for any key whose generation has moved on: a later mutation already
/// owns that key, and last-writer-wins is ordered by mutation start time.
#[must_use = "an optimistic mutation must be settled, or the prediction stays in the cache"]
pub struct OptimisticMutation {
    records: Vec<MutationRecord>,
}

impl OptimisticMutation {
    /// Pending-local: snapshot the current entries for the predicted keys and
    /// write the predictions so every subscribed view updates immediately.
    pub fn begin<E: Clone + 'static>(
        cache: &RefCell<QueryCache>,
        pool: &FetchPool<E>,
        predictions: Vec<(QueryKey, serde_json::Value, CachePolicy)>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut records = Vec::with_capacity(predictions.len());
        for (key, predicted, policy) in predictions {
            let generation = pool.bump(&key);
            let prior = cache.borrow().get(&key).cloned();
            cache.borrow_mut().set(key.clone(), predicted, policy, now);
            records.push(MutationRecord {
                key,
                prior,
                policy,
                generation,
            });
        }
        Self { records }
    }

    /// Settled-success: the server's values supersede the predictions,
    /// correcting for any divergence (e.g. another concurrent rater).
    /// Snapshotted keys with no authoritative value are invalidated so the
    /// next read refetches.
    pub fn settle_success<E: Clone + 'static>(
        self,
        cache: &RefCell<QueryCache>,
        pool: &FetchPool<E>,
        authoritative: Vec<(QueryKey, serde_json::Value)>,
        now: DateTime<Utc>,
    ) {
        for record in self.records {
            if pool.generation(&record.key) != record.generation {
                log::info!("Skipping superseded settlement for {}", record.key);
                continue;
            }
            match authoritative.iter().find(|(key, _)| *key == record.key) {
                Some((_, value)) => {
                    cache
                        .borrow_mut()
                        .set(record.key, value.clone(), record.policy, now);
                }
                None => {
                    cache.borrow_mut().remove(&record.key);
                }
            }
        }
    }

    /// Settled-failure: put back exactly what was there before the mutation
    /// began. The caller surfaces the error afterwards, so the UI never shows
    /// a prediction known to be wrong.
    pub fn settle_failure<E: Clone + 'static>(
        self,
        cache: &RefCell<QueryCache>,
        pool: &FetchPool<E>,
    ) {
        for record in self.records {
            if pool.generation(&record.key) != record.generation {
                log::info!("Skipping superseded rollback for {}", record.key);
                continue;
            }
            cache.borrow_mut().restore(record.key, record.prior);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn policy() -> CachePolicy {
        CachePolicy {
            stale_after: Some(Duration::minutes(5)),
            evict_after: Some(Duration::hours(24)),
        }
    }

    fn setup() -> (RefCell<QueryCache>, FetchPool<String>) {
        (RefCell::new(QueryCache::new()), FetchPool::new())
    }

    #[test]
    fn test_failure_restores_the_exact_prior_entry() {
        let (cache, pool) = setup();
        let key = QueryKey::new(["ratings", "a"]);
        let fetched_at = Utc::now() - Duration::seconds(17);
        cache
            .borrow_mut()
            .set(key.clone(), json!({"average": 4.0, "count": 2}), policy(), fetched_at);
        let before = cache.borrow().get(&key).cloned();

        let mutation = OptimisticMutation::begin(
            &cache,
            &pool,
            vec![(key.clone(), json!({"average": 4.3, "count": 3}), policy())],
            Utc::now(),
        );
        assert_eq!(
            cache.borrow().get(&key).map(|e| e.value.clone()),
            Some(json!({"average": 4.3, "count": 3}))
        );

        mutation.settle_failure(&cache, &pool);
        assert_eq!(cache.borrow().get(&key).cloned(), before);
    }

    #[test]
    fn test_failure_on_previously_missing_key_removes_it() {
        let (cache, pool) = setup();
        let key = QueryKey::new(["ratings", "a"]);

        let mutation = OptimisticMutation::begin(
            &cache,
            &pool,
            vec![(key.clone(), json!({"average": 5.0, "count": 1}), policy())],
            Utc::now(),
        );
        mutation.settle_failure(&cache, &pool);
        assert!(!cache.borrow().has(&key));
    }

    #[test]
    fn test_success_overwrites_prediction_with_server_value() {
        let (cache, pool) = setup();
        let key = QueryKey::new(["ratings", "a"]);

        let mutation = OptimisticMutation::begin(
            &cache,
            &pool,
            vec![(key.clone(), json!({"average": 5.0, "count": 1}), policy())],
            Utc::now(),
        );
        // another rater got there first; the server aggregate differs from the
        // prediction
        mutation.settle_success(
            &cache,
            &pool,
            vec![(key.clone(), json!({"average": 4.5, "count": 2}))],
            Utc::now(),
        );
        assert_eq!(
            cache.borrow().get(&key).map(|e| e.value.clone()),
            Some(json!({"average": 4.5, "count": 2}))
        );
    }

    #[test]
    fn test_snapshot_key_without_server_value_is_invalidated() {
        let (cache, pool) = setup();
        let ratings = QueryKey::new(["ratings", "a"]);
        let video = QueryKey::new(["videos", "a"]);
        cache
            .borrow_mut()
            .set(video.clone(), json!({"rating": 4.0}), policy(), Utc::now());

        let mutation = OptimisticMutation::begin(
            &cache,
            &pool,
            vec![
                (ratings.clone(), json!({"average": 5.0, "count": 1}), policy()),
                (video.clone(), json!({"rating": 5.0}), policy()),
            ],
            Utc::now(),
        );
        mutation.settle_success(
            &cache,
            &pool,
            vec![(ratings.clone(), json!({"average": 5.0, "count": 1}))],
            Utc::now(),
        );

        assert!(cache.borrow().has(&ratings));
        // no authoritative video came back, so the stale prediction was
        // dropped for refetch
        assert!(!cache.borrow().has(&video));
    }

    #[test]
    fn test_second_mutation_wins_regardless_of_settlement_order() {
        let (cache, pool) = setup();
        let key = QueryKey::new(["ratings", "a"]);

        let first = OptimisticMutation::begin(
            &cache,
            &pool,
            vec![(key.clone(), json!({"average": 5.0, "count": 1}), policy())],
            Utc::now(),
        );
        let second = OptimisticMutation::begin(
            &cache,
            &pool,
            vec![(key.clone(), json!({"average": 3.0, "count": 1}), policy())],
            Utc::now(),
        );

        // the second mutation settles before the first's response arrives
        second.settle_success(
            &cache,
            &pool,
            vec![(key.clone(), json!({"average": 3.0, "count": 1}))],
            Utc::now(),
        );
        first.settle_success(
            &cache,
            &pool,
            vec![(key.clone(), json!({"average": 5.0, "count": 1}))],
            Utc::now(),
        );

        assert_eq!(
            cache.borrow().get(&key).map(|e| e.value.clone()),
            Some(json!({"average": 3.0, "count": 1}))
        );
    }

    #[test]
    fn test_superseded_failure_does_not_roll_back_newer_prediction() {
        let (cache, pool) = setup();
        let key = QueryKey::new(["ratings", "a"]);

        let first = OptimisticMutation::begin(
            &cache,
            &pool,
            vec![(key.clone(), json!({"average": 5.0, "count": 1}), policy())],
            Utc::now(),
        );
        let second = OptimisticMutation::begin(
            &cache,
            &pool,
            vec![(key.clone(), json!({"average": 3.0, "count": 1}), policy())],
            Utc::now(),
        );

        // the first mutation fails after the second already applied its
        // prediction; rolling back would resurrect pre-first state
        first.settle_failure(&cache, &pool);
        assert_eq!(
            cache.borrow().get(&key).map(|e| e.value.clone()),
            Some(json!({"average": 3.0, "count": 1}))
        );

        second.settle_success(
            &cache,
            &pool,
            vec![(key.clone(), json!({"average": 3.0, "count": 1}))],
            Utc::now(),
        );
    }
}
