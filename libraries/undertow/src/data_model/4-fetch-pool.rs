use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use chrono::Utc;
use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared};

use crate::data_model::{CachePolicy, Freshness, QueryCache, QueryKey};

pub type FetchFuture<E> = Shared<LocalBoxFuture<'static, Result<serde_json::Value, E>>>;

/// Tracks what is currently on the wire, per key.
///
/// Two jobs: coalescing (concurrent fetches of one key share one in-flight
/// future) and ordering (each key has a generation; bumping it makes every
/// outstanding fetch or mutation for that key settle as a no-op against the
/// cache, so a slow early response can't overwrite a newer write).
pub struct FetchPool<E> {
    in_flight: RefCell<HashMap<QueryKey, (u64, FetchFuture<E>)>>,
    generations: RefCell<HashMap<QueryKey, u64>>,
    next_fetch_id: Cell<u64>,
}

impl<E> Default for FetchPool<E> {
    fn default() -> Self {
        Self {
            in_flight: RefCell::new(HashMap::new()),
            generations: RefCell::new(HashMap::new()),
            next_fetch_id: Cell::new(0),
        }
    }
}

impl<E: Clone + 'static> FetchPool<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self, key: &QueryKey) -> u64 {
        self.generations.borrow().get(key).copied().unwrap_or(0)
    }

    /// Claim the next ordering slot for `key` and cancel any outstanding fetch
    /// for it: the fetch still resolves for whoever is awaiting it, but its
    /// cache write becomes a no-op.
    pub fn bump(&self, key: &QueryKey) -> u64 {
        self.in_flight.borrow_mut().remove(key);
        let mut generations = self.generations.borrow_mut();
        let generation = generations.entry(key.clone()).or_insert(0);
        *generation += 1;
        *generation
    }

    /// The in-flight future for `key`, if any. A caller that wants the fresh
    /// value can await it; a caller that just wants *a* value should read the
    /// cache instead.
    pub fn pending(&self, key: &QueryKey) -> Option<FetchFuture<E>> {
        self.in_flight
            .borrow()
            .get(key)
            .map(|(_, future)| future.clone())
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.borrow().len()
    }

    /// Drive every registered fetch to completion. Refetches for stale keys
    /// are only registered by [`fetch_through`], never awaited there (stale
    /// reads must not block), so the embedding shell calls this from its idle
    /// hook to actually run them.
    pub async fn drain(&self) {
        loop {
            let pending: Vec<FetchFuture<E>> = self
                .in_flight
                .borrow()
                .values()
                .map(|(_, future)| future.clone())
                .collect();
            if pending.is_empty() {
                break;
            }
            for future in pending {
                let _ = future.await;
            }
        }
    }

    fn next_fetch_id(&self) -> u64 {
        let id = self.next_fetch_id.get();
        self.next_fetch_id.set(id + 1);
        id
    }
}

/// Build the shared future for one network fetch, register it in the pool,
/// and return a handle to it. The future writes the cache on success, but
/// only if the key's generation hasn't moved since the fetch started.
fn register_fetch<E, Fut>(
    cache: &Rc<RefCell<QueryCache>>,
    pool: &Rc<FetchPool<E>>,
    key: QueryKey,
    policy: CachePolicy,
    fetch: Fut,
) -> FetchFuture<E>
where
    E: Clone + 'static,
    Fut: Future<Output = Result<serde_json::Value, E>> + 'static,
{
    let fetch_id = pool.next_fetch_id();
    let generation = pool.generation(&key);

    let future = {
        let cache = Rc::clone(cache);
        let pool = Rc::clone(pool);
        let key = key.clone();
        async move {
            let result = fetch.await;

            // Deregister, unless a newer fetch already took the slot.
            let mut in_flight = pool.in_flight.borrow_mut();
            if in_flight.get(&key).map(|(id, _)| *id) == Some(fetch_id) {
                in_flight.remove(&key);
            }
            drop(in_flight);

            if let Ok(value) = &result {
                if pool.generation(&key) == generation {
                    cache
                        .borrow_mut()
                        .set(key.clone(), value.clone(), policy, Utc::now());
                } else {
                    log::info!("Dropping superseded response for {key}");
                }
            }

            result
        }
        .boxed_local()
        .shared()
    };

    pool.in_flight
        .borrow_mut()
        .insert(key, (fetch_id, future.clone()));
    future
}

/// The read path of the whole layer.
///
/// - Fresh cache hit: returns the cached value, no network.
/// - Stale cache hit: returns the stale value immediately and registers a
///   refetch (stale-while-revalidate). The refetch runs when the shell drains
///   the pool, or when a later caller awaits it.
/// - Miss (or expired): joins the in-flight fetch for the key if there is one,
///   otherwise starts one, and awaits it. Concurrent misses of the same key
///   produce exactly one request.
pub async fn fetch_through<E, F, Fut>(
    cache: &Rc<RefCell<QueryCache>>,
    pool: &Rc<FetchPool<E>>,
    key: QueryKey,
    policy: CachePolicy,
    fetch: F,
) -> Result<serde_json::Value, E>
where
    E: Clone + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<serde_json::Value, E>> + 'static,
{
    let now = Utc::now();

    let cached = cache
        .borrow()
        .get(&key)
        .map(|entry| (entry.value.clone(), entry.freshness(now)));

    match cached {
        Some((value, Freshness::Fresh)) => Ok(value),
        Some((value, Freshness::Stale)) => {
            if pool.pending(&key).is_none() {
                register_fetch(cache, pool, key, policy, fetch());
            }
            Ok(value)
        }
        expired_or_missing => {
            if expired_or_missing.is_some() {
                cache.borrow_mut().remove(&key);
            }
            let future = match pool.pending(&key) {
                Some(existing) => existing,
                None => register_fetch(cache, pool, key, policy, fetch()),
            };
            future.await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use futures::executor::block_on;
    use futures::join;
    use serde_json::json;

    fn policy() -> CachePolicy {
        CachePolicy {
            stale_after: Some(Duration::seconds(30)),
            evict_after: Some(Duration::seconds(3600)),
        }
    }

    fn setup() -> (Rc<RefCell<QueryCache>>, Rc<FetchPool<String>>) {
        (
            Rc::new(RefCell::new(QueryCache::new())),
            Rc::new(FetchPool::new()),
        )
    }

    #[test]
    fn test_concurrent_misses_fetch_once() {
        let (cache, pool) = setup();
        let key = QueryKey::new(["videos", "a"]);
        let calls = Rc::new(Cell::new(0u32));

        let make_fetch = |calls: &Rc<Cell<u32>>| {
            let calls = Rc::clone(calls);
            move || {
                calls.set(calls.get() + 1);
                async move { Ok::<_, String>(json!({"views": 7})) }
            }
        };

        let (a, b) = block_on(async {
            join!(
                fetch_through(&cache, &pool, key.clone(), policy(), make_fetch(&calls)),
                fetch_through(&cache, &pool, key.clone(), policy(), make_fetch(&calls)),
            )
        });

        assert_eq!(a, Ok(json!({"views": 7})));
        assert_eq!(b, Ok(json!({"views": 7})));
        assert_eq!(calls.get(), 1);
        assert!(cache.borrow().has(&key));
    }

    #[test]
    fn test_stale_hit_serves_old_value_without_blocking() {
        let (cache, pool) = setup();
        let key = QueryKey::new(["videos", "a"]);
        let stale_since = Utc::now() - Duration::seconds(120);
        cache
            .borrow_mut()
            .set(key.clone(), json!({"views": 1}), policy(), stale_since);

        let value = block_on(fetch_through(&cache, &pool, key.clone(), policy(), || {
            async move { Ok::<_, String>(json!({"views": 2})) }
        }));

        // the stale value is what the caller sees; the refetch is registered
        // but has not run
        assert_eq!(value, Ok(json!({"views": 1})));
        assert_eq!(pool.in_flight_count(), 1);

        block_on(pool.drain());
        let now = Utc::now();
        assert_eq!(
            cache.borrow().read(&key, now),
            Some(&json!({"views": 2}))
        );
    }

    #[test]
    fn test_failed_fetch_leaves_cache_untouched() {
        let (cache, pool) = setup();
        let key = QueryKey::new(["videos", "a"]);

        let result = block_on(fetch_through(&cache, &pool, key.clone(), policy(), || {
            async move { Err::<serde_json::Value, _>("connection reset".to_string()) }
        }));

        assert_eq!(result, Err("connection reset".to_string()));
        assert!(!cache.borrow().has(&key));
        assert_eq!(pool.in_flight_count(), 0);
    }

    #[test]
    fn test_bumped_generation_discards_late_response() {
        let (cache, pool) = setup();
        let key = QueryKey::new(["videos", "a"]);

        let (tx, rx) = futures::channel::oneshot::channel::<()>();
        let slow = fetch_through(&cache, &pool, key.clone(), policy(), || {
            async move {
                let _ = rx.await;
                Ok::<_, String>(json!({"views": 1}))
            }
        });

        block_on(async {
            join!(slow, async {
                // a newer writer claims the key while the fetch is in flight
                pool.bump(&key);
                cache.borrow_mut().set(
                    key.clone(),
                    json!({"views": 99}),
                    policy(),
                    Utc::now(),
                );
                let _ = tx.send(());
            })
        });

        let now = Utc::now();
        assert_eq!(cache.borrow().read(&key, now), Some(&json!({"views": 99})));
    }
}
