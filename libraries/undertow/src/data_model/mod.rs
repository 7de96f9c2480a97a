//! The pieces of the cache, in dependency order: keys, entries, the cache
//! itself, fetch coalescing, and the optimistic mutation coordinator.

#[path = "1-query-key.rs"]
mod query_key;

#[path = "2-cache-entry.rs"]
mod cache_entry;

#[path = "3-query-cache.rs"]
mod query_cache;

#[path = "4-fetch-pool.rs"]
mod fetch_pool;

#[path = "5-optimistic.rs"]
mod optimistic;

pub use cache_entry::{CacheEntry, CachePolicy, Freshness};
pub use fetch_pool::{FetchFuture, FetchPool, fetch_through};
pub use optimistic::OptimisticMutation;
pub use query_cache::{ListenerKey, QueryCache};
pub use query_key::QueryKey;
