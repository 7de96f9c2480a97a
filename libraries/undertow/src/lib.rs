//! This is a library for keeping a client-side view of a remote API consistent
//! with what the user just did. It was created for Reeltown, so it doesn't
//! include much that was not needed for that project.
//!
//! Caching strategy:
//! 1. Every request gets a structured fingerprint (a [`QueryKey`]): the resource
//!    type plus its parameters, as ordered segments.
//! 2. Responses land in a [`QueryCache`] keyed by fingerprint, type-erased as
//!    JSON. Each entry carries a staleness horizon (after which the next
//!    fetch-through starts a refetch, but the stale value is still served
//!    immediately) and an eviction horizon (after which the entry is gone).
//! 3. Concurrent fetches of the same key share a single in-flight future, so a
//!    key is never fetched twice at once.
//! 4. Mutations that the UI can predict (a view count, a rating) go through the
//!    optimistic coordinator: snapshot, write the prediction, issue the
//!    request, then either let the server value supersede the prediction or
//!    restore the snapshot exactly.
//!
//! Sounds simple, but the ordering is the tricky part this library handles:
//! settlements are ordered by mutation start time per key, never by response
//! arrival time, so a slow early response can't clobber a newer prediction.
//!
//! Everything here assumes a single-threaded, cooperative scheduler (an event
//! loop). Shared state lives behind `RefCell`, and no borrow is ever held
//! across an `.await`.

pub mod data_model;

pub use data_model::{
    CacheEntry, CachePolicy, FetchPool, Freshness, ListenerKey, OptimisticMutation, QueryCache,
    QueryKey, fetch_through,
};
