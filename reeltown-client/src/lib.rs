//! The data layer of the Reeltown web client: typed access to the Reeltown
//! API, a per-resource query cache, the session store, and the optimistic
//! flows for ratings and view counts.
//!
//! The UI shell (whatever is rendering) talks to [`ReeltownClient`] and
//! subscribes to cache/session listeners; it never touches the wire or the
//! cache directly. All state is single-threaded behind `RefCell`. We never
//! hold a borrow across an `.await`, which guarantees the absence of
//! "already borrowed" panics.

#![deny(clippy::string_slice)]

pub mod api;
pub mod comments;
pub mod error;
pub mod models;
pub mod moderation;
pub mod policy;
pub mod ratings;
pub mod recommendations;
pub mod search;
pub mod session;
pub mod videos;

use std::cell::RefCell;
use std::rc::Rc;

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use undertow::{CachePolicy, FetchPool, ListenerKey, QueryCache, QueryKey, fetch_through};

use crate::api::{ApiClient, DEFAULT_BASE_URL, HttpTransport, Method, NO_BODY, Transport};
use crate::error::ApiError;
use crate::models::User;
use crate::session::{KeyValueStorage, SessionStore, default_storage};

pub(crate) fn session_profile_key() -> QueryKey {
    QueryKey::new(["session", "profile"])
}

/// The client. One per app instance; cheap handles to its parts are shared
/// internally via `Rc`.
pub struct ReeltownClient<T: Transport> {
    pub(crate) api: Rc<ApiClient<T>>,
    pub(crate) cache: Rc<RefCell<QueryCache>>,
    pub(crate) pool: Rc<FetchPool<ApiError>>,
    pub(crate) session: Rc<SessionStore>,
}

impl ReeltownClient<HttpTransport> {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self::with_parts(HttpTransport::new(base_url.into()), default_storage())
    }
}

impl Default for ReeltownClient<HttpTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport + 'static> ReeltownClient<T> {
    /// Assemble a client from explicit parts. This is the seam the shell uses
    /// to pick a storage backend, and tests use to script the transport.
    pub fn with_parts(transport: T, storage: Box<dyn KeyValueStorage>) -> Self {
        let session = Rc::new(SessionStore::new(storage));
        Self {
            api: Rc::new(ApiClient::new(transport, Rc::clone(&session))),
            cache: Rc::new(RefCell::new(QueryCache::new())),
            pool: Rc::new(FetchPool::new()),
            session,
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn current_user(&self) -> Option<User> {
        self.session.current_user()
    }

    pub fn cache(&self) -> &Rc<RefCell<QueryCache>> {
        &self.cache
    }

    /// Re-render hook: fires with the affected key on every cache write.
    pub fn on_cache_update(&self, listener: impl Fn(&QueryKey) + 'static) -> ListenerKey {
        self.cache.borrow_mut().register_listener(listener)
    }

    /// Unsubscribe on unmount, so nothing writes to a view that's gone.
    pub fn remove_cache_listener(&self, key: ListenerKey) {
        self.cache.borrow_mut().unregister_listener(key);
    }

    /// How many fetches are currently registered but unsettled.
    pub fn pending_fetches(&self) -> usize {
        self.pool.in_flight_count()
    }

    /// Run every registered refetch (the stale-while-revalidate backlog) to
    /// completion. The shell calls this from its idle hook; reads never do.
    pub async fn flush_revalidations(&self) {
        self.pool.drain().await;
    }

    /// Drop cache entries past their eviction horizon.
    pub fn evict_expired(&self) -> usize {
        self.cache.borrow_mut().evict_expired(Utc::now())
    }

    /// GET through the cache: fresh hits skip the network, stale hits are
    /// served immediately while a refetch is registered, misses are coalesced
    /// per key. The response is decoded (and therefore validated) before it
    /// is cached, so a malformed body never gets stored.
    pub(crate) async fn get_cached<R>(
        &self,
        key: QueryKey,
        policy: CachePolicy,
        path: String,
    ) -> Result<R, ApiError>
    where
        R: DeserializeOwned + Serialize + 'static,
    {
        let api = Rc::clone(&self.api);
        let value = fetch_through(&self.cache, &self.pool, key, policy, move || async move {
            let typed: R = api.request(Method::Get, &path, NO_BODY).await?;
            serde_json::to_value(&typed).map_err(|e| ApiError::Decode(e.to_string()))
        })
        .await?;
        serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Last-known value for a key, stale included. The sync read path views
    /// render from.
    pub(crate) fn read_cached<R: DeserializeOwned>(&self, key: &QueryKey) -> Option<R> {
        let now = Utc::now();
        let cache = self.cache.borrow();
        let value = cache.read(key, now)?;
        serde_json::from_value(value.clone())
            .inspect_err(|e| log::warn!("Cached value for {key} no longer decodes: {e}"))
            .ok()
    }

    pub(crate) fn overwrite_cached<R: Serialize>(
        &self,
        key: QueryKey,
        policy: CachePolicy,
        value: &R,
    ) -> Result<(), ApiError> {
        let value = serde_json::to_value(value).map_err(|e| ApiError::Decode(e.to_string()))?;
        self.cache.borrow_mut().set(key, value, policy, Utc::now());
        Ok(())
    }
}
