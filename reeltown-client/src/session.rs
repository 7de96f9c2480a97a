//! The session store: who is logged in, persisted across page loads.
//!
//! The token and cached profile live in durable client storage behind
//! [`KeyValueStorage`]. Storage is written on a strict subset of transitions
//! (login, logout, explicit profile update) and read once at construction.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use slotmap::SlotMap;
use undertow::ListenerKey;

use crate::api::{Method, Transport};
use crate::error::ApiError;
use crate::models::{AuthResponse, LoginRequest, RegisterRequest, UpdateProfileRequest, User};
use crate::policy;
use crate::{ReeltownClient, session_profile_key};

pub const TOKEN_KEY: &str = "auth_token";
pub const PROFILE_KEY: &str = "auth_user";
pub const WELCOMED_KEY: &str = "reeltown_welcomed";

/// Durable client-side storage for opaque key-value pairs. In the browser
/// this is `localStorage`; natively and in tests it's an in-memory map.
pub trait KeyValueStorage {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

#[derive(Default)]
pub struct MemoryStorage {
    entries: RefCell<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.borrow_mut().remove(key);
    }
}

/// Browser `localStorage`. Storage can be unavailable (private browsing
/// quotas, disabled cookies); in that case the session just won't survive a
/// reload, which is not worth failing the app over.
#[cfg(target_arch = "wasm32")]
pub struct BrowserStorage;

#[cfg(target_arch = "wasm32")]
impl BrowserStorage {
    fn local_storage() -> Option<web_sys::Storage> {
        match web_sys::window().map(|window| window.local_storage()) {
            Some(Ok(Some(storage))) => Some(storage),
            _ => {
                log::warn!("localStorage unavailable; session will not persist");
                None
            }
        }
    }
}

#[cfg(target_arch = "wasm32")]
impl KeyValueStorage for BrowserStorage {
    fn get(&self, key: &str) -> Option<String> {
        Self::local_storage().and_then(|storage| storage.get_item(key).ok().flatten())
    }

    fn set(&self, key: &str, value: &str) {
        if let Some(storage) = Self::local_storage() {
            if let Err(e) = storage.set_item(key, value) {
                log::warn!("Failed to persist {key}: {e:?}");
            }
        }
    }

    fn remove(&self, key: &str) {
        if let Some(storage) = Self::local_storage() {
            let _ = storage.remove_item(key);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    LoggedOut,
    ProfileRefreshed,
}

type SessionListener = Rc<dyn Fn(SessionEvent)>;

/// Current authenticated identity, hydrated from durable storage at startup.
///
/// The profile is only authoritative while a token is present: a leftover
/// cached profile with no token never reads as an authenticated identity.
pub struct SessionStore {
    storage: Box<dyn KeyValueStorage>,
    token: RefCell<Option<String>>,
    user: RefCell<Option<User>>,
    listeners: RefCell<SlotMap<ListenerKey, SessionListener>>,
}

impl SessionStore {
    pub fn new(storage: Box<dyn KeyValueStorage>) -> Self {
        let token = storage.get(TOKEN_KEY);
        let user = storage.get(PROFILE_KEY).and_then(|raw| {
            serde_json::from_str(&raw)
                .inspect_err(|e| log::warn!("Discarding unreadable stored profile: {e}"))
                .ok()
        });
        Self {
            storage,
            token: RefCell::new(token),
            user: RefCell::new(user),
            listeners: RefCell::new(SlotMap::with_key()),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.borrow().is_some()
    }

    /// The best-available profile: the last network-resolved value if the
    /// session has seen one, otherwise the persisted snapshot. Either way,
    /// only when a token is present. The fallback chain exists so the UI
    /// doesn't flash "logged out" while the startup profile fetch is pending.
    pub fn current_user(&self) -> Option<User> {
        if self.token.borrow().is_none() {
            return None;
        }
        self.user.borrow().clone()
    }

    /// Adopt a fresh login/registration result: token and profile, persisted.
    pub fn establish(&self, token: String, user: User) {
        self.storage.set(TOKEN_KEY, &token);
        self.persist_profile(&user);
        *self.token.borrow_mut() = Some(token);
        *self.user.borrow_mut() = Some(user);
        self.notify(SessionEvent::LoggedIn);
    }

    /// Replace the cached profile wholesale (successful profile fetch or
    /// explicit update). No-op if nothing changed, so subscribers aren't
    /// re-rendered for identical data.
    pub fn replace_profile(&self, user: User) {
        if self.user.borrow().as_ref() == Some(&user) {
            return;
        }
        self.persist_profile(&user);
        *self.user.borrow_mut() = Some(user);
        self.notify(SessionEvent::ProfileRefreshed);
    }

    /// Clear token and profile, memory and storage both, and tell every
    /// subscriber synchronously: dependent views must already render as
    /// unauthenticated by the time any navigation happens. Called for explicit
    /// logout and for any authentication-rejected response.
    pub fn clear(&self) {
        let was_authenticated = self.is_authenticated();
        self.storage.remove(TOKEN_KEY);
        self.storage.remove(PROFILE_KEY);
        *self.token.borrow_mut() = None;
        *self.user.borrow_mut() = None;
        if was_authenticated {
            self.notify(SessionEvent::LoggedOut);
        }
    }

    pub fn register_listener(&self, listener: impl Fn(SessionEvent) + 'static) -> ListenerKey {
        self.listeners.borrow_mut().insert(Rc::new(listener))
    }

    pub fn unregister_listener(&self, key: ListenerKey) {
        self.listeners.borrow_mut().remove(key);
    }

    /// The one-time welcome flag, kept out of the session proper: surviving
    /// logout is the point (the tour shouldn't replay for a returning user).
    pub fn has_been_welcomed(&self) -> bool {
        self.storage.get(WELCOMED_KEY).as_deref() == Some("true")
    }

    pub fn mark_welcomed(&self) {
        self.storage.set(WELCOMED_KEY, "true");
    }

    fn persist_profile(&self, user: &User) {
        match serde_json::to_string(user) {
            Ok(raw) => self.storage.set(PROFILE_KEY, &raw),
            Err(e) => log::error!("Failed to serialize profile for storage: {e}"),
        }
    }

    fn notify(&self, event: SessionEvent) {
        let listeners: Vec<SessionListener> = self.listeners.borrow().values().cloned().collect();
        for listener in listeners {
            listener(event);
        }
    }
}

impl<T: Transport + 'static> ReeltownClient<T> {
    /// Exchange credentials for a session. Stored state is untouched on
    /// failure, so a typo'd password doesn't log anyone out.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response: AuthResponse = self
            .api
            .request(Method::Post, "/users/login", Some(&request))
            .await?;
        self.adopt_session(response)
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, ApiError> {
        let request = RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        let response: AuthResponse = self
            .api
            .request(Method::Post, "/users/register", Some(&request))
            .await?;
        self.adopt_session(response)
    }

    /// Drop the session and every cache entry that only makes sense for the
    /// logged-in user. Listener notification happens synchronously inside
    /// [`SessionStore::clear`].
    pub fn logout(&self) {
        self.session.clear();
        let mut cache = self.cache.borrow_mut();
        cache.invalidate_prefix(&undertow::QueryKey::new(["session"]));
        cache.invalidate_prefix(&undertow::QueryKey::new(["recommendations"]));
        cache.invalidate_prefix(&undertow::QueryKey::new(["moderation"]));
    }

    /// The profile of the logged-in user, revalidated only on explicit
    /// invalidation (login/logout). Identity doesn't drift, so there's no
    /// reason to burn a round-trip on every access.
    pub async fn fetch_profile(&self) -> Result<User, ApiError> {
        let user: User = self
            .get_cached(session_profile_key(), policy::session(), "/users/me".to_string())
            .await?;
        self.session.replace_profile(user.clone());
        Ok(user)
    }

    pub async fn update_profile(&self, update: &UpdateProfileRequest) -> Result<User, ApiError> {
        let user: User = self
            .api
            .request(Method::Put, "/users/me", Some(update))
            .await?;
        self.session.replace_profile(user.clone());
        self.overwrite_cached(session_profile_key(), policy::session(), &user)?;
        Ok(user)
    }

    fn adopt_session(&self, response: AuthResponse) -> Result<User, ApiError> {
        self.session
            .establish(response.token, response.user.clone());
        self.overwrite_cached(session_profile_key(), policy::session(), &response.user)?;
        Ok(response.user)
    }
}

pub(crate) fn default_storage() -> Box<dyn KeyValueStorage> {
    #[cfg(target_arch = "wasm32")]
    {
        Box::new(BrowserStorage)
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        Box::new(MemoryStorage::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use std::cell::Cell;

    fn a_user() -> User {
        User {
            id: "u1".into(),
            username: "ada".into(),
            email: "ada@example.com".into(),
            created_at: "2024-01-01T00:00:00Z".into(),
            roles: vec![Role::User],
            status: None,
        }
    }

    #[test]
    fn test_profile_without_token_is_not_an_identity() {
        let storage = MemoryStorage::new();
        storage.set(
            PROFILE_KEY,
            &serde_json::to_string(&a_user()).expect("profile should serialize"),
        );
        // no token in storage
        let store = SessionStore::new(Box::new(storage));
        assert!(!store.is_authenticated());
        assert_eq!(store.current_user(), None);
    }

    #[test]
    fn test_hydrates_token_and_profile_from_storage() {
        let storage = MemoryStorage::new();
        storage.set(TOKEN_KEY, "tok-1");
        storage.set(
            PROFILE_KEY,
            &serde_json::to_string(&a_user()).expect("profile should serialize"),
        );
        let store = SessionStore::new(Box::new(storage));
        assert!(store.is_authenticated());
        assert_eq!(store.current_user().map(|user| user.username), Some("ada".into()));
    }

    #[test]
    fn test_clear_wipes_storage_and_notifies_once() {
        let store = SessionStore::new(Box::new(MemoryStorage::new()));
        store.establish("tok-1".into(), a_user());

        let logouts = Rc::new(Cell::new(0u32));
        let _listener = {
            let logouts = Rc::clone(&logouts);
            store.register_listener(move |event| {
                if event == SessionEvent::LoggedOut {
                    logouts.set(logouts.get() + 1);
                }
            })
        };

        store.clear();
        store.clear(); // already logged out; must not notify again
        assert_eq!(logouts.get(), 1);
        assert!(store.token().is_none());
        assert_eq!(store.current_user(), None);
    }

    #[test]
    fn test_welcomed_flag_survives_logout() {
        let store = SessionStore::new(Box::new(MemoryStorage::new()));
        store.establish("tok-1".into(), a_user());
        store.mark_welcomed();
        store.clear();
        assert!(store.has_been_welcomed());
    }
}
