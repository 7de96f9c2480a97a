use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use slotmap::SlotMap;

use crate::data_model::{CacheEntry, CachePolicy, Freshness, QueryKey};

slotmap::new_key_type! {
    /// Handle for a registered change listener. Keep it to unregister when the
    /// subscriber goes away, so nothing is notified after unmount.
    pub struct ListenerKey;
}

type Listener = Rc<dyn Fn(&QueryKey)>;

/// The keyed cache of last-known server responses. The single shared mutable
/// resource of the whole layer; all access is synchronous and single-threaded.
///
/// Listeners are called synchronously on every write. They must not reenter
/// the cache; schedule follow-up work instead.
#[derive(Default)]
pub struct QueryCache {
    entries: BTreeMap<QueryKey, CacheEntry>,
    listeners: SlotMap<ListenerKey, Listener>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &QueryKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn has(&self, key: &QueryKey) -> bool {
        self.entries.contains_key(key)
    }

    /// The last-known value for `key`, stale or not, as long as it hasn't
    /// crossed the eviction horizon. This is the "never block a read" path.
    pub fn read(&self, key: &QueryKey, now: DateTime<Utc>) -> Option<&serde_json::Value> {
        self.entries.get(key).and_then(|entry| match entry.freshness(now) {
            Freshness::Fresh | Freshness::Stale => Some(&entry.value),
            Freshness::Expired => None,
        })
    }

    pub fn set(
        &mut self,
        key: QueryKey,
        value: serde_json::Value,
        policy: CachePolicy,
        now: DateTime<Utc>,
    ) {
        self.entries
            .insert(key.clone(), CacheEntry::new(value, policy, now));
        self.notify(&key);
    }

    /// Put back exactly what was captured before a mutation, including the
    /// original fetch time. `None` means the key didn't exist.
    pub fn restore(&mut self, key: QueryKey, prior: Option<CacheEntry>) {
        match prior {
            Some(entry) => {
                self.entries.insert(key.clone(), entry);
            }
            None => {
                self.entries.remove(&key);
            }
        }
        self.notify(&key);
    }

    pub fn remove(&mut self, key: &QueryKey) -> Option<CacheEntry> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.notify(key);
        }
        removed
    }

    /// Drop every entry under `prefix` ("invalidate all video-related
    /// entries"). Returns how many were dropped.
    pub fn invalidate_prefix(&mut self, prefix: &QueryKey) -> usize {
        let doomed: Vec<QueryKey> = self
            .entries
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            self.entries.remove(key);
            self.notify(key);
        }
        doomed.len()
    }

    /// Drop entries past their eviction horizon. Expiry is otherwise lazy
    /// (checked on access), so call this from an idle hook if memory matters.
    pub fn evict_expired(&mut self, now: DateTime<Utc>) -> usize {
        let doomed: Vec<QueryKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.freshness(now) == Freshness::Expired)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            self.entries.remove(key);
        }
        doomed.len()
    }

    pub fn register_listener(&mut self, listener: impl Fn(&QueryKey) + 'static) -> ListenerKey {
        self.listeners.insert(Rc::new(listener))
    }

    pub fn unregister_listener(&mut self, key: ListenerKey) {
        self.listeners.remove(key);
    }

    fn notify(&self, key: &QueryKey) {
        // clone out first so a listener removing itself can't invalidate the
        // iteration
        let listeners: Vec<Listener> = self.listeners.values().cloned().collect();
        for listener in listeners {
            listener(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use std::cell::RefCell;

    fn short_policy() -> CachePolicy {
        CachePolicy {
            stale_after: Some(Duration::seconds(30)),
            evict_after: Some(Duration::seconds(3600)),
        }
    }

    #[test]
    fn test_read_serves_stale_but_not_expired() {
        let t0 = Utc::now();
        let mut cache = QueryCache::new();
        let key = QueryKey::new(["videos", "a"]);
        cache.set(key.clone(), json!({"views": 3}), short_policy(), t0);

        assert!(cache.read(&key, t0 + Duration::seconds(60)).is_some());
        assert!(cache.read(&key, t0 + Duration::seconds(3600)).is_none());
    }

    #[test]
    fn test_invalidate_prefix_spares_unrelated_keys() {
        let t0 = Utc::now();
        let mut cache = QueryCache::new();
        cache.set(QueryKey::new(["videos", "a"]), json!(1), short_policy(), t0);
        cache.set(QueryKey::new(["videos", "b"]), json!(2), short_policy(), t0);
        cache.set(QueryKey::new(["ratings", "a"]), json!(3), short_policy(), t0);

        let dropped = cache.invalidate_prefix(&QueryKey::new(["videos"]));
        assert_eq!(dropped, 2);
        assert!(!cache.has(&QueryKey::new(["videos", "a"])));
        assert!(cache.has(&QueryKey::new(["ratings", "a"])));
    }

    #[test]
    fn test_restore_none_removes_the_key() {
        let t0 = Utc::now();
        let mut cache = QueryCache::new();
        let key = QueryKey::new(["videos", "a"]);
        cache.set(key.clone(), json!(1), short_policy(), t0);
        cache.restore(key.clone(), None);
        assert!(!cache.has(&key));
    }

    #[test]
    fn test_listeners_fire_on_writes_until_unregistered() {
        let t0 = Utc::now();
        let seen: Rc<RefCell<Vec<String>>> = Rc::default();
        let mut cache = QueryCache::new();
        let listener = {
            let seen = Rc::clone(&seen);
            cache.register_listener(move |key| seen.borrow_mut().push(key.to_string()))
        };

        let key = QueryKey::new(["videos", "a"]);
        cache.set(key.clone(), json!(1), short_policy(), t0);
        cache.unregister_listener(listener);
        cache.set(key, json!(2), short_policy(), t0);

        assert_eq!(seen.borrow().as_slice(), ["videos/a"]);
    }
}
