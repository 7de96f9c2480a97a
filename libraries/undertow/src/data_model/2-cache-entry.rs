use chrono::{DateTime, Duration, Utc};

/// How long a cached response stays trustworthy. `None` for either horizon
/// means never: session-identity data, for example, is only refreshed on
/// explicit invalidation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachePolicy {
    /// After this, the entry is still served but a refetch is due.
    pub stale_after: Option<Duration>,
    /// After this, the entry is dropped outright.
    pub evict_after: Option<Duration>,
}

impl CachePolicy {
    /// Never stale, never evicted. Refreshed only by explicit invalidation.
    pub const INFINITE: CachePolicy = CachePolicy {
        stale_after: None,
        evict_after: None,
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    /// Servable immediately, but the next fetch-through starts a refetch.
    Stale,
    /// Past the eviction horizon. Treated as absent.
    Expired,
}

/// One cached response. Many independent subscribers may read the same entry;
/// its lifetime is governed by the horizons, not by who is looking at it.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub value: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
    pub policy: CachePolicy,
}

impl CacheEntry {
    pub fn new(value: serde_json::Value, policy: CachePolicy, now: DateTime<Utc>) -> Self {
        Self {
            value,
            fetched_at: now,
            policy,
        }
    }

    pub fn freshness(&self, now: DateTime<Utc>) -> Freshness {
        let age = now - self.fetched_at;
        if let Some(evict_after) = self.policy.evict_after {
            if age >= evict_after {
                return Freshness::Expired;
            }
        }
        if let Some(stale_after) = self.policy.stale_after {
            if age >= stale_after {
                return Freshness::Stale;
            }
        }
        Freshness::Fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(stale_secs: i64, evict_secs: i64) -> CachePolicy {
        CachePolicy {
            stale_after: Some(Duration::seconds(stale_secs)),
            evict_after: Some(Duration::seconds(evict_secs)),
        }
    }

    #[test]
    fn test_freshness_progression() {
        let t0 = Utc::now();
        let entry = CacheEntry::new(serde_json::json!(1), policy(30, 3600), t0);

        assert_eq!(entry.freshness(t0), Freshness::Fresh);
        assert_eq!(entry.freshness(t0 + Duration::seconds(29)), Freshness::Fresh);
        assert_eq!(entry.freshness(t0 + Duration::seconds(30)), Freshness::Stale);
        assert_eq!(entry.freshness(t0 + Duration::seconds(3600)), Freshness::Expired);
    }

    #[test]
    fn test_infinite_policy_never_goes_stale() {
        let t0 = Utc::now();
        let entry = CacheEntry::new(serde_json::json!(1), CachePolicy::INFINITE, t0);
        assert_eq!(entry.freshness(t0 + Duration::days(365)), Freshness::Fresh);
    }
}
