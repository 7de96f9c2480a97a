//! Cache horizons by resource class. Staleness is per class, not global:
//! comments and moderation queues churn, tag vocabularies barely move, and
//! session identity only changes when the user logs in or out.

use chrono::Duration;
use undertow::CachePolicy;

/// Always refetch; the cached value is only there to serve concurrent reads
/// while a fetch is in flight.
fn none() -> CachePolicy {
    CachePolicy {
        stale_after: Some(Duration::zero()),
        evict_after: Some(Duration::hours(1)),
    }
}

/// Rapidly changing data: 30 seconds.
fn short() -> CachePolicy {
    CachePolicy {
        stale_after: Some(Duration::seconds(30)),
        evict_after: Some(Duration::hours(1)),
    }
}

/// Moderately changing data: 5 minutes.
fn medium() -> CachePolicy {
    CachePolicy {
        stale_after: Some(Duration::minutes(5)),
        evict_after: Some(Duration::hours(24)),
    }
}

/// Slowly changing data: 1 hour.
fn long() -> CachePolicy {
    CachePolicy {
        stale_after: Some(Duration::hours(1)),
        evict_after: Some(Duration::hours(24)),
    }
}

/// Rarely changing data: 24 hours.
fn very_long() -> CachePolicy {
    CachePolicy {
        stale_after: Some(Duration::hours(24)),
        evict_after: Some(Duration::days(7)),
    }
}

/// Session identity: never stale, refreshed only by explicit invalidation
/// (login/logout), so re-validation traffic isn't paid on every access.
pub fn session() -> CachePolicy {
    CachePolicy::INFINITE
}

/// Public user records change infrequently.
pub fn user_public() -> CachePolicy {
    long()
}

pub fn video() -> CachePolicy {
    medium()
}

pub fn ratings() -> CachePolicy {
    medium()
}

pub fn comments() -> CachePolicy {
    short()
}

pub fn search() -> CachePolicy {
    short()
}

pub fn tags() -> CachePolicy {
    very_long()
}

pub fn recommendations() -> CachePolicy {
    medium()
}

/// Moderators act on what they see; keep the queue fresh.
pub fn moderation() -> CachePolicy {
    short()
}

/// Processing status flips server-side at any moment; poll it uncached.
pub fn video_status() -> CachePolicy {
    none()
}
