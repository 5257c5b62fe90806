use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{ProfilePatch, ProfileRecord};

/// Consider the cached profile stale after 5 minutes.
pub const DEFAULT_TTL_MINUTES: i64 = 5;

pub fn default_ttl() -> Duration {
    Duration::minutes(DEFAULT_TTL_MINUTES)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: ProfileRecord,
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(value: ProfileRecord, cached_at: DateTime<Utc>) -> Self {
        Self { value, cached_at }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.cached_at
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) < ttl
    }

    pub fn age_display(&self, now: DateTime<Utc>) -> String {
        let minutes = self.age(now).num_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

/// Holds at most one profile and the time it was last refreshed.
///
/// Value and timestamp sit in one `Option` behind one lock, so a reader
/// never sees a timestamp that belongs to a different value. The lock is
/// never held across an await point.
#[derive(Debug, Default)]
pub struct ProfileCache {
    entry: Mutex<Option<CacheEntry>>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<CacheEntry>> {
        // A panic while holding the lock cannot leave a half-written entry,
        // so a poisoned lock is still safe to use.
        self.entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self) -> Option<CacheEntry> {
        self.lock().clone()
    }

    pub fn has_entry(&self) -> bool {
        self.lock().is_some()
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.lock()
            .as_ref()
            .map(|entry| entry.is_fresh(now, ttl))
            .unwrap_or(false)
    }

    /// Replace whatever is cached.
    pub fn set(&self, value: ProfileRecord, now: DateTime<Utc>) {
        *self.lock() = Some(CacheEntry::new(value, now));
        debug!(cached_at = %now, "Profile cache set");
    }

    /// Merge `patch` into the cached profile. Returns false, changing
    /// nothing, when there is no entry to merge into.
    pub fn merge(&self, patch: &ProfilePatch, now: DateTime<Utc>) -> bool {
        let mut guard = self.lock();
        match guard.as_mut() {
            Some(entry) => {
                entry.value.apply(patch);
                entry.cached_at = now;
                debug!(cached_at = %now, "Profile cache merged");
                true
            }
            None => {
                debug!("Profile cache merge skipped - no entry");
                false
            }
        }
    }

    pub fn invalidate(&self) {
        *self.lock() = None;
        debug!("Profile cache invalidated");
    }

    pub fn age_display(&self, now: DateTime<Utc>) -> String {
        self.lock()
            .as_ref()
            .map(|entry| entry.age_display(now))
            .unwrap_or_else(|| "never".to_string())
    }
}
