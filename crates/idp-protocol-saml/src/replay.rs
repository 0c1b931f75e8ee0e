//! Single-use tracking of inbound message IDs.
//!
//! A request ID accepted once within its validity window is refused on
//! every later presentation, so a captured request cannot be replayed.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::SamlResult;

/// Records message IDs until they expire.
#[async_trait]
pub trait ReplayCache: Send + Sync {
    /// Records `key` until `expires_at`.
    ///
    /// Returns `false` if an unexpired entry for `key` already exists.
    ///
    /// ## Errors
    ///
    /// Returns `SamlError::Store` if the backing store fails.
    async fn check_and_insert(&self, key: &str, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> SamlResult<bool>;
}

/// Builds the cache key for a message from `issuer` with `id`.
#[must_use]
pub fn replay_key(issuer: &str, id: &str) -> String {
    format!("{issuer}\u{1f}{id}")
}

/// Default time between sweeps of expired entries.
pub const DEFAULT_PURGE_INTERVAL_SECS: i64 = 60;

/// Process-local replay cache.
///
/// Expired entries are swept at most once per purge interval, on the
/// first fresh insert after the interval has elapsed.
#[derive(Debug)]
pub struct InMemoryReplayCache {
    entries: DashMap<String, DateTime<Utc>>,
    purge_interval: Duration,
    next_purge: AtomicI64,
}

impl Default for InMemoryReplayCache {
    fn default() -> Self {
        Self::with_purge_interval(Duration::seconds(DEFAULT_PURGE_INTERVAL_SECS))
    }
}

impl InMemoryReplayCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty cache sweeping at most once per `interval`.
    #[must_use]
    pub fn with_purge_interval(interval: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            purge_interval: interval,
            next_purge: AtomicI64::new(i64::MIN),
        }
    }

    fn purge_if_due(&self, now: DateTime<Utc>) {
        let now_ms = now.timestamp_millis();
        let next = self.next_purge.load(Ordering::Acquire);
        if now_ms < next {
            return;
        }
        let following = now_ms.saturating_add(self.purge_interval.num_milliseconds());
        // One caller wins the sweep; the others carry on.
        if self
            .next_purge
            .compare_exchange(next, following, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.purge_expired(now);
        }
    }

    /// Drops entries that expired before `now`.
    pub fn purge_expired(&self, now: DateTime<Utc>) {
        self.entries.retain(|_, expires_at| *expires_at > now);
    }

    /// Number of tracked IDs, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ReplayCache for InMemoryReplayCache {
    async fn check_and_insert(&self, key: &str, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> SamlResult<bool> {
        let fresh = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() > now {
                    false
                } else {
                    entry.insert(expires_at);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(expires_at);
                true
            }
        };
        if fresh {
            self.purge_if_due(now);
        }
        Ok(fresh)
    }
}
