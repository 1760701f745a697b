//! In-memory statistics cache with single-flight computation
//!
//! Each key moves through a small lifecycle: absent, computing, fresh,
//! then stale once the TTL elapses. Stale values are served immediately
//! while a background recomputation refreshes them, so readers see
//! slightly old numbers instead of waiting on the database.
//!
//! A miss elects exactly one leader to compute; concurrent requests for
//! the same key subscribe to a broadcast channel and wait for the
//! leader's outcome instead of issuing their own fetches.

use crate::stats::{StatsKey, StatsValue};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::debug;

/// Outcome of a computation, delivered to the leader's followers.
#[derive(Debug, Clone)]
pub enum ComputeOutcome {
    /// Statistics were computed and cached.
    Ready(StatsValue),
    /// Computation failed; `fallback` is set when a stale value may be
    /// served in its place.
    Failed { message: String, fallback: bool },
}

/// Result of a cache probe.
#[derive(Debug, Clone)]
pub enum Lookup {
    /// Value within its TTL.
    Fresh(StatsValue),
    /// Value past its TTL, still usable while a refresh runs.
    Stale(StatsValue),
    /// Nothing cached for the key.
    Absent,
}

/// Role assigned to a caller that wants a value computed.
pub enum ComputeRole {
    /// This caller computes; it must call
    /// [`StatsCache::finish_compute`] exactly once.
    Leader,
    /// Another caller is already computing; await its outcome here.
    Follower(broadcast::Receiver<ComputeOutcome>),
}

/// A cached value and the instant it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: StatsValue,
    pub stored_at: Instant,
}

struct CacheInner {
    entries: HashMap<StatsKey, CacheEntry>,
    in_flight: HashMap<StatsKey, broadcast::Sender<ComputeOutcome>>,
}

/// Thread-safe statistics cache shared across request handlers.
pub struct StatsCache {
    ttl: Duration,
    inner: Mutex<CacheInner>,
}

impl StatsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Probe the cache for `key`.
    pub fn lookup(&self, key: &StatsKey) -> Lookup {
        self.lookup_at(key, Instant::now())
    }

    /// Probe with an explicit clock, so TTL behavior is testable
    /// without sleeping.
    pub fn lookup_at(&self, key: &StatsKey, now: Instant) -> Lookup {
        let inner = self.lock();
        match inner.entries.get(key) {
            Some(entry) if now.duration_since(entry.stored_at) < self.ttl => {
                Lookup::Fresh(entry.value.clone())
            }
            Some(entry) => Lookup::Stale(entry.value.clone()),
            None => Lookup::Absent,
        }
    }

    /// Join or start the computation for `key`.
    ///
    /// The first caller becomes the leader and must report through
    /// [`finish_compute`](Self::finish_compute); everyone else gets a
    /// receiver for the leader's outcome.
    pub fn begin_compute(&self, key: &StatsKey) -> ComputeRole {
        let mut inner = self.lock();
        if let Some(tx) = inner.in_flight.get(key) {
            debug!(%key, "joining in-flight computation");
            return ComputeRole::Follower(tx.subscribe());
        }

        let (tx, _rx) = broadcast::channel(1);
        inner.in_flight.insert(key.clone(), tx);
        debug!(%key, "starting computation");
        ComputeRole::Leader
    }

    /// Store the leader's outcome and wake its followers.
    ///
    /// On success the value is cached with a fresh timestamp; on
    /// failure the previous entry (if any) is left in place so stale
    /// fallback remains possible.
    pub fn finish_compute(&self, key: &StatsKey, outcome: ComputeOutcome) {
        let mut inner = self.lock();
        if let ComputeOutcome::Ready(value) = &outcome {
            inner.entries.insert(
                key.clone(),
                CacheEntry {
                    value: value.clone(),
                    stored_at: Instant::now(),
                },
            );
        }

        if let Some(tx) = inner.in_flight.remove(key) {
            // Ignore the error: no followers subscribed is fine.
            let _ = tx.send(outcome);
        }
    }

    /// Clear an abandoned flight for `key`, waking any followers with
    /// a failure. No-op when the flight already finished; the cached
    /// entry (if any) is untouched, so stale fallback stays possible.
    pub fn abort_compute(&self, key: &StatsKey) {
        let mut inner = self.lock();
        if let Some(tx) = inner.in_flight.remove(key) {
            debug!(%key, "computation abandoned");
            let _ = tx.send(ComputeOutcome::Failed {
                message: "computation abandoned".to_string(),
                fallback: true,
            });
        }
    }

    /// Drop the entry for `key`; the next request recomputes.
    pub fn invalidate(&self, key: &StatsKey) {
        let mut inner = self.lock();
        if inner.entries.remove(key).is_some() {
            debug!(%key, "cache entry invalidated");
        }
    }

    /// Store a value directly, bypassing the in-flight protocol. Used
    /// by bulk recalculation, which computes eagerly.
    pub fn insert(&self, key: &StatsKey, value: StatsValue) {
        let mut inner = self.lock();
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Whether any value is cached, fresh or stale.
    pub fn any_cached(&self) -> bool {
        !self.lock().entries.is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        // Statistics values are plain data; a poisoned lock only means
        // another thread panicked mid-insert, and the map is still a
        // valid map.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::StatsKey;

    fn value() -> StatsValue {
        StatsValue::zeroed_for(&StatsKey::Global)
    }

    #[test]
    fn test_absent_then_fresh_then_stale() {
        let cache = StatsCache::new(Duration::from_secs(60));
        let key = StatsKey::Global;

        assert!(matches!(cache.lookup(&key), Lookup::Absent));

        cache.insert(&key, value());
        let stored = Instant::now();

        let at_30s = stored + Duration::from_secs(30);
        assert!(matches!(cache.lookup_at(&key, at_30s), Lookup::Fresh(_)));

        let at_61s = stored + Duration::from_secs(61);
        assert!(matches!(cache.lookup_at(&key, at_61s), Lookup::Stale(_)));
    }

    #[test]
    fn test_invalidate_makes_absent() {
        let cache = StatsCache::new(Duration::from_secs(60));
        let key = StatsKey::Student("s1".to_string());

        cache.insert(&key, value());
        cache.invalidate(&key);
        assert!(matches!(cache.lookup(&key), Lookup::Absent));

        // Other keys are untouched
        cache.insert(&StatsKey::Global, value());
        cache.invalidate(&key);
        assert!(matches!(cache.lookup(&StatsKey::Global), Lookup::Fresh(_)));
    }

    #[test]
    fn test_single_leader_per_key() {
        let cache = StatsCache::new(Duration::from_secs(60));
        let key = StatsKey::Teacher("t1".to_string());

        assert!(matches!(cache.begin_compute(&key), ComputeRole::Leader));
        assert!(matches!(cache.begin_compute(&key), ComputeRole::Follower(_)));
        assert!(matches!(cache.begin_compute(&key), ComputeRole::Follower(_)));

        // A different key still elects its own leader
        assert!(matches!(
            cache.begin_compute(&StatsKey::Global),
            ComputeRole::Leader
        ));
    }

    #[tokio::test]
    async fn test_followers_receive_outcome() {
        let cache = StatsCache::new(Duration::from_secs(60));
        let key = StatsKey::Global;

        assert!(matches!(cache.begin_compute(&key), ComputeRole::Leader));
        let ComputeRole::Follower(mut rx) = cache.begin_compute(&key) else {
            panic!("expected follower");
        };

        cache.finish_compute(&key, ComputeOutcome::Ready(value()));

        let outcome = rx.recv().await.unwrap();
        assert!(matches!(outcome, ComputeOutcome::Ready(_)));
        assert!(matches!(cache.lookup(&key), Lookup::Fresh(_)));

        // The flight is over; a new computation can start
        assert!(matches!(cache.begin_compute(&key), ComputeRole::Leader));
        cache.finish_compute(
            &key,
            ComputeOutcome::Failed {
                message: "database unavailable".to_string(),
                fallback: true,
            },
        );
    }

    #[tokio::test]
    async fn test_abort_clears_flight_and_wakes_followers() {
        let cache = StatsCache::new(Duration::from_secs(60));
        let key = StatsKey::Student("s1".to_string());

        cache.insert(&key, value());
        assert!(matches!(cache.begin_compute(&key), ComputeRole::Leader));
        let ComputeRole::Follower(mut rx) = cache.begin_compute(&key) else {
            panic!("expected follower");
        };

        cache.abort_compute(&key);

        // Followers are released with a stale-eligible failure instead
        // of waiting forever
        let outcome = rx.recv().await.unwrap();
        assert!(matches!(
            outcome,
            ComputeOutcome::Failed { fallback: true, .. }
        ));

        // The key is computable again and the entry survived
        assert!(matches!(cache.begin_compute(&key), ComputeRole::Leader));
        assert!(!matches!(cache.lookup(&key), Lookup::Absent));

        // Aborting a finished flight is a no-op
        cache.finish_compute(&key, ComputeOutcome::Ready(value()));
        cache.abort_compute(&key);
        assert!(matches!(cache.lookup(&key), Lookup::Fresh(_)));
    }

    #[test]
    fn test_failure_keeps_previous_entry() {
        let cache = StatsCache::new(Duration::from_secs(60));
        let key = StatsKey::Global;

        cache.insert(&key, value());
        assert!(matches!(cache.begin_compute(&key), ComputeRole::Leader));
        cache.finish_compute(
            &key,
            ComputeOutcome::Failed {
                message: "timeout".to_string(),
                fallback: true,
            },
        );

        // Stale fallback still possible after the failed refresh
        assert!(!matches!(cache.lookup(&key), Lookup::Absent));
    }
}
