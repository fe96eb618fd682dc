//! Concurrent TTL cache with per-user invalidation.
//!
//! Entries are stored JSON-encoded so one cache can hold values of any
//! serializable type. A value that no longer decodes as the requested type
//! is treated as a miss and evicted.
//!
//! ## Thread Safety
//!
//! - Entries live in a `DashMap`; each entry is inserted whole, so a racing
//!   `sweep` observes either the previous entry or the new one
//! - Counters are relaxed atomics; `stats()` is a point-in-time snapshot

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::CacheError;

struct CacheEntry {
    payload: String,
    expires_at: Instant,
    user_id: Option<String>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Counters for cache activity.
#[derive(Debug, Default)]
struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries removed because they expired or failed to decode
    pub evictions: u64,
    /// Entries removed by `invalidate`/`invalidate_for_user`
    pub invalidations: u64,
    pub entries: usize,
    /// `hits / (hits + misses)`, 0.0 before any lookup
    pub hit_rate: f64,
}

enum Lookup<V> {
    Missing,
    Expired,
    Found(Result<V, serde_json::Error>),
}

/// TTL cache keyed by string.
pub struct TtlCache {
    entries: DashMap<String, CacheEntry>,
    metrics: CacheMetrics,
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TtlCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            metrics: CacheMetrics::default(),
        }
    }

    /// Look up `key`, decoding the stored value as `V`.
    pub fn get<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let lookup = match self.entries.get(key) {
            None => Lookup::Missing,
            Some(entry) if entry.is_expired(now) => Lookup::Expired,
            Some(entry) => Lookup::Found(serde_json::from_str::<V>(&entry.payload)),
        };

        match lookup {
            Lookup::Found(Ok(value)) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Lookup::Found(Err(e)) => {
                debug!(key = %key, error = %e, "Evicting undecodable cache entry");
                if self.entries.remove(key).is_some() {
                    self.metrics.evictions.fetch_add(1, Ordering::Relaxed);
                }
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Lookup::Expired => {
                // Only drop the entry if it is still the expired one
                if self
                    .entries
                    .remove_if(key, |_, entry| entry.is_expired(now))
                    .is_some()
                {
                    self.metrics.evictions.fetch_add(1, Ordering::Relaxed);
                }
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Lookup::Missing => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `value` under `key` for `ttl`, optionally owned by `user_id`.
    pub fn set<V: Serialize>(
        &self,
        key: impl Into<String>,
        value: &V,
        ttl: Duration,
        user_id: Option<&str>,
    ) -> Result<(), CacheError> {
        let payload = serde_json::to_string(value)?;
        let entry = CacheEntry {
            payload,
            expires_at: Instant::now() + ttl,
            user_id: user_id.map(str::to_string),
        };
        self.entries.insert(key.into(), entry);
        Ok(())
    }

    /// Remove a single entry. Returns true if it existed.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every entry for which `predicate(key, owner)` holds.
    pub fn invalidate<F>(&self, predicate: F) -> usize
    where
        F: Fn(&str, Option<&str>) -> bool,
    {
        let mut removed = 0usize;
        self.entries.retain(|key, entry| {
            let drop_it = predicate(key, entry.user_id.as_deref());
            if drop_it {
                removed += 1;
            }
            !drop_it
        });
        self.metrics
            .invalidations
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Remove every entry stored for `user_id`.
    pub fn invalidate_for_user(&self, user_id: &str) -> usize {
        let removed = self.invalidate(|_, owner| owner == Some(user_id));
        if removed > 0 {
            debug!(user_id = %user_id, removed, "Invalidated cached entries for user");
        }
        removed
    }

    /// Remove all expired entries. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0usize;
        self.entries.retain(|_, entry| {
            let expired = entry.is_expired(now);
            if expired {
                removed += 1;
            }
            !expired
        });
        self.metrics
            .evictions
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Spawn a task that sweeps every `interval` until `cancel` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            if interval.is_zero() {
                warn!("Cache sweep interval is zero, sweeper not started");
                return;
            }
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Cache sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = cache.sweep();
                        if removed > 0 {
                            debug!(removed, remaining = cache.len(), "Swept expired cache entries");
                        }
                    }
                }
            }
        })
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.metrics.hits.load(Ordering::Relaxed);
        let misses = self.metrics.misses.load(Ordering::Relaxed);
        let requests = hits + misses;
        CacheStats {
            hits,
            misses,
            evictions: self.metrics.evictions.load(Ordering::Relaxed),
            invalidations: self.metrics.invalidations.load(Ordering::Relaxed),
            entries: self.entries.len(),
            hit_rate: if requests == 0 {
                0.0
            } else {
                hits as f64 / requests as f64
            },
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries. Counters are kept.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_round_trip_then_expiry() {
        let cache = TtlCache::new();
        cache
            .set("k", &vec![1u32, 2, 3], Duration::from_secs(10), None)
            .unwrap();

        assert_eq!(cache.get::<Vec<u32>>("k"), Some(vec![1, 2, 3]));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.get::<Vec<u32>>("k"), None);
        assert!(cache.is_empty());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
    }

    #[test]
    fn test_hit_rate_zero_without_requests() {
        let cache = TtlCache::new();
        let stats = cache.stats();
        assert_eq!(stats.hit_rate, 0.0);
        assert_eq!(stats.entries, 0);
    }

    #[tokio::test]
    async fn test_hit_rate() {
        let cache = TtlCache::new();
        cache.set("a", &1u8, Duration::from_secs(60), None).unwrap();
        let _ = cache.get::<u8>("a");
        let _ = cache.get::<u8>("a");
        let _ = cache.get::<u8>("a");
        let _ = cache.get::<u8>("missing");
        assert!((cache.stats().hit_rate - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_miss_and_evicted() {
        let cache = TtlCache::new();
        cache
            .set("k", &"not a number", Duration::from_secs(60), None)
            .unwrap();

        assert_eq!(cache.get::<u64>("k"), None);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_invalidate_for_user() {
        let cache = TtlCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("a", &1, ttl, Some("alice")).unwrap();
        cache.set("b", &2, ttl, Some("alice")).unwrap();
        cache.set("c", &3, ttl, Some("bob")).unwrap();
        cache.set("d", &4, ttl, None).unwrap();

        assert_eq!(cache.invalidate_for_user("alice"), 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get::<i32>("c"), Some(3));
        assert_eq!(cache.stats().invalidations, 2);
    }

    #[tokio::test]
    async fn test_invalidate_by_predicate() {
        let cache = TtlCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("search:1", &1, ttl, None).unwrap();
        cache.set("search:2", &2, ttl, None).unwrap();
        cache.set("profile:1", &3, ttl, None).unwrap();

        let removed = cache.invalidate(|key, _| key.starts_with("search:"));
        assert_eq!(removed, 2);
        assert_eq!(cache.get::<i32>("profile:1"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let cache = TtlCache::new();
        cache.set("short", &1, Duration::from_secs(1), None).unwrap();
        cache.set("long", &2, Duration::from_secs(100), None).unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get::<i32>("long"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_until_cancelled() {
        let cache = Arc::new(TtlCache::new());
        cache.set("k", &1, Duration::from_secs(1), None).unwrap();

        let cancel = CancellationToken::new();
        let handle = cache.spawn_sweeper(Duration::from_secs(5), cancel.clone());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(cache.is_empty());
        assert_eq!(cache.stats().evictions, 1);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_overwrite_replaces_entry() {
        let cache = TtlCache::new();
        cache.set("k", &1, Duration::from_secs(60), Some("u")).unwrap();
        cache.set("k", &2, Duration::from_secs(60), None).unwrap();
        assert_eq!(cache.get::<i32>("k"), Some(2));
        // Owner was replaced along with the value
        assert_eq!(cache.invalidate_for_user("u"), 0);
    }
}
