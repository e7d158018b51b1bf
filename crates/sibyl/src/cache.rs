//! TTL cache with capacity-bounded LRU eviction.
//!
//! Memoizes expensive calls (classification, retrieval, generation).
//! Expired entries are purged lazily on access; `prune_expired` offers a
//! sweep entry point so stale entries never accumulate unboundedly.

use lru::LruCache;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) > self.ttl
    }
}

/// Snapshot of cache occupancy
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub default_ttl: Duration,
}

/// Thread-safe key/value store with per-entry expiry and LRU eviction.
///
/// Only the internal map mutation is guarded; callers never hold the lock
/// across an external call.
pub struct TtlCache<K: Hash + Eq, V: Clone> {
    inner: Mutex<LruCache<K, CacheEntry<V>>>,
    default_ttl: Duration,
    capacity: usize,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    /// Create a cache holding at most `capacity` live entries.
    ///
    /// `capacity` must be non-zero; config validation enforces this before
    /// construction.
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        let capacity = capacity.max(1);
        let inner = LruCache::new(NonZeroUsize::new(capacity).expect("capacity is >= 1"));
        Self {
            inner: Mutex::new(inner),
            default_ttl,
            capacity,
        }
    }

    /// Look up a key. Returns `None` on miss or when the entry's TTL has
    /// elapsed; an expired entry is removed on the spot. A hit counts as a
    /// use for LRU purposes.
    pub async fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();

        match inner.get(key) {
            Some(entry) if entry.is_expired(now) => {
                inner.pop(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Insert with the cache's default TTL. Overwrites any existing entry
    /// for the key and resets its TTL clock.
    pub async fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, self.default_ttl).await;
    }

    /// Insert with an explicit TTL. When the cache is full the
    /// least-recently-used entry is evicted first.
    pub async fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let mut inner = self.inner.lock().await;
        inner.put(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Remove one key.
    pub async fn invalidate(&self, key: &K) {
        self.inner.lock().await.pop(key);
    }

    /// Remove everything.
    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }

    /// Drop every expired entry. Returns the number removed.
    pub async fn prune_expired(&self) -> usize
    where
        K: Clone,
    {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();

        let expired: Vec<K> = inner
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key)
            .cloned()
            .collect();

        for key in &expired {
            inner.pop(key);
        }
        expired.len()
    }

    /// Number of live entries (including any not yet lazily purged).
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Occupancy snapshot for diagnostics.
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.inner.lock().await.len(),
            capacity: self.capacity,
            default_ttl: self.default_ttl,
        }
    }
}

/// Spawn a periodic sweep over `cache`. The task holds the cache lock only
/// for the duration of the prune itself, never across external calls.
pub fn spawn_sweeper<K, V>(
    cache: Arc<TtlCache<K, V>>,
    interval: Duration,
) -> tokio::task::JoinHandle<()>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            let removed = cache.prune_expired().await;
            if removed > 0 {
                debug!(removed, "cache sweep removed expired entries");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_fresh_value() {
        let cache: TtlCache<String, String> = TtlCache::new(10, Duration::from_secs(60));
        cache.set("k".to_string(), "v".to_string()).await;
        assert_eq!(cache.get(&"k".to_string()).await, Some("v".to_string()));
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let cache: TtlCache<String, String> = TtlCache::new(10, Duration::from_millis(30));
        cache.set("k".to_string(), "v".to_string()).await;

        assert_eq!(cache.get(&"k".to_string()).await, Some("v".to_string()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.get(&"k".to_string()).await, None);
        // the stale entry was purged on access
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn set_resets_ttl_clock() {
        let cache: TtlCache<String, u32> = TtlCache::new(10, Duration::from_millis(60));
        cache.set("k".to_string(), 1).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        cache.set("k".to_string(), 2).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        // 80ms since first insert but only 40ms since overwrite
        assert_eq!(cache.get(&"k".to_string()).await, Some(2));
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let cache: TtlCache<String, u32> = TtlCache::new(2, Duration::from_secs(60));
        cache.set("a".to_string(), 1).await;
        cache.set("b".to_string(), 2).await;

        // touch "a" so "b" becomes the eviction candidate
        assert_eq!(cache.get(&"a".to_string()).await, Some(1));

        cache.set("c".to_string(), 3).await;
        assert_eq!(cache.get(&"a".to_string()).await, Some(1));
        assert_eq!(cache.get(&"b".to_string()).await, None);
        assert_eq!(cache.get(&"c".to_string()).await, Some(3));
    }

    #[tokio::test]
    async fn prune_removes_only_expired() {
        let cache: TtlCache<String, u32> = TtlCache::new(10, Duration::from_secs(60));
        cache
            .set_with_ttl("short".to_string(), 1, Duration::from_millis(20))
            .await;
        cache.set("long".to_string(), 2).await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        let removed = cache.prune_expired().await;
        assert_eq!(removed, 1);
        assert_eq!(cache.get(&"long".to_string()).await, Some(2));
    }

    #[tokio::test]
    async fn invalidate_and_clear() {
        let cache: TtlCache<String, u32> = TtlCache::new(10, Duration::from_secs(60));
        cache.set("a".to_string(), 1).await;
        cache.set("b".to_string(), 2).await;

        cache.invalidate(&"a".to_string()).await;
        assert_eq!(cache.get(&"a".to_string()).await, None);
        assert_eq!(cache.len().await, 1);

        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
