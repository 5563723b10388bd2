//! Bounded, TTL-bounded in-process result cache.
//!
//! Entries expire a fixed time after insertion; reads never extend that.
//! Once the entry limit is reached the least recently used entry is evicted.
//! Expired entries are removed on read and by a periodic sweep.
//!
//! The clock is injected so tests can move time by hand.

use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::defaults;

/// Time source for expiry decisions.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset_ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_ms: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

/// Cache sizing and expiry.
///
/// Environment variables:
/// - `RESULT_CACHE_MAX_ENTRIES`
/// - `RESULT_CACHE_TTL_SECS`
/// - `RESULT_CACHE_PURGE_INTERVAL_SECS`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub ttl: Duration,
    pub purge_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: defaults::RESULT_CACHE_MAX_ENTRIES,
            ttl: Duration::from_secs(defaults::RESULT_CACHE_TTL_SECS),
            purge_interval: Duration::from_secs(defaults::RESULT_CACHE_PURGE_INTERVAL_SECS),
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        let max_entries = std::env::var("RESULT_CACHE_MAX_ENTRIES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::RESULT_CACHE_MAX_ENTRIES)
            .max(1);

        let ttl_secs = std::env::var("RESULT_CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::RESULT_CACHE_TTL_SECS);

        let purge_secs = std::env::var("RESULT_CACHE_PURGE_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::RESULT_CACHE_PURGE_INTERVAL_SECS)
            .max(1);

        Self {
            max_entries,
            ttl: Duration::from_secs(ttl_secs),
            purge_interval: Duration::from_secs(purge_secs),
        }
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_purge_interval(mut self, interval: Duration) -> Self {
        self.purge_interval = interval;
        self
    }
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

struct Inner<K: Hash + Eq, V> {
    entries: Mutex<LruCache<K, Entry<V>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

/// Shared handle to a result cache. Clones point at the same entries.
pub struct ResultCache<K: Hash + Eq, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K: Hash + Eq, V> Clone for ResultCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: Hash + Eq, V> fmt::Debug for ResultCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCache")
            .field("ttl", &self.inner.ttl)
            .field("clock", &self.inner.clock)
            .finish_non_exhaustive()
    }
}

impl<K, V> ResultCache<K, V>
where
    K: Hash + Eq + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Cache on the system clock.
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(LruCache::new(capacity)),
                ttl: config.ttl,
                clock,
            }),
        }
    }

    /// Default time-to-live applied by [`set`](Self::set).
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Look up a live entry, marking it most recently used.
    pub async fn get(&self, key: &K) -> Option<V> {
        let now = self.inner.clock.now();
        let mut entries = self.inner.entries.lock().await;

        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    /// Insert with the configured time-to-live.
    pub async fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, self.inner.ttl).await;
    }

    /// Insert with an explicit time-to-live, evicting the least recently
    /// used entry when full.
    pub async fn set_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let expires_at = self.inner.clock.now() + ttl;
        let mut entries = self.inner.entries.lock().await;
        let at_capacity = entries.len() == entries.cap().get() && !entries.contains(&key);
        entries.put(key, Entry { value, expires_at });
        if at_capacity {
            trace!(component = "result_cache", "Evicted least recently used entry");
        }
    }

    pub async fn remove(&self, key: &K) -> Option<V> {
        self.inner.entries.lock().await.pop(key).map(|e| e.value)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        purge(&self.inner).await
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.inner.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        self.inner.entries.lock().await.clear();
    }

    /// Sweep expired entries every `interval` until every handle is dropped.
    pub fn spawn_purge_task(&self, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Inner<K, V>> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    debug!(component = "result_cache", "Cache dropped, stopping purge task");
                    break;
                };
                let removed = purge(&inner).await;
                if removed > 0 {
                    debug!(component = "result_cache", removed, "Purged expired entries");
                }
            }
        })
    }
}

async fn purge<K: Hash + Eq + Clone, V>(inner: &Inner<K, V>) -> usize {
    let now = inner.clock.now();
    let mut entries = inner.entries.lock().await;
    let expired: Vec<K> = entries
        .iter()
        .filter(|(_, entry)| entry.expires_at <= now)
        .map(|(key, _)| key.clone())
        .collect();
    for key in &expired {
        entries.pop(key);
    }
    expired.len()
}
