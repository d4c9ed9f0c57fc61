//! TTL cache and the counter store backing the trigger rate limiter.
//!
//! The rate-limit state lives here rather than in the incident store: it is
//! consulted on every alert, needs no durability beyond its window, and an
//! expired entry simply means "not yet triggered this window". The cache is
//! injected into components instead of living as module-level state, so
//! tests can substitute a deterministic instance.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use llm_incident_core::Result;

use crate::CounterStore;

/// Default cache capacity
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries before eviction kicks in
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Cached entry with expiration
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Generic TTL cache with per-entry expiry
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    config: CacheConfig,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a new cache with the given configuration
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    /// Get a live entry
    pub fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().unwrap();
        entries
            .get(key)
            .filter(|e| !e.is_expired())
            .map(|e| e.value.clone())
    }

    /// Insert an entry with its own TTL
    pub fn insert(&self, key: K, value: V, ttl: Duration) {
        let mut entries = self.entries.write().unwrap();
        if entries.len() >= self.config.capacity {
            Self::evict_expired(&mut entries);
            // Still full: drop the entry closest to expiry
            if entries.len() >= self.config.capacity {
                if let Some(oldest) = entries
                    .iter()
                    .min_by_key(|(_, e)| e.expires_at)
                    .map(|(k, _)| k.clone())
                {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(key, CacheEntry::new(value, ttl));
    }

    /// Remove an entry
    pub fn remove(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.write().unwrap();
        entries.remove(key).map(|e| e.value)
    }

    /// Number of entries, expired included
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }

    /// Drop expired entries
    pub fn cleanup(&self) {
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();
        Self::evict_expired(&mut entries);
        let after = entries.len();
        if before != after {
            debug!(evicted = before - after, "Cache cleanup");
        }
    }

    fn evict_expired(entries: &mut HashMap<K, CacheEntry<V>>) {
        entries.retain(|_, e| !e.is_expired());
    }
}

impl<K> TtlCache<K, u64>
where
    K: Eq + Hash + Clone,
{
    /// Atomically increment the counter at `key`.
    ///
    /// An absent or expired entry restarts at 1 with a fresh `ttl`; a live
    /// entry keeps its original expiry, so the window is anchored at the
    /// first increment. Returns the post-increment value.
    pub fn incr(&self, key: K, ttl: Duration) -> u64 {
        let mut entries = self.entries.write().unwrap();
        match entries.entry(key) {
            Entry::Occupied(mut slot) => {
                if slot.get().is_expired() {
                    slot.insert(CacheEntry::new(1, ttl));
                    1
                } else {
                    let entry = slot.get_mut();
                    entry.value += 1;
                    entry.value
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(CacheEntry::new(1, ttl));
                1
            }
        }
    }
}

/// In-memory [`CounterStore`] over a [`TtlCache`]
#[derive(Debug)]
pub struct MemoryCounterStore {
    counters: TtlCache<String, u64>,
}

impl MemoryCounterStore {
    /// Create with the given cache configuration
    pub fn new(config: CacheConfig) -> Self {
        Self {
            counters: TtlCache::new(config),
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64> {
        Ok(self.counters.incr(key.to_string(), ttl))
    }
}
