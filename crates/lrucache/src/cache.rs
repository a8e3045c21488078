//! Thread-safe LRU cache

use std::hash::Hash;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::Result;
use crate::lru::{LruCore, Put};
use crate::stats::CacheStats;

/// Capability contract of a fixed-capacity cache
///
/// Every method takes `&self`; implementations synchronize internally.
/// `get` is a mutating read: a hit promotes the entry, so implementations
/// must serialize it with writers rather than admit it under a shared lock.
pub trait Cache<K, V>
where
    K: Hash + Eq,
{
    /// Insert or replace a value. Returns whether the entry was stored.
    fn put(&self, key: K, value: V) -> bool;

    /// Get a value, marking it most recently used
    fn get(&self, key: &K) -> Option<V>;

    /// Number of cached entries
    fn len(&self) -> usize;

    /// Whether the cache holds no entries
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry
    fn clear(&self);
}

/// Fixed-capacity LRU cache safe to share between threads
///
/// Index and recency list sit behind a single [`Mutex`]; every public
/// operation, `get` included, runs as one critical section. Values are cloned
/// out of the lock, so store `Arc<V>` for large values.
pub struct LruCache<K, V> {
    /// Lookup index and recency list, always locked together
    core: Mutex<LruCore<K, V>>,

    /// Cache statistics
    stats: CacheStats,

    /// Cache capacity
    capacity: usize,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a new cache holding at most `capacity` entries
    ///
    /// # Errors
    /// * `Error::InvalidCapacity` - `capacity` is zero
    pub fn new(capacity: usize) -> Result<Self> {
        let core = LruCore::new(capacity)?;
        debug!(capacity, "created LRU cache");

        Ok(Self {
            core: Mutex::new(core),
            stats: CacheStats::new(),
            capacity,
        })
    }

    /// Get a value without promoting it
    pub fn peek(&self, key: &K) -> Option<V> {
        self.core.lock().peek(key).cloned()
    }

    /// Check membership without promoting
    pub fn contains(&self, key: &K) -> bool {
        self.core.lock().contains(key)
    }

    /// Remove a key, returning its value
    pub fn remove(&self, key: &K) -> Option<V> {
        self.core.lock().remove(key)
    }

    /// Snapshot of cached keys, most recently used first
    pub fn keys(&self) -> Vec<K> {
        self.core.lock().iter().map(|e| e.key().clone()).collect()
    }

    /// Get cache capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Validates internal invariants under the lock. Available in debug/test
    /// builds.
    ///
    /// Panics if any invariant is violated.
    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        self.core.lock().debug_validate_invariants();
    }
}

impl<K, V> Cache<K, V> for LruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn put(&self, key: K, value: V) -> bool {
        let mut core = self.core.lock();
        let put = core.put(key, value);

        // Counters change under the guard so a concurrent clear cannot
        // reset them between the write and its record
        match &put {
            Put::Updated(_) => self.stats.record_update(),
            Put::Inserted { evicted, .. } => {
                self.stats.record_insert();
                if evicted.is_some() {
                    self.stats.record_eviction();
                }
            }
        }
        drop(core);

        // Evicted entries are dropped after the lock is released
        if matches!(put, Put::Inserted { evicted: Some(_), .. }) {
            trace!("evicted least recently used entry");
        }
        !put.node().is_empty()
    }

    fn get(&self, key: &K) -> Option<V> {
        let mut core = self.core.lock();
        let value = core.get(key).cloned();

        match value {
            Some(_) => self.stats.record_hit(),
            None => self.stats.record_miss(),
        }
        value
    }

    fn len(&self) -> usize {
        self.core.lock().len()
    }

    fn clear(&self) {
        let dropped = {
            let mut core = self.core.lock();
            let dropped = core.len();
            core.clear();
            self.stats.reset();
            dropped
        };
        trace!(dropped, "cleared cache");
    }
}
