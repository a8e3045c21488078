//! Single-threaded LRU core: lookup index + recency list.
//!
//! [`LruCore`] is the unit of state the concurrent cache guards with one
//! lock. Both structures are mutated together here and nowhere else.

use std::collections::HashMap;
use std::hash::Hash;

use ahash::RandomState;

use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::list::{Iter, NodeRef, RecencyList};

/// Upper bound on slots reserved up front; larger caches grow on demand
const MAX_PREALLOC: usize = 1 << 16;

/// What a [`LruCore::put`] did
#[derive(Debug, PartialEq, Eq)]
pub enum Put<K, V> {
    /// The key was cached; its entry was replaced and promoted
    Updated(NodeRef),
    /// The key was new; `evicted` holds the entry pushed out to make room
    Inserted {
        /// Node now holding the new entry
        node: NodeRef,
        /// Least recently used entry removed before the insert
        evicted: Option<Entry<K, V>>,
    },
}

impl<K, V> Put<K, V> {
    /// Node holding the entry that was just written
    pub fn node(&self) -> NodeRef {
        match self {
            Put::Updated(node) => *node,
            Put::Inserted { node, .. } => *node,
        }
    }
}

/// LRU cache with fixed capacity, no internal locking
///
/// `get` takes `&mut self`: a hit promotes the entry, so reads mutate the
/// recency order and need exclusive access like writes do.
#[derive(Debug)]
pub struct LruCore<K, V> {
    index: HashMap<K, NodeRef, RandomState>,
    list: RecencyList<K, V>,
    capacity: usize,
}

impl<K, V> LruCore<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create a new LRU core holding at most `capacity` entries
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity(capacity));
        }

        let prealloc = capacity.min(MAX_PREALLOC);
        Ok(Self {
            index: HashMap::with_capacity_and_hasher(prealloc, RandomState::new()),
            list: RecencyList::with_capacity(prealloc),
            capacity,
        })
    }

    /// Get a value and promote it to most recently used
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let slot = self.index.get_mut(key)?;
        *slot = self.list.move_to_front(*slot);
        Some(self.list.entry(*slot).value())
    }

    /// Get a value without touching the recency order
    pub fn peek(&self, key: &K) -> Option<&V> {
        let node = self.index.get(key)?;
        Some(self.list.entry(*node).value())
    }

    /// Whether `key` is cached, without touching the recency order
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Insert or replace a value, evicting the least recently used entry
    /// when a new key arrives at capacity
    pub fn put(&mut self, key: K, value: V) -> Put<K, V> {
        if let Some(slot) = self.index.get_mut(&key) {
            // Update, not growth: never evicts
            *slot = self
                .list
                .update_and_move_to_front(*slot, Entry::new(key, value));
            return Put::Updated(*slot);
        }

        let evicted = if self.list.len() >= self.capacity {
            self.evict()
        } else {
            None
        };

        let node = self.list.insert_front(Entry::new(key.clone(), value));
        self.index.insert(key, node);
        Put::Inserted { node, evicted }
    }

    /// Remove a key from the cache
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let node = self.index.remove(key)?;
        let (_, value) = self.list.remove(node).into_parts();
        Some(value)
    }

    /// Remove the least recently used entry
    ///
    /// Returns `None` when the cache is empty.
    pub fn evict(&mut self) -> Option<Entry<K, V>> {
        let entry = self.list.remove_tail()?;
        let removed = self.index.remove(entry.key());
        assert!(removed.is_some(), "evicted entry was missing from the index");
        Some(entry)
    }

    /// Get the current number of entries
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clear the cache
    pub fn clear(&mut self) {
        self.index.clear();
        self.list.clear();
    }

    /// Iterate entries from most to least recently used
    pub fn iter(&self) -> Iter<'_, K, V> {
        self.list.iter()
    }

    /// Validates that index and list describe the same entries. Available in
    /// debug/test builds.
    ///
    /// Panics if any invariant is violated.
    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        self.list.check_invariants();

        assert_eq!(
            self.index.len(),
            self.list.len(),
            "index.len({}) != list.len({})",
            self.index.len(),
            self.list.len()
        );
        assert!(
            self.list.len() <= self.capacity,
            "len({}) > capacity({})",
            self.list.len(),
            self.capacity
        );

        for (key, node) in &self.index {
            let entry = self
                .list
                .get(*node)
                .unwrap_or_else(|| panic!("index references unlinked node {:?}", node));
            assert!(entry.key() == key, "node {:?} holds a different key", node);
        }
    }
}
