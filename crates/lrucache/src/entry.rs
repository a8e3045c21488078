//! Key-value pair stored in a recency list node

/// An immutable key-value pair.
///
/// Updating the value for a key builds a new `Entry` and swaps it into the
/// node; an existing entry is never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<K, V> {
    key: K,
    value: V,
}

impl<K, V> Entry<K, V> {
    /// Create a new entry
    pub fn new(key: K, value: V) -> Self {
        Self { key, value }
    }

    /// Key of this entry
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Value of this entry
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Split the entry into its key and value
    pub fn into_parts(self) -> (K, V) {
        (self.key, self.value)
    }
}
