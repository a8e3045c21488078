//! # lrucache
//!
//! Fixed-capacity LRU cache safe for concurrent readers and writers.
//!
//! ## Architecture
//! - **Lookup index**: AHash map from key to node handle (O(1))
//! - **Recency list**: arena-backed doubly-linked list, most recent at the head (O(1))
//! - **Engine**: both structures behind one `parking_lot::Mutex`
//!
//! ```
//! use lrucache::{Cache, LruCache};
//!
//! let cache = LruCache::new(2).unwrap();
//! cache.put(1, "a");
//! cache.put(2, "b");
//! assert_eq!(cache.get(&1), Some("a"));
//! cache.put(3, "c"); // evicts 2
//! assert_eq!(cache.get(&2), None);
//! assert_eq!(cache.len(), 2);
//! ```

#![warn(missing_docs)]

mod cache;
mod entry;
mod error;
mod list;
mod lru;
mod stats;

pub use cache::{Cache, LruCache};
pub use entry::Entry;
pub use error::{Error, Result};
pub use list::{Iter, NodeRef, RecencyList};
pub use lru::{LruCore, Put};
pub use stats::CacheStats;
