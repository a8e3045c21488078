//! Recency list: doubly-linked list of entries ordered by last use.
//!
//! Nodes live in an arena (`Vec` of slots plus a free list), so `prev`/`next`
//! links are slot indices rather than pointers. Callers hold [`NodeRef`]
//! handles that carry the owning list's identity and the slot generation,
//! which lets every operation reject handles from another list or handles
//! whose slot has since been freed or reused.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::entry::Entry;

/// Source of list identities; 0 is reserved for [`NodeRef::EMPTY`].
static NEXT_LIST_ID: AtomicU64 = AtomicU64::new(1);

const EMPTY_SLOT: usize = usize::MAX;

fn next_list_id() -> u64 {
    NEXT_LIST_ID.fetch_add(1, Ordering::Relaxed)
}

/// Handle to a node linked into a [`RecencyList`]
///
/// Handles stay valid while the node is linked, across any number of
/// moves. [`NodeRef::EMPTY`] stands for "no such position".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    list: u64,
    slot: usize,
    generation: u64,
}

impl NodeRef {
    /// The empty node
    pub const EMPTY: NodeRef = NodeRef {
        list: 0,
        slot: EMPTY_SLOT,
        generation: 0,
    };

    /// Whether this is the empty node
    pub fn is_empty(&self) -> bool {
        self.slot == EMPTY_SLOT
    }
}

impl Default for NodeRef {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[derive(Debug)]
struct Node<K, V> {
    entry: Entry<K, V>,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
struct Slot<K, V> {
    generation: u64,
    node: Option<Node<K, V>>,
}

/// Doubly-linked list with the most recently used entry at the head and the
/// least recently used entry at the tail
///
/// Every operation is O(1); only [`iter`] and the invariant check walk it.
///
/// # Panics
///
/// Operations taking a [`NodeRef`] panic when the handle is empty, belongs to
/// another list, or refers to a node that is no longer linked. Such a handle
/// can only come from a bug in the caller's bookkeeping.
///
/// [`iter`]: RecencyList::iter
#[derive(Debug)]
pub struct RecencyList<K, V> {
    id: u64,
    slots: Vec<Slot<K, V>>,
    free_list: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<K, V> RecencyList<K, V> {
    /// Create an empty list
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty list with room for `capacity` nodes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            id: next_list_id(),
            slots: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Number of linked nodes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the list has no nodes
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Most recently used node, or [`NodeRef::EMPTY`]
    pub fn head(&self) -> NodeRef {
        self.head.map_or(NodeRef::EMPTY, |idx| self.handle(idx))
    }

    /// Least recently used node, or [`NodeRef::EMPTY`]
    pub fn tail(&self) -> NodeRef {
        self.tail.map_or(NodeRef::EMPTY, |idx| self.handle(idx))
    }

    /// Whether `node` is currently linked into this list
    pub fn contains(&self, node: NodeRef) -> bool {
        self.live_slot(node).is_some()
    }

    /// Entry held by `node`, or `None` if the handle is not live here
    pub fn get(&self, node: NodeRef) -> Option<&Entry<K, V>> {
        self.live_slot(node).map(|idx| &self.node(idx).entry)
    }

    /// Entry held by `node`
    ///
    /// # Panics
    ///
    /// If `node` is not linked into this list.
    pub fn entry(&self, node: NodeRef) -> &Entry<K, V> {
        let idx = self.slot_of(node);
        &self.node(idx).entry
    }

    /// Link a new node holding `entry` at the head
    pub fn insert_front(&mut self, entry: Entry<K, V>) -> NodeRef {
        let idx = self.alloc(Node {
            entry,
            prev: None,
            next: None,
        });
        self.link_front(idx);
        self.len += 1;
        self.handle(idx)
    }

    /// Relink `node` at the head. No-op if it already is the head.
    pub fn move_to_front(&mut self, node: NodeRef) -> NodeRef {
        let idx = self.slot_of(node);
        if self.head != Some(idx) {
            self.unlink(idx);
            self.link_front(idx);
        }
        node
    }

    /// Swap `entry` into `node` and relink it at the head
    ///
    /// The previous entry is dropped. The returned handle is `node` itself.
    pub fn update_and_move_to_front(&mut self, node: NodeRef, entry: Entry<K, V>) -> NodeRef {
        let idx = self.slot_of(node);
        self.node_mut(idx).entry = entry;
        self.move_to_front(node)
    }

    /// Unlink the least recently used node and return its entry
    ///
    /// Returns `None` on an empty list.
    pub fn remove_tail(&mut self) -> Option<Entry<K, V>> {
        let idx = self.tail?;
        Some(self.detach(idx))
    }

    /// Unlink `node` from anywhere in the list and return its entry
    pub fn remove(&mut self, node: NodeRef) -> Entry<K, V> {
        let idx = self.slot_of(node);
        self.detach(idx)
    }

    /// Drop every node
    ///
    /// Handles issued before the clear are rejected afterwards.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free_list.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
        self.id = next_list_id();
    }

    /// Iterate entries from most to least recently used
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            list: self,
            next: self.head,
            remaining: self.len,
        }
    }

    /// Validates link structure. Available in debug/test builds.
    ///
    /// Panics if any invariant is violated.
    #[cfg(any(test, debug_assertions))]
    pub fn check_invariants(&self) {
        let live = self.slots.iter().filter(|s| s.node.is_some()).count();
        assert_eq!(live, self.len, "live slots({}) != len({})", live, self.len);
        assert_eq!(
            live + self.free_list.len(),
            self.slots.len(),
            "live({}) + free({}) != slots({})",
            live,
            self.free_list.len(),
            self.slots.len()
        );
        for &idx in &self.free_list {
            assert!(self.slots[idx].node.is_none(), "free slot {} is occupied", idx);
        }

        // Forward walk; bounded so a cycle fails instead of hanging.
        let mut count = 0;
        let mut prev = None;
        let mut cur = self.head;
        while let Some(idx) = cur {
            assert!(count < self.len, "forward walk exceeds len({})", self.len);
            let node = self.node(idx);
            assert_eq!(node.prev, prev, "node {} has a broken prev link", idx);
            prev = Some(idx);
            cur = node.next;
            count += 1;
        }
        assert_eq!(count, self.len, "forward walk({}) != len({})", count, self.len);
        assert_eq!(prev, self.tail, "forward walk does not end at tail");

        let mut count = 0;
        let mut next = None;
        let mut cur = self.tail;
        while let Some(idx) = cur {
            assert!(count < self.len, "backward walk exceeds len({})", self.len);
            let node = self.node(idx);
            assert_eq!(node.next, next, "node {} has a broken next link", idx);
            next = Some(idx);
            cur = node.prev;
            count += 1;
        }
        assert_eq!(count, self.len, "backward walk({}) != len({})", count, self.len);
        assert_eq!(next, self.head, "backward walk does not end at head");
    }

    fn handle(&self, idx: usize) -> NodeRef {
        NodeRef {
            list: self.id,
            slot: idx,
            generation: self.slots[idx].generation,
        }
    }

    fn live_slot(&self, node: NodeRef) -> Option<usize> {
        if node.is_empty() || node.list != self.id {
            return None;
        }
        let slot = self.slots.get(node.slot)?;
        (slot.generation == node.generation && slot.node.is_some()).then_some(node.slot)
    }

    fn slot_of(&self, node: NodeRef) -> usize {
        assert!(!node.is_empty(), "empty node used as a linked position");
        assert_eq!(
            node.list, self.id,
            "node {:?} does not belong to this recency list",
            node
        );
        match self.live_slot(node) {
            Some(idx) => idx,
            None => panic!("stale node {:?}: slot was freed or reused", node),
        }
    }

    fn node(&self, idx: usize) -> &Node<K, V> {
        match &self.slots[idx].node {
            Some(node) => node,
            None => panic!("recency list links to vacant slot {}", idx),
        }
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node<K, V> {
        match &mut self.slots[idx].node {
            Some(node) => node,
            None => panic!("recency list links to vacant slot {}", idx),
        }
    }

    fn alloc(&mut self, node: Node<K, V>) -> usize {
        if let Some(idx) = self.free_list.pop() {
            self.slots[idx].node = Some(node);
            idx
        } else {
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            self.slots.len() - 1
        }
    }

    fn detach(&mut self, idx: usize) -> Entry<K, V> {
        self.unlink(idx);
        let slot = &mut self.slots[idx];
        let node = match slot.node.take() {
            Some(node) => node,
            None => panic!("detaching vacant slot {}", idx),
        };
        slot.generation += 1;
        self.free_list.push(idx);
        self.len -= 1;
        node.entry
    }

    fn link_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let node = self.node_mut(idx);
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(head_idx) => self.node_mut(head_idx).prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.node_mut(idx);
            (node.prev.take(), node.next.take())
        };

        match prev {
            Some(prev_idx) => self.node_mut(prev_idx).next = next,
            None => self.head = next,
        }

        match next {
            Some(next_idx) => self.node_mut(next_idx).prev = prev,
            None => self.tail = prev,
        }
    }
}

impl<K, V> Default for RecencyList<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over a [`RecencyList`], most recent first
pub struct Iter<'a, K, V> {
    list: &'a RecencyList<K, V>,
    next: Option<usize>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = &'a Entry<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.next?;
        let node = self.list.node(idx);
        self.next = node.next;
        self.remaining -= 1;
        Some(&node.entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<'a, K, V> IntoIterator for &'a RecencyList<K, V> {
    type Item = &'a Entry<K, V>;
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &RecencyList<u32, &'static str>) -> Vec<u32> {
        list.iter().map(|e| *e.key()).collect()
    }

    #[test]
    fn test_insert_front_orders_most_recent_first() {
        let mut list = RecencyList::new();
        list.insert_front(Entry::new(1, "a"));
        list.insert_front(Entry::new(2, "b"));
        list.insert_front(Entry::new(3, "c"));

        assert_eq!(keys(&list), vec![3, 2, 1]);
        assert_eq!(list.len(), 3);
        assert_eq!(list.entry(list.head()).key(), &3);
        assert_eq!(list.entry(list.tail()).key(), &1);
        list.check_invariants();
    }

    #[test]
    fn test_move_to_front() {
        let mut list = RecencyList::new();
        let a = list.insert_front(Entry::new(1, "a"));
        list.insert_front(Entry::new(2, "b"));
        list.insert_front(Entry::new(3, "c"));

        // Tail to head
        assert_eq!(list.move_to_front(a), a);
        assert_eq!(keys(&list), vec![1, 3, 2]);
        list.check_invariants();

        // Head stays put
        assert_eq!(list.move_to_front(a), a);
        assert_eq!(keys(&list), vec![1, 3, 2]);
        list.check_invariants();
    }

    #[test]
    fn test_move_middle_to_front() {
        let mut list = RecencyList::new();
        list.insert_front(Entry::new(1, "a"));
        let b = list.insert_front(Entry::new(2, "b"));
        list.insert_front(Entry::new(3, "c"));

        list.move_to_front(b);
        assert_eq!(keys(&list), vec![2, 3, 1]);
        list.check_invariants();
    }

    #[test]
    fn test_update_and_move_to_front() {
        let mut list = RecencyList::new();
        let a = list.insert_front(Entry::new(1, "a"));
        list.insert_front(Entry::new(2, "b"));

        let node = list.update_and_move_to_front(a, Entry::new(1, "z"));
        assert_eq!(node, a);
        assert_eq!(list.entry(node).value(), &"z");
        assert_eq!(keys(&list), vec![1, 2]);
        assert_eq!(list.len(), 2);
        list.check_invariants();
    }

    #[test]
    fn test_remove_tail() {
        let mut list = RecencyList::new();
        list.insert_front(Entry::new(1, "a"));
        list.insert_front(Entry::new(2, "b"));

        assert_eq!(list.remove_tail(), Some(Entry::new(1, "a")));
        assert_eq!(list.remove_tail(), Some(Entry::new(2, "b")));
        assert_eq!(list.remove_tail(), None);
        assert!(list.is_empty());
        assert!(list.head().is_empty());
        assert!(list.tail().is_empty());
        list.check_invariants();
    }

    #[test]
    fn test_remove_middle() {
        let mut list = RecencyList::new();
        list.insert_front(Entry::new(1, "a"));
        let b = list.insert_front(Entry::new(2, "b"));
        list.insert_front(Entry::new(3, "c"));

        assert_eq!(list.remove(b), Entry::new(2, "b"));
        assert!(!list.contains(b));
        assert_eq!(keys(&list), vec![3, 1]);
        list.check_invariants();
    }

    #[test]
    fn test_slot_reuse_invalidates_old_handle() {
        let mut list = RecencyList::new();
        let a = list.insert_front(Entry::new(1, "a"));
        list.remove_tail();

        let b = list.insert_front(Entry::new(2, "b"));
        assert_ne!(a, b);
        assert!(!list.contains(a));
        assert!(list.get(a).is_none());
        assert_eq!(list.get(b).map(|e| *e.value()), Some("b"));
    }

    #[test]
    fn test_clear() {
        let mut list = RecencyList::new();
        let a = list.insert_front(Entry::new(1, "a"));
        list.insert_front(Entry::new(2, "b"));

        list.clear();
        assert_eq!(list.len(), 0);
        assert!(list.is_empty());
        assert!(!list.contains(a));
        assert_eq!(list.iter().count(), 0);
        list.check_invariants();

        // Clearing twice is fine
        list.clear();
        assert!(list.is_empty());
    }

    #[test]
    #[should_panic(expected = "does not belong")]
    fn test_handle_from_cleared_list_rejected() {
        let mut list = RecencyList::new();
        let a = list.insert_front(Entry::new(1, "a"));
        list.clear();
        list.insert_front(Entry::new(2, "b"));
        list.move_to_front(a);
    }

    #[test]
    #[should_panic(expected = "does not belong")]
    fn test_foreign_handle_rejected() {
        let mut first = RecencyList::new();
        let mut second = RecencyList::new();
        let a = first.insert_front(Entry::new(1, "a"));
        second.insert_front(Entry::new(1, "a"));
        second.move_to_front(a);
    }

    #[test]
    #[should_panic(expected = "stale node")]
    fn test_stale_handle_rejected() {
        let mut list = RecencyList::new();
        let a = list.insert_front(Entry::new(1, "a"));
        list.remove_tail();
        list.insert_front(Entry::new(2, "b"));
        list.move_to_front(a);
    }

    #[test]
    #[should_panic(expected = "empty node")]
    fn test_empty_handle_rejected() {
        let list: RecencyList<u32, &str> = RecencyList::new();
        list.entry(NodeRef::EMPTY);
    }

    #[test]
    fn test_mixed_operations_keep_links_consistent() {
        let mut list = RecencyList::new();
        let mut handles = Vec::new();
        let mut seed = 0x2545_f491_u32;

        for step in 0..2_000u32 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            match seed % 4 {
                0 | 1 => handles.push(list.insert_front(Entry::new(step, "v"))),
                2 if !handles.is_empty() => {
                    let node = handles[(seed as usize / 4) % handles.len()];
                    list.move_to_front(node);
                }
                _ => {
                    if list.remove_tail().is_some() {
                        handles.retain(|h| list.contains(*h));
                    }
                }
            }
            assert_eq!(handles.len(), list.len());
        }
        list.check_invariants();
    }
}
