//! Recency List Module
//!
//! Doubly linked list of entries ordered from most to least recently used,
//! stored in an arena and linked by slot index.
//!
//! ```text
//!   slot 0 (HEAD) <-> [mru] <-> ... <-> [lru] <-> slot 1 (TAIL)
//! ```
//!
//! The two sentinels are permanent. An empty list is the ring
//! `HEAD.next == TAIL`, `TAIL.prev == HEAD`. Freed slots go on a free list
//! and are reused by later links.
//!
//! None of these operations lock; the mutation processor owns the list.

use std::sync::Arc;

use crate::cache::entry::{Entry, DETACHED};

const HEAD: usize = 0;
const TAIL: usize = 1;

#[derive(Debug)]
struct Node<K, V> {
    entry: Option<Arc<Entry<K, V>>>,
    prev: usize,
    next: usize,
}

impl<K, V> Node<K, V> {
    fn sentinel(prev: usize, next: usize) -> Self {
        Self {
            entry: None,
            prev,
            next,
        }
    }
}

// == Recency List ==
/// Tracks access order for LRU eviction.
///
/// - Front (after HEAD) = Most recently used
/// - Back (before TAIL) = Least recently used
#[derive(Debug)]
pub struct RecencyList<K, V> {
    nodes: Vec<Node<K, V>>,
    free: Vec<usize>,
    len: usize,
}

impl<K, V> RecencyList<K, V> {
    // == Constructor ==
    /// Creates an empty list holding only the two sentinels.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::sentinel(HEAD, TAIL), Node::sentinel(HEAD, TAIL)],
            free: Vec::new(),
            len: 0,
        }
    }

    // == Link After Head ==
    /// Moves `entry` to the most recently used position.
    ///
    /// A detached entry is given a slot first; a linked entry is spliced out
    /// of its current position and relinked in place.
    pub fn link_after_head(&mut self, entry: &Arc<Entry<K, V>>) {
        let slot = match entry.slot() {
            DETACHED => {
                let slot = self.allocate(Arc::clone(entry));
                entry.set_slot(slot);
                self.len += 1;
                slot
            }
            slot => {
                self.detach(slot);
                slot
            }
        };

        let first = self.nodes[HEAD].next;
        self.nodes[slot].prev = HEAD;
        self.nodes[slot].next = first;
        self.nodes[first].prev = slot;
        self.nodes[HEAD].next = slot;
    }

    // == Unlink ==
    /// Removes `entry` from the list and frees its slot.
    ///
    /// No-op if the entry is already detached.
    pub fn unlink(&mut self, entry: &Entry<K, V>) {
        let slot = entry.slot();
        if slot == DETACHED {
            return;
        }
        self.release(slot);
        entry.set_slot(DETACHED);
    }

    // == Unlink Tail ==
    /// Removes and returns the least recently used entry.
    ///
    /// Returns None if the list is empty; the sentinels are never returned.
    pub fn unlink_tail(&mut self) -> Option<Arc<Entry<K, V>>> {
        let last = self.nodes[TAIL].prev;
        if last == HEAD {
            return None;
        }
        let entry = self.release(last)?;
        entry.set_slot(DETACHED);
        Some(entry)
    }

    // == Keys ==
    /// Iterates entries from most to least recently used.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Entry<K, V>>> + '_ {
        let mut current = self.nodes[HEAD].next;
        std::iter::from_fn(move || {
            if current == TAIL {
                return None;
            }
            let node = &self.nodes[current];
            current = node.next;
            node.entry.as_ref()
        })
    }

    // == Length ==
    /// Returns the number of linked entries.
    pub fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn allocate(&mut self, entry: Arc<Entry<K, V>>) -> usize {
        let node = Node {
            entry: Some(entry),
            prev: DETACHED,
            next: DETACHED,
        };
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn detach(&mut self, slot: usize) {
        debug_assert!(slot != HEAD && slot != TAIL, "sentinels cannot be detached");
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
        if prev == DETACHED || next == DETACHED {
            return;
        }
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
        self.nodes[slot].prev = DETACHED;
        self.nodes[slot].next = DETACHED;
    }

    fn release(&mut self, slot: usize) -> Option<Arc<Entry<K, V>>> {
        self.detach(slot);
        let entry = self.nodes[slot].entry.take();
        if entry.is_some() {
            self.free.push(slot);
            self.len -= 1;
        }
        entry
    }

    /// Walks the ring in both directions and checks it against `len`.
    #[cfg(test)]
    pub(crate) fn debug_validate_invariants(&self) {
        let mut forward = 0;
        let mut current = HEAD;
        while self.nodes[current].next != TAIL {
            let next = self.nodes[current].next;
            assert_eq!(self.nodes[next].prev, current, "broken back link at {next}");
            let entry = self.nodes[next].entry.as_ref().expect("linked slot without entry");
            assert_eq!(entry.slot(), next, "entry slot out of sync");
            current = next;
            forward += 1;
            assert!(forward <= self.len, "list longer than len");
        }
        assert_eq!(self.nodes[TAIL].prev, current, "tail not closing the ring");
        assert_eq!(forward, self.len);
    }
}

impl<K, V> Default for RecencyList<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &'static str) -> Arc<Entry<&'static str, ()>> {
        Arc::new(Entry::new(key, (), 1, None))
    }

    fn keys(list: &RecencyList<&'static str, ()>) -> Vec<&'static str> {
        list.iter().map(|e| e.key).collect()
    }

    #[test]
    fn test_list_new() {
        let list: RecencyList<&str, ()> = RecencyList::new();
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
        list.debug_validate_invariants();
    }

    #[test]
    fn test_link_new_entries() {
        let mut list = RecencyList::new();
        let (a, b, c) = (entry("a"), entry("b"), entry("c"));

        list.link_after_head(&a);
        list.link_after_head(&b);
        list.link_after_head(&c);

        assert_eq!(list.len(), 3);
        assert_eq!(keys(&list), vec!["c", "b", "a"]);
        list.debug_validate_invariants();
    }

    #[test]
    fn test_relink_existing_entry() {
        let mut list = RecencyList::new();
        let (a, b, c) = (entry("a"), entry("b"), entry("c"));

        list.link_after_head(&a);
        list.link_after_head(&b);
        list.link_after_head(&c);

        // Touch a again - moves to front, keeps its slot
        let slot = a.slot();
        list.link_after_head(&a);

        assert_eq!(a.slot(), slot);
        assert_eq!(list.len(), 3);
        assert_eq!(keys(&list), vec!["a", "c", "b"]);
        list.debug_validate_invariants();
    }

    #[test]
    fn test_unlink_tail_order() {
        let mut list = RecencyList::new();
        let (a, b, c) = (entry("a"), entry("b"), entry("c"));

        list.link_after_head(&a);
        list.link_after_head(&b);
        list.link_after_head(&c);

        assert_eq!(list.unlink_tail().map(|e| e.key), Some("a"));
        assert_eq!(list.unlink_tail().map(|e| e.key), Some("b"));
        assert_eq!(a.slot(), DETACHED);
        assert_eq!(list.len(), 1);
        list.debug_validate_invariants();
    }

    #[test]
    fn test_unlink_tail_empty_never_returns_sentinel() {
        let mut list: RecencyList<&str, ()> = RecencyList::new();
        assert!(list.unlink_tail().is_none());
        list.debug_validate_invariants();
    }

    #[test]
    fn test_unlink_middle_and_detached() {
        let mut list = RecencyList::new();
        let (a, b, c) = (entry("a"), entry("b"), entry("c"));

        list.link_after_head(&a);
        list.link_after_head(&b);
        list.link_after_head(&c);

        list.unlink(&b);
        assert_eq!(keys(&list), vec!["c", "a"]);

        // Unlinking twice is a no-op
        list.unlink(&b);
        assert_eq!(list.len(), 2);
        list.debug_validate_invariants();
    }

    #[test]
    fn test_slots_are_reused() {
        let mut list = RecencyList::new();
        let (a, b) = (entry("a"), entry("b"));

        list.link_after_head(&a);
        let freed = a.slot();
        list.unlink(&a);

        list.link_after_head(&b);
        assert_eq!(b.slot(), freed);
        assert_eq!(keys(&list), vec!["b"]);
        list.debug_validate_invariants();
    }

    #[test]
    fn test_empty_after_unlinking_everything_closes_ring() {
        let mut list = RecencyList::new();
        let entries: Vec<_> = ["a", "b", "c", "d"].into_iter().map(entry).collect();
        for e in &entries {
            list.link_after_head(e);
        }
        for e in &entries {
            list.unlink(e);
        }

        assert!(list.is_empty());
        assert_eq!(list.nodes[HEAD].next, TAIL);
        assert_eq!(list.nodes[TAIL].prev, HEAD);
    }
}
