//! LRU Index Module
//!
//! Recency-ordered eviction index: a hash map from key to a slot in an
//! arena-backed doubly linked list.
//!
//! - Front (head) = Most recently used
//! - Back (tail) = Least recently used

use std::collections::HashMap;
use std::hash::Hash;

use tracing::trace;

use crate::cache::policy::{EvictionIndex, EvictionPolicy, IndexHooks};
use crate::cache::Entry;
use crate::error::{CacheError, Result};

const NIL: usize = usize::MAX;

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    entry: Entry<V>,
    /// More recently used neighbour
    prev: usize,
    /// Less recently used neighbour
    next: usize,
}

// == LRU Index ==
/// Every key in `map` points at an occupied slot that is linked into the
/// list, and every linked slot is referenced by exactly one key.
pub struct LruIndex<K, V> {
    map: HashMap<K, usize>,
    slots: Vec<Option<Node<K, V>>>,
    /// Vacant slot indices available for reuse
    free: Vec<usize>,
    head: usize,
    tail: usize,
    capacity: usize,
    hooks: IndexHooks<K, V>,
}

impl<K, V> LruIndex<K, V>
where
    K: Eq + Hash + Clone,
{
    // == Constructor ==
    /// Creates an empty index. A capacity of zero means unbounded.
    pub fn new(capacity: usize, hooks: IndexHooks<K, V>) -> Self {
        Self {
            map: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            capacity,
            hooks,
        }
    }

    /// Least recently used key, if any.
    pub fn peek_oldest(&self) -> Option<&K> {
        if self.tail == NIL {
            return None;
        }
        Some(&self.node(self.tail).key)
    }

    fn node(&self, idx: usize) -> &Node<K, V> {
        match self.slots.get(idx) {
            Some(Some(node)) => node,
            _ => unreachable!("lru slot {idx} is vacant"),
        }
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node<K, V> {
        match self.slots.get_mut(idx) {
            Some(Some(node)) => node,
            _ => unreachable!("lru slot {idx} is vacant"),
        }
    }

    fn alloc(&mut self, node: Node<K, V>) -> usize {
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(node);
            idx
        } else {
            self.slots.push(Some(node));
            self.slots.len() - 1
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.node(idx);
            (node.prev, node.next)
        };

        if prev == NIL {
            self.head = next;
        } else {
            self.node_mut(prev).next = next;
        }

        if next == NIL {
            self.tail = prev;
        } else {
            self.node_mut(next).prev = prev;
        }

        let node = self.node_mut(idx);
        node.prev = NIL;
        node.next = NIL;
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let node = self.node_mut(idx);
            node.prev = NIL;
            node.next = old_head;
        }

        if old_head == NIL {
            self.tail = idx;
        } else {
            self.node_mut(old_head).prev = idx;
        }
        self.head = idx;
    }

    // == Touch ==
    /// Marks a slot as most recently used.
    fn move_to_front(&mut self, idx: usize) {
        if self.head == idx {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }

    /// Unlinks and frees a slot, drops its key, and fires the evicted hook.
    fn remove_slot(&mut self, idx: usize) -> V {
        self.unlink(idx);
        let node = match self.slots[idx].take() {
            Some(node) => node,
            None => unreachable!("lru slot {idx} is vacant"),
        };
        self.free.push(idx);
        self.map.remove(&node.key);

        self.hooks.fire_evicted(&node.key, &node.entry.value);
        node.entry.value
    }

    #[cfg(test)]
    fn assert_linked(&self) {
        let mut seen = 0;
        let mut prev = NIL;
        let mut idx = self.head;
        while idx != NIL {
            let node = self.node(idx);
            assert_eq!(node.prev, prev, "broken back-link at slot {idx}");
            assert_eq!(self.map.get(&node.key), Some(&idx), "list slot missing from map");
            prev = idx;
            idx = node.next;
            seen += 1;
        }
        assert_eq!(self.tail, prev);
        assert_eq!(seen, self.map.len(), "list and map disagree on size");
    }
}

impl<K, V> EvictionIndex<K, V> for LruIndex<K, V>
where
    K: Eq + Hash + Clone + Send,
    V: Send,
{
    fn set(&mut self, key: K, value: V, expires_at: Option<u64>) -> &Entry<V> {
        if let Some(&idx) = self.map.get(&key) {
            self.move_to_front(idx);
            let entry = &mut self.node_mut(idx).entry;
            entry.replace(value, expires_at);
            return entry;
        }

        if self.capacity > 0 && self.map.len() >= self.capacity {
            self.evict(1);
        }

        let idx = self.alloc(Node {
            key: key.clone(),
            entry: Entry::new(value, expires_at),
            prev: NIL,
            next: NIL,
        });
        self.map.insert(key, idx);
        self.push_front(idx);

        &self.node(idx).entry
    }

    fn get(&mut self, key: &K) -> Result<&Entry<V>> {
        let idx = *self.map.get(key).ok_or(CacheError::KeyNotFound)?;
        self.move_to_front(idx);
        Ok(&self.node(idx).entry)
    }

    fn peek(&self, key: &K) -> Option<&Entry<V>> {
        self.map.get(key).map(|&idx| &self.node(idx).entry)
    }

    fn remove(&mut self, key: &K) -> Result<V> {
        let idx = *self.map.get(key).ok_or(CacheError::KeyNotFound)?;
        Ok(self.remove_slot(idx))
    }

    fn evict(&mut self, count: usize) -> usize {
        let mut removed = 0;
        while removed < count && self.tail != NIL {
            self.remove_slot(self.tail);
            removed += 1;
        }
        trace!(removed, "lru eviction");
        removed
    }

    /// Keys from most to least recently used.
    fn keys(&self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.map.len());
        let mut idx = self.head;
        while idx != NIL {
            let node = self.node(idx);
            keys.push(node.key.clone());
            idx = node.next;
        }
        keys
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn purge(&mut self) {
        if self.hooks.purge_visitor.is_some() {
            for node in self.slots.iter().flatten() {
                self.hooks.fire_purge(&node.key, &node.entry.value);
            }
        }

        self.map.clear();
        self.slots.clear();
        self.free.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn policy(&self) -> EvictionPolicy {
        EvictionPolicy::Lru
    }
}
