//! Simple Index Module
//!
//! Unordered eviction index backed by a single hash map. It keeps no recency
//! metadata; eviction removes expired entries first and otherwise takes
//! whatever the map yields.

use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tracing::trace;

use crate::cache::clock::Clock;
use crate::cache::policy::{EvictionIndex, EvictionPolicy, IndexHooks};
use crate::cache::Entry;
use crate::error::{CacheError, Result};

pub struct SimpleIndex<K, V> {
    map: HashMap<K, Entry<V>>,
    capacity: usize,
    clock: Arc<dyn Clock>,
    hooks: IndexHooks<K, V>,
}

impl<K, V> SimpleIndex<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty index. A capacity of zero means unbounded.
    pub fn new(capacity: usize, clock: Arc<dyn Clock>, hooks: IndexHooks<K, V>) -> Self {
        Self {
            map: HashMap::with_capacity(capacity),
            capacity,
            clock,
            hooks,
        }
    }

    /// Picks up to `count` victims: every expired key first, then live ones.
    fn victims(&self, count: usize) -> Vec<K> {
        let now = self.clock.now_ms();

        let mut victims: Vec<K> = self
            .map
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .take(count)
            .collect();

        // Fewer than `count` expired means all of them were taken above.
        if victims.len() < count {
            let missing = count - victims.len();
            victims.extend(
                self.map
                    .iter()
                    .filter(|(_, entry)| !entry.is_expired(now))
                    .map(|(key, _)| key.clone())
                    .take(missing),
            );
        }

        victims
    }
}

impl<K, V> EvictionIndex<K, V> for SimpleIndex<K, V>
where
    K: Eq + Hash + Clone + Send,
    V: Send,
{
    fn set(&mut self, key: K, value: V, expires_at: Option<u64>) -> &Entry<V> {
        if self.capacity > 0 && self.map.len() >= self.capacity && !self.map.contains_key(&key) {
            self.evict(1);
        }

        match self.map.entry(key) {
            MapEntry::Occupied(slot) => {
                let entry = slot.into_mut();
                entry.replace(value, expires_at);
                entry
            }
            MapEntry::Vacant(slot) => slot.insert(Entry::new(value, expires_at)),
        }
    }

    fn get(&mut self, key: &K) -> Result<&Entry<V>> {
        self.map.get(key).ok_or(CacheError::KeyNotFound)
    }

    fn peek(&self, key: &K) -> Option<&Entry<V>> {
        self.map.get(key)
    }

    fn remove(&mut self, key: &K) -> Result<V> {
        let (key, entry) = self
            .map
            .remove_entry(key)
            .ok_or(CacheError::KeyNotFound)?;
        self.hooks.fire_evicted(&key, &entry.value);
        Ok(entry.value)
    }

    fn evict(&mut self, count: usize) -> usize {
        let victims = self.victims(count);
        let removed = victims.len();
        for key in victims {
            let _ = self.remove(&key);
        }
        trace!(removed, "simple eviction");
        removed
    }

    fn keys(&self) -> Vec<K> {
        self.map.keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn purge(&mut self) {
        for (key, entry) in self.map.drain() {
            self.hooks.fire_purge(&key, &entry.value);
        }
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn policy(&self) -> EvictionPolicy {
        EvictionPolicy::Simple
    }
}
