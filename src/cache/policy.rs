//! Eviction Policy Module
//!
//! The contract every eviction index implements, and the hooks it fires.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::cache::Entry;
use crate::error::Result;

/// Callback receiving a key and its stored value.
pub type EntryHook<K, V> = Arc<dyn Fn(&K, &V) + Send + Sync>;

/// Hooks an index fires while the cache lock is held.
///
/// These must not call back into the same cache.
pub struct IndexHooks<K, V> {
    /// Fired on explicit remove, lazy expiry and capacity eviction
    pub evicted: Option<EntryHook<K, V>>,
    /// Fired once per entry during a purge
    pub purge_visitor: Option<EntryHook<K, V>>,
}

impl<K, V> IndexHooks<K, V> {
    pub fn none() -> Self {
        Self {
            evicted: None,
            purge_visitor: None,
        }
    }

    pub(crate) fn fire_evicted(&self, key: &K, value: &V) {
        if let Some(hook) = &self.evicted {
            hook(key, value);
        }
    }

    pub(crate) fn fire_purge(&self, key: &K, value: &V) {
        if let Some(hook) = &self.purge_visitor {
            hook(key, value);
        }
    }
}

impl<K, V> Clone for IndexHooks<K, V> {
    fn clone(&self) -> Self {
        Self {
            evicted: self.evicted.clone(),
            purge_visitor: self.purge_visitor.clone(),
        }
    }
}

impl<K, V> Default for IndexHooks<K, V> {
    fn default() -> Self {
        Self::none()
    }
}

// == Eviction Policy ==
/// Selects the eviction index a cache is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Strict recency order; evicts the least recently used entry.
    #[default]
    Lru,
    /// No ordering; evicts expired entries first, then arbitrary ones.
    Simple,
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionPolicy::Lru => f.write_str("lru"),
            EvictionPolicy::Simple => f.write_str("simple"),
        }
    }
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionPolicy::Lru),
            "simple" => Ok(EvictionPolicy::Simple),
            other => Err(format!("unknown eviction policy: {other}")),
        }
    }
}

// == Eviction Index ==
/// Key to entry mapping that also decides eviction order.
///
/// A `capacity` of zero means unbounded. Implementations do not count hits
/// or misses and do not check expiration on `get`; the cache does both.
pub trait EvictionIndex<K, V>: Send {
    /// Inserts or updates. Inserting at capacity evicts one entry first.
    fn set(&mut self, key: K, value: V, expires_at: Option<u64>) -> &Entry<V>;

    /// Looks up an entry, marking it as used.
    fn get(&mut self, key: &K) -> Result<&Entry<V>>;

    /// Looks up an entry without affecting eviction order.
    fn peek(&self, key: &K) -> Option<&Entry<V>>;

    /// Deletes an entry and fires the evicted hook.
    fn remove(&mut self, key: &K) -> Result<V>;

    /// Removes up to `count` entries in policy order. Returns how many went.
    fn evict(&mut self, count: usize) -> usize;

    fn keys(&self) -> Vec<K>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visits every entry with the purge hook, then empties the index.
    fn purge(&mut self);

    fn capacity(&self) -> usize;

    fn policy(&self) -> EvictionPolicy;
}
