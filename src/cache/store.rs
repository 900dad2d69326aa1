//! Cache Store Module
//!
//! Main cache engine combining an eviction index, lazy expiration, hooks and
//! the load group behind a single lock.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::cache::builder::{DeserializeFn, LoaderFn, SerializeFn};
use crate::cache::clock::{deadline, Clock};
use crate::cache::policy::{EntryHook, EvictionIndex, EvictionPolicy};
use crate::cache::stats::{CacheStats, StatsSnapshot};
use crate::error::{CacheError, Result};
use crate::load::LoadGroup;

/// Hooks the engine applies outside the index.
pub(crate) struct CacheHooks<K, V> {
    pub serialize: Option<SerializeFn<K, V>>,
    pub deserialize: Option<DeserializeFn<K, V>>,
    pub added: Option<EntryHook<K, V>>,
    pub loader: Option<LoaderFn<K, V>>,
}

pub(crate) struct CacheCore<K, V> {
    index: Mutex<Box<dyn EvictionIndex<K, V>>>,
    loads: LoadGroup<K, V>,
    stats: CacheStats,
    clock: Arc<dyn Clock>,
    default_ttl: Option<Duration>,
    hooks: CacheHooks<K, V>,
}

// == Cache ==
/// Thread-safe cache handle. Clones share the same storage.
///
/// Build one with [`CacheBuilder`](crate::cache::CacheBuilder).
pub struct Cache<K, V> {
    core: Arc<CacheCore<K, V>>,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<K, V> CacheCore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Serializes, stores, then fires the added hook once the lock is released.
    fn write(&self, key: K, value: V, ttl: Option<Duration>) -> Result<()> {
        let value = match &self.hooks.serialize {
            Some(serialize) => serialize(&key, value).map_err(CacheError::serialization)?,
            None => value,
        };

        let expires_at = ttl
            .or(self.default_ttl)
            .map(|ttl| deadline(self.clock.now_ms(), ttl));

        let added = self
            .hooks
            .added
            .as_ref()
            .map(|hook| (Arc::clone(hook), key.clone(), value.clone()));

        self.index.lock().set(key, value, expires_at);

        if let Some((hook, key, value)) = added {
            hook(&key, &value);
        }
        Ok(())
    }

    /// Index lookup with lazy expiry. `counted` lookups feed the hit/miss stats.
    fn lookup(&self, key: &K, counted: bool) -> Result<V> {
        let now = self.clock.now_ms();
        let value = {
            let mut guard = self.index.lock();
            let index = &mut **guard;

            let entry = match index.get(key) {
                Ok(entry) => entry,
                Err(err) => {
                    if counted {
                        self.stats.record_miss();
                    }
                    return Err(err);
                }
            };

            if entry.is_expired(now) {
                let _ = index.remove(key);
                trace!("expired entry removed on read");
                if counted {
                    self.stats.record_miss();
                }
                return Err(CacheError::KeyNotFound);
            }

            if counted {
                self.stats.record_hit();
            }
            entry.value.clone()
        };

        match &self.hooks.deserialize {
            Some(deserialize) => deserialize(key, &value).map_err(CacheError::deserialization),
            None => Ok(value),
        }
    }

    /// Runs the loader through the load group and writes the result back.
    fn load(self: &Arc<Self>, key: &K, wait: bool) -> Result<V> {
        let Some(loader) = self.hooks.loader.clone() else {
            return Err(CacheError::KeyNotFound);
        };

        let core = Arc::clone(self);
        let fetch = move |key: &K| -> Result<V> {
            let loaded = loader(key).map_err(CacheError::load)?;
            core.write(key.clone(), loaded.value.clone(), loaded.expiration)?;
            Ok(loaded.value)
        };

        self.loads
            .load(key.clone(), |key| self.lookup(key, false).ok(), fetch, wait)
            .map(|outcome| outcome.value)
    }
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn assemble(
        index: Box<dyn EvictionIndex<K, V>>,
        loads: LoadGroup<K, V>,
        clock: Arc<dyn Clock>,
        default_ttl: Option<Duration>,
        hooks: CacheHooks<K, V>,
    ) -> Self {
        Self {
            core: Arc::new(CacheCore {
                index: Mutex::new(index),
                loads,
                stats: CacheStats::new(),
                clock,
                default_ttl,
                hooks,
            }),
        }
    }

    // == Set ==
    /// Stores a value using the default expiration, if one is configured.
    ///
    /// Overwriting an existing key replaces its value and expiration. If the
    /// cache is at capacity, one entry is evicted first.
    pub fn set(&self, key: K, value: V) -> Result<()> {
        self.core.write(key, value, None)
    }

    /// Stores a value that expires `ttl` from now.
    pub fn set_with_expire(&self, key: K, value: V, ttl: Duration) -> Result<()> {
        self.core.write(key, value, Some(ttl))
    }

    // == Get ==
    /// Returns the cached value, loading it on a miss when a loader is set.
    ///
    /// Concurrent misses for the same key share a single loader call.
    pub fn get(&self, key: &K) -> Result<V> {
        match self.core.lookup(key, true) {
            Err(CacheError::KeyNotFound) => self.core.load(key, true),
            other => other,
        }
    }

    /// Returns the cached value without ever blocking on a load.
    ///
    /// On a miss with a loader configured, a background load is queued (or
    /// left running if one is already underway) and `KeyNotFound` is
    /// returned; later reads see the loaded value. Background loads run on a
    /// fixed number of threads, see
    /// [`CacheBuilder::background_loaders`](crate::cache::CacheBuilder::background_loaders).
    pub fn get_if_present(&self, key: &K) -> Result<V> {
        match self.core.lookup(key, true) {
            Err(CacheError::KeyNotFound) => self.core.load(key, false),
            other => other,
        }
    }

    /// Best-effort view of every live entry.
    ///
    /// Keys are snapshotted under the lock and then read one by one, so
    /// entries that expire or get evicted in between are left out.
    pub fn get_all(&self) -> HashMap<K, V> {
        let snapshot = self.core.index.lock().keys();
        snapshot
            .into_iter()
            .filter_map(|key| self.get_if_present(&key).ok().map(|value| (key, value)))
            .collect()
    }

    /// Live keys, with the same consistency as [`get_all`](Self::get_all).
    pub fn keys(&self) -> Vec<K> {
        let snapshot = self.core.index.lock().keys();
        snapshot
            .into_iter()
            .filter(|key| self.get_if_present(key).is_ok())
            .collect()
    }

    /// True if a live entry exists. Does not touch recency or statistics.
    pub fn contains(&self, key: &K) -> bool {
        let now = self.core.clock.now_ms();
        self.core
            .index
            .lock()
            .peek(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    // == Remove ==
    pub fn remove(&self, key: &K) -> Result<()> {
        self.core.index.lock().remove(key).map(|_| ())
    }

    // == Purge ==
    /// Visits every entry with the purge hook, then empties the cache.
    pub fn purge(&self) {
        let mut index = self.core.index.lock();
        let purged = index.len();
        index.purge();
        debug!(purged, "cache purged");
    }

    // == Length ==
    /// Stored entries, including expired ones not yet discovered.
    pub fn len(&self) -> usize {
        self.core.index.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.core.index.lock().capacity()
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.core.index.lock().policy()
    }

    // == Loads ==
    /// Keys with a load currently running or queued.
    pub fn loads_in_flight(&self) -> usize {
        self.core.loads.in_flight()
    }

    /// Callers blocked in [`get`](Self::get) on the running load for `key`.
    pub fn load_waiters(&self, key: &K) -> usize {
        self.core.loads.blocked(key)
    }

    pub fn background_loaders(&self) -> usize {
        self.core.loads.background_loaders()
    }

    // == Stats ==
    pub fn stats(&self) -> StatsSnapshot {
        self.core.stats.snapshot()
    }

    pub fn hit_count(&self) -> u64 {
        self.core.stats.hit_count()
    }

    pub fn miss_count(&self) -> u64 {
        self.core.stats.miss_count()
    }

    pub fn lookup_count(&self) -> u64 {
        self.core.stats.lookup_count()
    }

    pub fn hit_rate(&self) -> f64 {
        self.core.stats.hit_rate()
    }
}

impl<K, V> fmt::Debug for Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("policy", &self.policy())
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("in_flight", &self.core.loads.in_flight())
            .field("stats", &self.stats())
            .finish()
    }
}
