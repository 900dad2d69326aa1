//! Cache Builder Module
//!
//! Assembles a [`Cache`] from a capacity, an eviction policy, an optional
//! default expiration, a clock and optional hooks.
//!
//! ```
//! use loadcache::cache::CacheBuilder;
//! use std::time::Duration;
//!
//! let cache = CacheBuilder::new(128)
//!     .lru()
//!     .expiration(Duration::from_secs(60))
//!     .loader(|key: &u64| Ok(key * 2))
//!     .build();
//!
//! assert_eq!(cache.get(&21).unwrap(), 42);
//! ```

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::clock::{duration_ms, Clock, SystemClock};
use crate::cache::lru::LruIndex;
use crate::cache::policy::{EntryHook, EvictionIndex, EvictionPolicy, IndexHooks};
use crate::cache::simple::SimpleIndex;
use crate::cache::store::{Cache, CacheHooks};
use crate::config::Config;
use crate::error::BoxError;
use crate::load::{LoadGroup, DEFAULT_BACKGROUND_LOADERS, DEFAULT_BACKGROUND_QUEUE};

/// Transforms a value before it is stored.
pub type SerializeFn<K, V> = Arc<dyn Fn(&K, V) -> Result<V, BoxError> + Send + Sync>;

/// Transforms a stored value before it is returned.
pub type DeserializeFn<K, V> = Arc<dyn Fn(&K, &V) -> Result<V, BoxError> + Send + Sync>;

/// Fetches a missing value.
pub type LoaderFn<K, V> = Arc<dyn Fn(&K) -> Result<Loaded<V>, BoxError> + Send + Sync>;

// == Loaded ==
/// A loader result with an optional expiration override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loaded<V> {
    pub value: V,
    /// Replaces the default expiration when set
    pub expiration: Option<Duration>,
}

impl<V> Loaded<V> {
    pub fn new(value: V) -> Self {
        Self {
            value,
            expiration: None,
        }
    }

    pub fn expiring(value: V, ttl: Duration) -> Self {
        Self {
            value,
            expiration: Some(ttl),
        }
    }
}

// == Cache Builder ==
pub struct CacheBuilder<K, V> {
    capacity: usize,
    policy: EvictionPolicy,
    expiration: Option<Duration>,
    clock: Arc<dyn Clock>,
    background_loaders: usize,
    added: Option<EntryHook<K, V>>,
    evicted: Option<EntryHook<K, V>>,
    purge_visitor: Option<EntryHook<K, V>>,
    serialize: Option<SerializeFn<K, V>>,
    deserialize: Option<DeserializeFn<K, V>>,
    loader: Option<LoaderFn<K, V>>,
}

impl<K, V> CacheBuilder<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Starts an LRU builder. A capacity of zero means unbounded.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            policy: EvictionPolicy::default(),
            expiration: None,
            clock: Arc::new(SystemClock),
            background_loaders: DEFAULT_BACKGROUND_LOADERS,
            added: None,
            evicted: None,
            purge_visitor: None,
            serialize: None,
            deserialize: None,
            loader: None,
        }
    }

    /// Applies capacity, default expiration, policy and background loader
    /// threads from `config`.
    pub fn from_config(config: &Config) -> Self {
        let builder = Self::new(config.capacity)
            .policy(config.policy)
            .background_loaders(config.loader_threads);
        match config.default_ttl {
            0 => builder,
            secs => builder.expiration(Duration::from_secs(secs)),
        }
    }

    pub fn policy(mut self, policy: EvictionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn lru(self) -> Self {
        self.policy(EvictionPolicy::Lru)
    }

    pub fn simple(self) -> Self {
        self.policy(EvictionPolicy::Simple)
    }

    /// Default time-to-live for writes without an explicit one.
    pub fn expiration(mut self, ttl: Duration) -> Self {
        self.expiration = Some(ttl);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Threads serving loads started by non-blocking reads (minimum 1).
    pub fn background_loaders(mut self, workers: usize) -> Self {
        self.background_loaders = workers.max(1);
        self
    }

    /// Called after every successful write, outside the cache lock.
    pub fn on_added<F>(mut self, hook: F) -> Self
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.added = Some(Arc::new(hook));
        self
    }

    /// Called under the cache lock on remove, lazy expiry and eviction.
    /// Must not call back into the cache.
    pub fn on_evicted<F>(mut self, hook: F) -> Self
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.evicted = Some(Arc::new(hook));
        self
    }

    /// Called under the cache lock for each entry during a purge.
    /// Must not call back into the cache.
    pub fn on_purge<F>(mut self, hook: F) -> Self
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.purge_visitor = Some(Arc::new(hook));
        self
    }

    pub fn serialize_with<F>(mut self, serialize: F) -> Self
    where
        F: Fn(&K, V) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        self.serialize = Some(Arc::new(serialize));
        self
    }

    pub fn deserialize_with<F>(mut self, deserialize: F) -> Self
    where
        F: Fn(&K, &V) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        self.deserialize = Some(Arc::new(deserialize));
        self
    }

    /// Loader whose values use the default expiration.
    pub fn loader<F>(self, loader: F) -> Self
    where
        F: Fn(&K) -> Result<V, BoxError> + Send + Sync + 'static,
    {
        self.loader_with_expiration(move |key: &K| loader(key).map(Loaded::new))
    }

    /// Loader that may override the expiration per value.
    pub fn loader_with_expiration<F>(mut self, loader: F) -> Self
    where
        F: Fn(&K) -> Result<Loaded<V>, BoxError> + Send + Sync + 'static,
    {
        self.loader = Some(Arc::new(loader));
        self
    }

    pub fn build(self) -> Cache<K, V> {
        let hooks = IndexHooks {
            evicted: self.evicted,
            purge_visitor: self.purge_visitor,
        };
        let index: Box<dyn EvictionIndex<K, V>> = match self.policy {
            EvictionPolicy::Lru => Box::new(LruIndex::new(self.capacity, hooks)),
            EvictionPolicy::Simple => Box::new(SimpleIndex::new(
                self.capacity,
                Arc::clone(&self.clock),
                hooks,
            )),
        };

        debug!(
            policy = %self.policy,
            capacity = self.capacity,
            expiration_ms = self.expiration.map(duration_ms),
            background_loaders = self.background_loaders,
            "cache built"
        );

        Cache::assemble(
            index,
            LoadGroup::with_background(self.background_loaders, DEFAULT_BACKGROUND_QUEUE),
            self.clock,
            self.expiration,
            CacheHooks {
                serialize: self.serialize,
                deserialize: self.deserialize,
                added: self.added,
                loader: self.loader,
            },
        )
    }
}
