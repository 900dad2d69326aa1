//! Cache Module
//!
//! Provides an in-process cache with pluggable eviction, lazy expiration,
//! lifecycle hooks and deduplicated loads.

mod builder;
mod clock;
mod entry;
mod lru;
mod policy;
mod simple;
mod stats;
mod store;


// Re-export public types
pub use builder::{CacheBuilder, DeserializeFn, Loaded, LoaderFn, SerializeFn};
pub use clock::{Clock, FakeClock, SystemClock};
pub use entry::Entry;
pub use lru::LruIndex;
pub use policy::{EntryHook, EvictionIndex, EvictionPolicy, IndexHooks};
pub use simple::SimpleIndex;
pub use stats::{CacheStats, StatsSnapshot};
pub use store::Cache;
