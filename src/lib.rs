//! loadcache - An in-process key-value cache
//!
//! Provides LRU and unordered eviction, per-entry expiration, lifecycle hooks
//! and deduplicated loading of missing keys.

pub mod cache;
pub mod config;
pub mod error;
pub mod load;

pub use cache::{Cache, CacheBuilder, EvictionPolicy, Loaded};
pub use config::Config;
pub use error::{CacheError, Result};
