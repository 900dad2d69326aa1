//! Configuration Module
//!
//! Loads cache and demo settings from environment variables.

use std::env;

use crate::cache::EvictionPolicy;
use crate::load::DEFAULT_BACKGROUND_LOADERS;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Maximum number of entries the cache can hold (0 = unbounded)
    pub capacity: usize,
    /// Default TTL in seconds for entries without explicit TTL (0 = none)
    pub default_ttl: u64,
    /// Eviction index to build
    pub policy: EvictionPolicy,
    /// Threads serving loads started by non-blocking reads
    pub loader_threads: usize,
    /// Concurrent readers started by the demo binary
    pub demo_readers: usize,
    /// Simulated upstream latency of the demo loader, in milliseconds
    pub demo_loader_latency_ms: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_CAPACITY` - Maximum cache entries (default: 1000)
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `CACHE_POLICY` - `lru` or `simple` (default: lru)
    /// - `CACHE_LOADER_THREADS` - Background loader threads (default: 4)
    /// - `DEMO_READERS` - Concurrent demo readers (default: 8)
    /// - `DEMO_LOADER_LATENCY_MS` - Demo loader latency (default: 200)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            capacity: parse_var("CACHE_CAPACITY").unwrap_or(defaults.capacity),
            default_ttl: parse_var("CACHE_DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            policy: parse_var("CACHE_POLICY").unwrap_or(defaults.policy),
            loader_threads: parse_var("CACHE_LOADER_THREADS").unwrap_or(defaults.loader_threads),
            demo_readers: parse_var("DEMO_READERS").unwrap_or(defaults.demo_readers),
            demo_loader_latency_ms: parse_var("DEMO_LOADER_LATENCY_MS")
                .unwrap_or(defaults.demo_loader_latency_ms),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: 1000,
            default_ttl: 300,
            policy: EvictionPolicy::Lru,
            loader_threads: DEFAULT_BACKGROUND_LOADERS,
            demo_readers: 8,
            demo_loader_latency_ms: 200,
        }
    }
}
