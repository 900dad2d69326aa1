//! Load Coordination Module
//!
//! Collapses concurrent cache-miss loads so that only one fetch per key is
//! outstanding at a time.
//!
//! # Components
//! - LoadGroup: in-flight records keyed by cache key, with blocking and
//!   fire-and-forget modes
//! - LoaderPool: bounded queue and fixed worker threads for fire-and-forget
//!   loads

mod group;
mod pool;

pub use group::{LoadGroup, LoadOutcome};
pub use pool::{DEFAULT_BACKGROUND_LOADERS, DEFAULT_BACKGROUND_QUEUE};
