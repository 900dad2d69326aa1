//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error returned by user-supplied hooks and loaders.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Shared error source. Every waiter on a load receives a clone of the same `Arc`.
pub type SharedError = Arc<dyn StdError + Send + Sync>;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Key is absent, expired, or a load for it is already underway
    #[error("Key not found")]
    KeyNotFound,

    /// Serialize hook rejected the value; the write was not applied
    #[error("Serialization failed: {0}")]
    SerializationFailed(#[source] SharedError),

    /// Deserialize hook rejected a stored value
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(#[source] SharedError),

    /// Loader returned an error
    #[error("Load failed: {0}")]
    LoadFailed(#[source] SharedError),

    /// Loader unwound before producing a result
    #[error("Load aborted before completion")]
    LoadAborted,
}

impl CacheError {
    pub(crate) fn serialization(err: BoxError) -> Self {
        CacheError::SerializationFailed(Arc::from(err))
    }

    pub(crate) fn deserialization(err: BoxError) -> Self {
        CacheError::DeserializationFailed(Arc::from(err))
    }

    pub(crate) fn load(err: BoxError) -> Self {
        CacheError::LoadFailed(Arc::from(err))
    }

    /// Returns true for a plain miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::KeyNotFound)
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
