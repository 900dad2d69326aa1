//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with expiration support.

// == Cache Entry ==
/// A stored value and its optional expiration instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<V> {
    /// The stored value
    pub value: V,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl<V> Entry<V> {
    // == Constructor ==
    pub fn new(value: V, expires_at: Option<u64>) -> Self {
        Self { value, expires_at }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now_ms`.
    ///
    /// Boundary condition: an entry is expired once the current time is
    /// greater than or equal to its expiration time.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        match self.expires_at {
            Some(expires) => now_ms >= expires,
            None => false,
        }
    }

    /// Replaces value and expiration in place.
    pub(crate) fn replace(&mut self, value: V, expires_at: Option<u64>) {
        self.value = value;
        self.expires_at = expires_at;
    }
}
