//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache operations.
///
/// Validation failures are detected before any state is touched. A missing or
/// expired key is not an error; lookups report it as `None`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Item cost is zero
    #[error("item too small: cost must be at least 1, got {size}")]
    ItemTooSmall { size: u64 },

    /// Item cost exceeds the fixed cache capacity
    #[error("item too big: cost {size} exceeds cache capacity {capacity}")]
    ItemTooBig { size: u64, capacity: u64 },

    /// Expiry instant already elapsed at insertion time
    #[error("expiry in the past: the entry would expire {elapsed_ms}ms before insertion")]
    PastExpiry { elapsed_ms: u128 },

    /// Operation issued after the cache was closed
    #[error("cache is closed")]
    Closed,

    /// The mutation processor stopped without acknowledging an event
    #[error("internal error: {0}")]
    Internal(String),
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_condition() {
        let small = CacheError::ItemTooSmall { size: 0 };
        assert!(small.to_string().contains("item too small"));

        let big = CacheError::ItemTooBig {
            size: 6,
            capacity: 5,
        };
        let message = big.to_string();
        assert!(message.contains("item too big"));
        assert!(message.contains('6'));
        assert!(message.contains('5'));

        let past = CacheError::PastExpiry { elapsed_ms: 1000 };
        assert!(past.to_string().contains("expiry in the past"));
    }
}
