//! Cache Module
//!
//! In-memory LRU cache with per-entry cost accounting and optional expiry.
//!
//! - `entry`: the unit of storage
//! - `lru`: the recency list, owned by the mutation processor
//! - `lock`: the reader/writer guard over the index and size
//! - `event`: the event protocol and its single consumer
//! - `store`: the public cache handle

mod entry;
pub(crate) mod event;
pub(crate) mod lock;
mod lru;
pub(crate) mod stats;
mod store;


// Re-export public types
pub use stats::CacheStats;
pub use store::LruCache;
