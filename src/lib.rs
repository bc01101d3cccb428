//! Recency Cache - A capacity-bounded in-memory LRU cache
//!
//! Entries carry a caller-defined cost and an optional expiry. Recency order
//! is maintained by a single mutation processor fed through an event queue,
//! while a reader/writer lock guards the index and size accounting.
//!
//! ```no_run
//! use recency_cache::{CacheConfig, LruCache};
//!
//! # async fn demo() -> recency_cache::Result<()> {
//! let cache = LruCache::new(CacheConfig::new(10).with_touch_buffer(16));
//! cache.set_with_size("user:1", "Alice".to_string(), 3).await?;
//! assert_eq!(cache.get("user:1").await.as_deref(), Some("Alice"));
//! cache.close().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
mod tasks;

pub use cache::{CacheStats, LruCache};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
