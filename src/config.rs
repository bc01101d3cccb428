//! Configuration Module
//!
//! Construction-time settings for the cache, loadable from environment variables.

use std::env;
use std::time::Duration;

/// Cache configuration parameters.
///
/// Every option is independent. Values fixed here hold for the lifetime of
/// the cache they build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Total permitted sum of live entry costs
    pub capacity: u64,
    /// Depth of the touch buffer; 0 makes every `get` fully synchronized
    pub touch_buffer: usize,
    /// Period of the background expiry sweep; zero disables it
    pub purge_interval: Duration,
    /// Attempt an expiry sweep before evicting live entries when full
    pub purge_expired_when_full: bool,
}

impl CacheConfig {
    /// Creates a config with the given capacity and defaults for the rest.
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn with_touch_buffer(mut self, touch_buffer: usize) -> Self {
        self.touch_buffer = touch_buffer;
        self
    }

    pub fn with_purge_interval(mut self, purge_interval: Duration) -> Self {
        self.purge_interval = purge_interval;
        self
    }

    pub fn with_purge_expired_when_full(mut self, enabled: bool) -> Self {
        self.purge_expired_when_full = enabled;
        self
    }

    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_CAPACITY` - Total cost capacity (default: 1000)
    /// - `CACHE_TOUCH_BUFFER` - Touch buffer depth (default: 0)
    /// - `CACHE_PURGE_INTERVAL_MS` - Sweep period in milliseconds (default: 0, disabled)
    /// - `CACHE_PURGE_WHEN_FULL` - `true`/`false` (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            capacity: env::var("CACHE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.capacity),
            touch_buffer: env::var("CACHE_TOUCH_BUFFER")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.touch_buffer),
            purge_interval: env::var("CACHE_PURGE_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.purge_interval),
            purge_expired_when_full: env::var("CACHE_PURGE_WHEN_FULL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.purge_expired_when_full),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            touch_buffer: 0,
            purge_interval: Duration::ZERO,
            purge_expired_when_full: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.capacity, 1000);
        assert_eq!(config.touch_buffer, 0);
        assert_eq!(config.purge_interval, Duration::ZERO);
        assert!(!config.purge_expired_when_full);
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::new(10)
            .with_touch_buffer(3)
            .with_purge_interval(Duration::from_millis(50))
            .with_purge_expired_when_full(true);

        assert_eq!(config.capacity, 10);
        assert_eq!(config.touch_buffer, 3);
        assert_eq!(config.purge_interval, Duration::from_millis(50));
        assert!(config.purge_expired_when_full);
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("CACHE_CAPACITY");
        env::remove_var("CACHE_TOUCH_BUFFER");
        env::remove_var("CACHE_PURGE_INTERVAL_MS");
        env::remove_var("CACHE_PURGE_WHEN_FULL");

        let config = CacheConfig::from_env();
        assert_eq!(config, CacheConfig::default());
    }
}
