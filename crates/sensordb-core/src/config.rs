//! Cache configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of cached accounts.
pub const DEFAULT_USER_CACHE_SIZE: usize = 1000;

/// Default number of cached devices.
pub const DEFAULT_DEVICE_CACHE_SIZE: usize = 10_000;

/// Default number of cached streams.
pub const DEFAULT_STREAM_CACHE_SIZE: usize = 10_000;

/// Default entry lifetime in milliseconds.
pub const DEFAULT_CACHE_TTL_MS: u64 = 60_000;

/// Sizes and lifetime of the entity caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub user_cache_size: usize,
    pub device_cache_size: usize,
    pub stream_cache_size: usize,
    /// Entry lifetime in milliseconds.
    pub ttl_ms: u64,
}

impl CacheConfig {
    pub fn new() -> Self {
        Self {
            user_cache_size: DEFAULT_USER_CACHE_SIZE,
            device_cache_size: DEFAULT_DEVICE_CACHE_SIZE,
            stream_cache_size: DEFAULT_STREAM_CACHE_SIZE,
            ttl_ms: DEFAULT_CACHE_TTL_MS,
        }
    }

    pub fn with_user_cache_size(mut self, size: usize) -> Self {
        self.user_cache_size = size;
        self
    }

    pub fn with_device_cache_size(mut self, size: usize) -> Self {
        self.device_cache_size = size;
        self
    }

    pub fn with_stream_cache_size(mut self, size: usize) -> Self {
        self.stream_cache_size = size;
        self
    }

    /// Set the entry lifetime. A non-zero lifetime shorter than a
    /// millisecond rounds up to one.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        let ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self.ttl_ms = if ms == 0 && !ttl.is_zero() { 1 } else { ms };
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Every cache must hold at least one entry.
    pub fn validate(&self) -> Result<()> {
        for (name, size) in [
            ("user_cache_size", self.user_cache_size),
            ("device_cache_size", self.device_cache_size),
            ("stream_cache_size", self.stream_cache_size),
        ] {
            if size < 1 {
                return Err(Error::InvalidConfig(format!("{} must be at least 1", name)));
            }
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.user_cache_size, 1000);
        assert_eq!(config.device_cache_size, 10_000);
        assert_eq!(config.stream_cache_size, 10_000);
        assert_eq!(config.ttl(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_size_rejected() {
        let config = CacheConfig::new().with_device_cache_size(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("device_cache_size"));
    }

    #[test]
    fn test_sub_second_ttl_is_kept() {
        let config = CacheConfig::new().with_ttl(Duration::from_millis(500));
        assert_eq!(config.ttl(), Duration::from_millis(500));

        let config = CacheConfig::new().with_ttl(Duration::from_micros(10));
        assert_eq!(config.ttl(), Duration::from_millis(1));

        let config = CacheConfig::new().with_ttl(Duration::ZERO);
        assert_eq!(config.ttl(), Duration::ZERO);
    }

    #[test]
    fn test_partial_json() {
        let config: CacheConfig = serde_json::from_str(r#"{"user_cache_size": 5}"#).unwrap();
        assert_eq!(config.user_cache_size, 5);
        assert_eq!(config.stream_cache_size, DEFAULT_STREAM_CACHE_SIZE);
    }
}
