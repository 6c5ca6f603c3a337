//! Cache configuration.

use std::time::Duration;

use tessera_core::{ConfigError, TesseraResult};

/// Configuration for the read-through cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL for entries and assets.
    pub entry_ttl: Duration,
    /// TTL for content types, which change far less often.
    pub content_type_ttl: Duration,
    /// Prefix of every persisted cache key.
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            entry_ttl: Duration::from_secs(30 * 60),
            content_type_ttl: Duration::from_secs(60 * 60),
            key_prefix: "tessera-cache".to_string(),
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    ///
    /// - `TESSERA_CACHE_ENTRY_TTL_MINS`
    /// - `TESSERA_CACHE_CONTENT_TYPE_TTL_MINS`
    /// - `TESSERA_CACHE_KEY_PREFIX`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let minutes = |var: &str, fallback: Duration| {
            std::env::var(var)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or(fallback)
        };
        Self {
            entry_ttl: minutes("TESSERA_CACHE_ENTRY_TTL_MINS", defaults.entry_ttl),
            content_type_ttl: minutes("TESSERA_CACHE_CONTENT_TYPE_TTL_MINS", defaults.content_type_ttl),
            key_prefix: std::env::var("TESSERA_CACHE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
        }
    }

    /// Set the entry/asset TTL.
    pub fn with_entry_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }

    /// Set the content type TTL.
    pub fn with_content_type_ttl(mut self, ttl: Duration) -> Self {
        self.content_type_ttl = ttl;
        self
    }

    /// Set the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn validate(&self) -> TesseraResult<()> {
        for (field, ttl) in [("entry_ttl", self.entry_ttl), ("content_type_ttl", self.content_type_ttl)] {
            if ttl.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: format!("{:?}", ttl),
                    reason: "must be positive".to_string(),
                }
                .into());
            }
        }
        if self.key_prefix.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "key_prefix".to_string(),
                value: String::new(),
                reason: "must not be empty".to_string(),
            }
            .into());
        }
        Ok(())
    }
}
