//! Observer configuration.

use std::time::Duration;

use tessera_core::{ConfigError, TesseraResult};

/// Default poll interval in milliseconds (12 polls a minute).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_CLEANUP_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_CLEANUP_THRESHOLD_MS: u64 = 50_000;
pub const DEFAULT_TAKEOVER_GRACE_MS: u64 = 1_000;

/// Configuration for the change observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverConfig {
    /// How often watched ids are re-fetched. Also the window in which the
    /// shared last-run stamp counts as "some context is polling".
    pub poll_interval: Duration,

    /// Minimum time between two garbage collection sweeps.
    pub cleanup_interval: Duration,

    /// Instances whose last ping is older than this are considered dead.
    pub cleanup_threshold: Duration,

    /// Extra wait before re-checking whether another context still polls.
    pub takeover_grace: Duration,

    /// Prefix of every persisted observer key.
    pub key_prefix: String,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            cleanup_interval: Duration::from_millis(DEFAULT_CLEANUP_INTERVAL_MS),
            cleanup_threshold: Duration::from_millis(DEFAULT_CLEANUP_THRESHOLD_MS),
            takeover_grace: Duration::from_millis(DEFAULT_TAKEOVER_GRACE_MS),
            key_prefix: "tessera-observe".to_string(),
        }
    }
}

impl ObserverConfig {
    /// Create ObserverConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `TESSERA_OBSERVER_POLL_INTERVAL_MS` (default: 5000)
    /// - `TESSERA_OBSERVER_CLEANUP_INTERVAL_MS` (default: 30000)
    /// - `TESSERA_OBSERVER_CLEANUP_THRESHOLD_MS` (default: 50000)
    /// - `TESSERA_OBSERVER_TAKEOVER_GRACE_MS` (default: 1000)
    /// - `TESSERA_OBSERVER_KEY_PREFIX` (default: tessera-observe)
    pub fn from_env() -> Self {
        let millis = |var: &str, default: u64| {
            Duration::from_millis(
                std::env::var(var)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(default),
            )
        };

        Self {
            poll_interval: millis("TESSERA_OBSERVER_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS),
            cleanup_interval: millis("TESSERA_OBSERVER_CLEANUP_INTERVAL_MS", DEFAULT_CLEANUP_INTERVAL_MS),
            cleanup_threshold: millis("TESSERA_OBSERVER_CLEANUP_THRESHOLD_MS", DEFAULT_CLEANUP_THRESHOLD_MS),
            takeover_grace: millis("TESSERA_OBSERVER_TAKEOVER_GRACE_MS", DEFAULT_TAKEOVER_GRACE_MS),
            key_prefix: std::env::var("TESSERA_OBSERVER_KEY_PREFIX")
                .unwrap_or_else(|_| "tessera-observe".to_string()),
        }
    }

    /// Create a configuration for development/testing with short intervals.
    pub fn development() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            cleanup_interval: Duration::from_secs(3),
            cleanup_threshold: Duration::from_secs(5),
            takeover_grace: Duration::from_millis(100),
            ..Self::default()
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn with_cleanup_threshold(mut self, threshold: Duration) -> Self {
        self.cleanup_threshold = threshold;
        self
    }

    pub fn with_takeover_grace(mut self, grace: Duration) -> Self {
        self.takeover_grace = grace;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn validate(&self) -> TesseraResult<()> {
        let invalid = |field: &str, value: String, reason: &str| -> TesseraResult<()> {
            Err(ConfigError::InvalidValue {
                field: field.to_string(),
                value,
                reason: reason.to_string(),
            }
            .into())
        };

        if self.poll_interval.is_zero() {
            return invalid("poll_interval", format!("{:?}", self.poll_interval), "must be positive");
        }
        if self.cleanup_interval.is_zero() {
            return invalid("cleanup_interval", format!("{:?}", self.cleanup_interval), "must be positive");
        }
        if self.cleanup_threshold <= self.poll_interval {
            return invalid(
                "cleanup_threshold",
                format!("{:?}", self.cleanup_threshold),
                "must be larger than poll_interval",
            );
        }
        if self.key_prefix.is_empty() {
            return invalid("key_prefix", String::new(), "must not be empty");
        }
        Ok(())
    }
}
