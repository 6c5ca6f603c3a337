//! Facade configuration.

use std::time::Duration;

use tessera_core::{ConfigError, Locales, NavigationRules, TesseraResult};
use tessera_observer::ObserverConfig;
use tessera_storage::CacheConfig;

/// Default poll interval of subscriptions made through the facade.
pub const DEFAULT_SUBSCRIBE_INTERVAL_MS: u64 = 2_000;

/// Configuration of a [`ContentContext`](crate::ContentContext).
#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub cache: CacheConfig,
    pub observer: ObserverConfig,
    /// Poll interval requested by [`subscribe`](crate::ContentContext::subscribe).
    pub subscribe_interval: Duration,
    pub locales: Locales,
    pub navigation: NavigationRules,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            observer: ObserverConfig::default(),
            subscribe_interval: Duration::from_millis(DEFAULT_SUBSCRIBE_INTERVAL_MS),
            locales: Locales::default(),
            navigation: NavigationRules::default(),
        }
    }
}

impl ContextConfig {
    /// Create ContextConfig from environment variables.
    ///
    /// Cache and observer settings read their own variables. In addition:
    /// - `TESSERA_SUBSCRIBE_INTERVAL_MS` (default: 2000)
    /// - `TESSERA_DEFAULT_LOCALE` (default: en)
    pub fn from_env() -> Self {
        let subscribe_interval = Duration::from_millis(
            std::env::var("TESSERA_SUBSCRIBE_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SUBSCRIBE_INTERVAL_MS),
        );
        let locales = std::env::var("TESSERA_DEFAULT_LOCALE")
            .map(Locales::new)
            .unwrap_or_default();

        Self {
            cache: CacheConfig::from_env(),
            observer: ObserverConfig::from_env(),
            subscribe_interval,
            locales,
            navigation: NavigationRules::default(),
        }
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_observer(mut self, observer: ObserverConfig) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_subscribe_interval(mut self, interval: Duration) -> Self {
        self.subscribe_interval = interval;
        self
    }

    pub fn with_locales(mut self, locales: Locales) -> Self {
        self.locales = locales;
        self
    }

    pub fn with_navigation(mut self, navigation: NavigationRules) -> Self {
        self.navigation = navigation;
        self
    }

    pub fn validate(&self) -> TesseraResult<()> {
        self.cache.validate()?;
        self.observer.validate()?;
        if self.subscribe_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "subscribe_interval".to_string(),
                value: format!("{:?}", self.subscribe_interval),
                reason: "must be positive".to_string(),
            }
            .into());
        }
        if self.locales.default.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "locales.default".to_string(),
                value: String::new(),
                reason: "must not be empty".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ContextConfig::default();
        assert_eq!(config.subscribe_interval, Duration::from_secs(2));
        assert_eq!(config.locales.default, "en");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_nested_config_is_validated() {
        let config = ContextConfig::default()
            .with_observer(ObserverConfig::default().with_poll_interval(Duration::ZERO));
        assert!(config.validate().is_err());

        let config = ContextConfig::default().with_subscribe_interval(Duration::ZERO);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("subscribe_interval"));
    }
}
