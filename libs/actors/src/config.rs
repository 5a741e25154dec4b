//! Registry Configuration
//!
//! Typed, validated form of [`runtime_config::RegistrySettings`].

use crate::error::ConfigError;
use crate::mailbox::BackpressurePolicy;
use runtime_config::{defaults, BackpressureSetting, RegistrySettings};
use std::time::Duration;

/// Tunables for one actor registry
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    pub mailbox_capacity: usize,
    pub backpressure: BackpressurePolicy,
    /// Messages per drain turn before yielding the execution slot
    pub batch_size: usize,
    /// Minimum spacing between saves of one dirty actor
    pub persist_interval: Duration,
    pub idle_timeout: Duration,
    pub max_actors: Option<usize>,
    pub maintenance_interval: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        use defaults::registry::*;
        Self {
            mailbox_capacity: MAILBOX_CAPACITY,
            backpressure: BackpressurePolicy::default(),
            batch_size: BATCH_SIZE,
            persist_interval: Duration::from_millis(PERSIST_INTERVAL_MS),
            idle_timeout: Duration::from_millis(IDLE_TIMEOUT_MS),
            max_actors: None,
            maintenance_interval: Duration::from_millis(MAINTENANCE_INTERVAL_MS),
            shutdown_timeout: Duration::from_millis(SHUTDOWN_TIMEOUT_MS),
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mailbox_capacity == 0 {
            return Err(ConfigError::new("must be at least 1", "mailbox_capacity"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::new("must be at least 1", "batch_size"));
        }
        if self.maintenance_interval.is_zero() {
            return Err(ConfigError::new("must be positive", "maintenance_interval"));
        }
        if self.max_actors == Some(0) {
            return Err(ConfigError::new("must be at least 1 when set", "max_actors"));
        }
        Ok(())
    }
}

impl TryFrom<&RegistrySettings> for RegistryConfig {
    type Error = ConfigError;

    fn try_from(settings: &RegistrySettings) -> Result<Self, Self::Error> {
        let backpressure = match settings.backpressure {
            BackpressureSetting::DropNew => BackpressurePolicy::DropNew,
            BackpressureSetting::DropOldest => BackpressurePolicy::DropOldest,
            BackpressureSetting::BlockWithTimeout => BackpressurePolicy::BlockWithTimeout {
                timeout: Duration::from_millis(settings.block_timeout_ms),
            },
            BackpressureSetting::DynamicGrow => BackpressurePolicy::DynamicGrow,
        };

        let config = Self {
            mailbox_capacity: settings.mailbox_capacity,
            backpressure,
            batch_size: settings.batch_size,
            persist_interval: Duration::from_millis(settings.persist_interval_ms),
            idle_timeout: Duration::from_millis(settings.idle_timeout_ms),
            max_actors: settings.max_actors,
            maintenance_interval: Duration::from_millis(settings.maintenance_interval_ms),
            shutdown_timeout: Duration::from_millis(settings.shutdown_timeout_ms),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_settings_default() {
        let from_settings = RegistryConfig::try_from(&RegistrySettings::default()).unwrap();
        assert_eq!(from_settings, RegistryConfig::default());
    }

    #[test]
    fn test_block_timeout_conversion() {
        let settings = RegistrySettings {
            backpressure: BackpressureSetting::BlockWithTimeout,
            block_timeout_ms: 750,
            ..RegistrySettings::default()
        };
        let config = RegistryConfig::try_from(&settings).unwrap();
        assert_eq!(
            config.backpressure,
            BackpressurePolicy::BlockWithTimeout {
                timeout: Duration::from_millis(750)
            }
        );
    }

    #[test]
    fn test_invalid_batch_size() {
        let settings = RegistrySettings {
            batch_size: 0,
            ..RegistrySettings::default()
        };
        let err = RegistryConfig::try_from(&settings).unwrap_err();
        assert_eq!(err.field, "batch_size");
    }
}
