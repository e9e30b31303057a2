use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("grace window must be greater than zero")]
    ZeroGraceWindow,
    #[error("pull concurrency must be at least 1")]
    ZeroPullConcurrency,
    #[error("stability interval must be greater than zero")]
    ZeroStabilityInterval,
    #[error("debounce interval must be greater than zero")]
    ZeroDebounce,
}

/// Tunables of the sync engine, read from the `[sync]` table of the node config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How long a path stays suppressed after we wrote it (inbound) or published it (outbound)
    #[serde(with = "humantime_serde")]
    pub grace_window: Duration,
    /// Minimum spacing between two snapshot publishes
    #[serde(with = "humantime_serde")]
    pub debounce: Duration,
    /// Files fetched at once during one reconciliation pass
    pub pull_concurrency: usize,
    /// Apply Write and Remove events pushed by members of the peer set
    pub accept_push: bool,
    pub quiescence: QuiescenceConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            grace_window: Duration::from_secs(1),
            debounce: Duration::from_secs(3),
            pull_concurrency: 1,
            accept_push: true,
            quiescence: QuiescenceConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grace_window.is_zero() {
            return Err(ConfigError::ZeroGraceWindow);
        }
        if self.debounce.is_zero() {
            return Err(ConfigError::ZeroDebounce);
        }
        if self.pull_concurrency == 0 {
            return Err(ConfigError::ZeroPullConcurrency);
        }
        if self.quiescence.stability_interval.is_zero() {
            return Err(ConfigError::ZeroStabilityInterval);
        }
        Ok(())
    }
}

/// When a locally written file counts as finished
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuiescenceConfig {
    /// Initial wait after a change is observed
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,
    /// Files above this size are polled until their size and mtime stop changing
    pub large_file_threshold: u64,
    #[serde(with = "humantime_serde")]
    pub stability_interval: Duration,
    /// Give up polling and publish anyway after this long
    #[serde(with = "humantime_serde")]
    pub max_quiescence: Duration,
}

impl Default for QuiescenceConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(30),
            large_file_threshold: 20 * 1024,
            stability_interval: Duration::from_secs(1),
            max_quiescence: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = SyncConfig::default();
        assert_eq!(config.grace_window, Duration::from_secs(1));
        assert_eq!(config.debounce, Duration::from_secs(3));
        assert_eq!(config.pull_concurrency, 1);
        assert!(config.accept_push);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_rejects_zero_values() {
        let config = SyncConfig {
            grace_window: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroGraceWindow));

        let config = SyncConfig {
            pull_concurrency: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroPullConcurrency));

        let config = SyncConfig {
            debounce: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroDebounce));

        let config = SyncConfig {
            quiescence: QuiescenceConfig {
                stability_interval: Duration::ZERO,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroStabilityInterval));
    }

    #[test]
    fn test_quiescence_table_from_toml() {
        let config: SyncConfig =
            toml::from_str("[quiescence]\nmax_quiescence = \"5s\"\nsettle_delay = \"10ms\"\n")
                .unwrap();
        assert_eq!(config.quiescence.max_quiescence, Duration::from_secs(5));
        assert_eq!(config.quiescence.settle_delay, Duration::from_millis(10));
        assert_eq!(config.quiescence.large_file_threshold, 20 * 1024);
        assert_eq!(
            QuiescenceConfig::default().max_quiescence,
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_zero_debounce_from_toml_fails_validation() {
        let config: SyncConfig = toml::from_str("debounce = \"0s\"").unwrap();
        assert_eq!(config.debounce, Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::ZeroDebounce));
    }
}
