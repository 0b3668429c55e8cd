//! Scheduler configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::adaptive::AdaptiveConfig;
use super::retry::RetryConfig;
use super::task::TaskDefaults;

/// Upper bound for `shutdown_timeout_secs` (one day).
pub const MAX_SHUTDOWN_TIMEOUT_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Concurrent executor calls
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Global refill rate, tokens per second
    #[serde(default = "default_rate")]
    pub rate: f64,

    /// Global bucket capacity (burst size)
    #[serde(default = "default_burst_capacity")]
    pub burst_capacity: f64,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,

    /// Per-attempt timeout applied when a task sets none. 0 disables.
    #[serde(default)]
    pub default_task_timeout_ms: u64,

    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Sliding window for success rate and throughput
    #[serde(default = "default_stats_window_secs")]
    pub stats_window_secs: u64,

    /// Periodic checkpoint interval. 0 disables periodic checkpoints.
    #[serde(default)]
    pub checkpoint_interval_secs: u64,

    /// Upper bound on how long an idle worker sleeps before re-checking
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,

    /// Per-partition rate, applied to tasks that carry a partition key
    #[serde(default)]
    pub partition_rate: Option<f64>,

    #[serde(default = "default_partition_burst")]
    pub partition_burst: f64,

    #[serde(default)]
    pub adaptive: AdaptiveConfig,
}

fn default_worker_count() -> usize {
    num_cpus::get().max(1)
}

fn default_rate() -> f64 {
    10.0
}

fn default_burst_capacity() -> f64 {
    10.0
}

fn default_max_attempts() -> u32 {
    3
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_stats_window_secs() -> u64 {
    60
}

fn default_idle_poll_ms() -> u64 {
    250
}

fn default_partition_burst() -> f64 {
    1.0
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            rate: default_rate(),
            burst_capacity: default_burst_capacity(),
            retry: RetryConfig::default(),
            default_max_attempts: default_max_attempts(),
            default_task_timeout_ms: 0,
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            stats_window_secs: default_stats_window_secs(),
            checkpoint_interval_secs: 0,
            idle_poll_ms: default_idle_poll_ms(),
            partition_rate: None,
            partition_burst: default_partition_burst(),
            adaptive: AdaptiveConfig::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn stats_window(&self) -> Duration {
        Duration::from_secs(self.stats_window_secs)
    }

    pub fn checkpoint_interval(&self) -> Option<Duration> {
        (self.checkpoint_interval_secs > 0).then(|| Duration::from_secs(self.checkpoint_interval_secs))
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms.max(1))
    }

    pub fn default_task_timeout(&self) -> Option<Duration> {
        (self.default_task_timeout_ms > 0).then(|| Duration::from_millis(self.default_task_timeout_ms))
    }

    pub fn task_defaults(&self) -> TaskDefaults {
        TaskDefaults {
            max_attempts: self.default_max_attempts,
            timeout: self.default_task_timeout(),
        }
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.worker_count == 0 {
            return invalid("worker_count must be at least 1".into());
        }
        if !(self.rate.is_finite() && self.rate > 0.0) {
            return invalid(format!("rate must be positive, got {}", self.rate));
        }
        if !(self.burst_capacity.is_finite() && self.burst_capacity >= 1.0) {
            return invalid(format!("burst_capacity must be >= 1, got {}", self.burst_capacity));
        }
        if self.default_max_attempts == 0 {
            return invalid("default_max_attempts must be at least 1".into());
        }
        if !(self.retry.multiplier.is_finite() && self.retry.multiplier >= 1.0) {
            return invalid(format!("retry.multiplier must be >= 1, got {}", self.retry.multiplier));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_ratio) {
            return invalid(format!("retry.jitter_ratio must be in [0, 1], got {}", self.retry.jitter_ratio));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return invalid("retry.max_delay_ms must be >= retry.base_delay_ms".into());
        }
        if !(1..=MAX_SHUTDOWN_TIMEOUT_SECS).contains(&self.shutdown_timeout_secs) {
            return invalid(format!(
                "shutdown_timeout_secs must be in [1, {MAX_SHUTDOWN_TIMEOUT_SECS}], got {}",
                self.shutdown_timeout_secs
            ));
        }
        if self.stats_window_secs == 0 {
            return invalid("stats_window_secs must be at least 1".into());
        }
        if let Some(rate) = self.partition_rate {
            if !(rate.is_finite() && rate > 0.0) {
                return invalid(format!("partition_rate must be positive, got {rate}"));
            }
        }
        let adaptive = &self.adaptive;
        if adaptive.enabled {
            if !(adaptive.decrease_factor > 0.0 && adaptive.decrease_factor < 1.0) {
                return invalid("adaptive.decrease_factor must be in (0, 1)".into());
            }
            if !(adaptive.min_rate.is_finite() && adaptive.min_rate > 0.0) {
                return invalid("adaptive.min_rate must be positive".into());
            }
            if adaptive.interval_ms == 0 {
                return invalid("adaptive.interval_ms must be at least 1".into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.worker_count >= 1);
        assert_eq!(config.default_max_attempts, 3);
        assert_eq!(config.checkpoint_interval(), None);
        assert_eq!(config.default_task_timeout(), None);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SchedulerConfig = toml::from_str(
            r#"
            rate = 2.5
            worker_count = 4

            [retry]
            base_delay_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.rate, 2.5);
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.retry.base_delay_ms, 250);
        assert_eq!(config.retry.max_delay_ms, 60_000);
        assert_eq!(config.burst_capacity, 10.0);
        assert!(!config.adaptive.enabled);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            SchedulerConfig { worker_count: 0, ..Default::default() },
            SchedulerConfig { rate: 0.0, ..Default::default() },
            SchedulerConfig { burst_capacity: 0.5, ..Default::default() },
            SchedulerConfig { default_max_attempts: 0, ..Default::default() },
            SchedulerConfig { partition_rate: Some(-1.0), ..Default::default() },
            SchedulerConfig { shutdown_timeout_secs: 0, ..Default::default() },
            SchedulerConfig { shutdown_timeout_secs: u64::MAX, ..Default::default() },
            SchedulerConfig {
                retry: RetryConfig { jitter_ratio: 1.5, ..Default::default() },
                ..Default::default()
            },
            SchedulerConfig {
                retry: RetryConfig { base_delay_ms: 10, max_delay_ms: 5, ..Default::default() },
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))), "{config:?}");
        }
    }

    #[test]
    fn test_duration_accessors() {
        let config = SchedulerConfig {
            shutdown_timeout_secs: 5,
            checkpoint_interval_secs: 30,
            default_task_timeout_ms: 1500,
            ..Default::default()
        };
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(config.checkpoint_interval(), Some(Duration::from_secs(30)));
        assert_eq!(config.task_defaults().timeout, Some(Duration::from_millis(1500)));
    }
}
