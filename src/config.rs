//! Runtime configuration loading from environment variables.
//!
//! Values come from `CRAWL_CORE_*` environment variables layered over the
//! [`SchedulerConfig`] defaults (or over a TOML file with [`load_file`]).
//! Invalid values fall back to the base value without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `CRAWL_CORE_WORKERS` | CPU count | Worker pool size |
//! | `CRAWL_CORE_RATE` | 10 | Global rate (tokens/sec) |
//! | `CRAWL_CORE_BURST` | 10 | Global bucket capacity |
//! | `CRAWL_CORE_RETRY_BASE_MS` | 1000 | First retry delay |
//! | `CRAWL_CORE_RETRY_MAX_MS` | 60000 | Retry delay cap |
//! | `CRAWL_CORE_RETRY_MULTIPLIER` | 2.0 | Backoff multiplier |
//! | `CRAWL_CORE_RETRY_JITTER` | 0.1 | Jitter ratio in `[0, 1]` |
//! | `CRAWL_CORE_MAX_ATTEMPTS` | 3 | Default attempts per task |
//! | `CRAWL_CORE_TASK_TIMEOUT_MS` | 0 | Default attempt timeout (0 = none) |
//! | `CRAWL_CORE_SHUTDOWN_TIMEOUT` | 30 | Graceful shutdown timeout (secs, at most one day) |
//! | `CRAWL_CORE_STATS_WINDOW` | 60 | Stats window (secs) |
//! | `CRAWL_CORE_CHECKPOINT_INTERVAL` | 0 | Periodic checkpoint (secs, 0 = off) |
//! | `CRAWL_CORE_PARTITION_RATE` | unset | Per-partition rate (tokens/sec) |
//! | `CRAWL_CORE_PARTITION_BURST` | 1 | Per-partition capacity |
//! | `CRAWL_CORE_ADAPTIVE` | false | Enable adaptive rate control |

use std::path::Path;

use crate::scheduler::{ConfigError, SchedulerConfig, MAX_SHUTDOWN_TIMEOUT_SECS};

/// Effective configuration summary, one line per setting.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    pub workers: usize,
    pub rate: f64,
    pub burst: f64,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub retry_multiplier: f64,
    pub retry_jitter: f64,
    pub max_attempts: u32,
    pub task_timeout_ms: u64,
    pub shutdown_timeout_secs: u64,
    pub stats_window_secs: u64,
    pub checkpoint_interval_secs: u64,
    pub partition_rate: Option<f64>,
    pub partition_burst: f64,
    pub adaptive: bool,
}

impl EffectiveConfig {
    /// `KEY=VALUE` pairs using the environment variable names.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("CRAWL_CORE_WORKERS", self.workers.to_string()),
            ("CRAWL_CORE_RATE", self.rate.to_string()),
            ("CRAWL_CORE_BURST", self.burst.to_string()),
            ("CRAWL_CORE_RETRY_BASE_MS", self.retry_base_ms.to_string()),
            ("CRAWL_CORE_RETRY_MAX_MS", self.retry_max_ms.to_string()),
            ("CRAWL_CORE_RETRY_MULTIPLIER", self.retry_multiplier.to_string()),
            ("CRAWL_CORE_RETRY_JITTER", self.retry_jitter.to_string()),
            ("CRAWL_CORE_MAX_ATTEMPTS", self.max_attempts.to_string()),
            ("CRAWL_CORE_TASK_TIMEOUT_MS", self.task_timeout_ms.to_string()),
            ("CRAWL_CORE_SHUTDOWN_TIMEOUT", self.shutdown_timeout_secs.to_string()),
            ("CRAWL_CORE_STATS_WINDOW", self.stats_window_secs.to_string()),
            ("CRAWL_CORE_CHECKPOINT_INTERVAL", self.checkpoint_interval_secs.to_string()),
            (
                "CRAWL_CORE_PARTITION_RATE",
                self.partition_rate.map_or_else(|| "unset".to_string(), |r| r.to_string()),
            ),
            ("CRAWL_CORE_PARTITION_BURST", self.partition_burst.to_string()),
            ("CRAWL_CORE_ADAPTIVE", self.adaptive.to_string()),
        ]
    }
}

impl From<&SchedulerConfig> for EffectiveConfig {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            workers: config.worker_count,
            rate: config.rate,
            burst: config.burst_capacity,
            retry_base_ms: config.retry.base_delay_ms,
            retry_max_ms: config.retry.max_delay_ms,
            retry_multiplier: config.retry.multiplier,
            retry_jitter: config.retry.jitter_ratio,
            max_attempts: config.default_max_attempts,
            task_timeout_ms: config.default_task_timeout_ms,
            shutdown_timeout_secs: config.shutdown_timeout_secs,
            stats_window_secs: config.stats_window_secs,
            checkpoint_interval_secs: config.checkpoint_interval_secs,
            partition_rate: config.partition_rate,
            partition_burst: config.partition_burst,
            adaptive: config.adaptive.enabled,
        }
    }
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u32` env var, returning `default` on missing or invalid.
fn parse_u32(key: &str, default: u32) -> u32 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u32>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a finite `f64` env var, returning `default` on missing or invalid.
fn parse_f64(key: &str, default: f64) -> f64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(default),
        Err(_) => default,
    }
}

fn parse_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Apply `CRAWL_CORE_*` overrides on top of `base`, clamping each value into
/// the range the scheduler accepts.
pub fn apply_env(base: SchedulerConfig) -> SchedulerConfig {
    let mut config = base;

    config.worker_count = parse_usize("CRAWL_CORE_WORKERS", config.worker_count).clamp(1, 4096);

    let rate = parse_f64("CRAWL_CORE_RATE", config.rate);
    config.rate = if rate > 0.0 { rate } else { config.rate };
    config.burst_capacity = parse_f64("CRAWL_CORE_BURST", config.burst_capacity).max(1.0);

    let retry = &mut config.retry;
    retry.base_delay_ms = parse_u64("CRAWL_CORE_RETRY_BASE_MS", retry.base_delay_ms);
    retry.max_delay_ms = parse_u64("CRAWL_CORE_RETRY_MAX_MS", retry.max_delay_ms).max(retry.base_delay_ms);
    retry.multiplier = parse_f64("CRAWL_CORE_RETRY_MULTIPLIER", retry.multiplier).max(1.0);
    retry.jitter_ratio = parse_f64("CRAWL_CORE_RETRY_JITTER", retry.jitter_ratio).clamp(0.0, 1.0);

    config.default_max_attempts = parse_u32("CRAWL_CORE_MAX_ATTEMPTS", config.default_max_attempts).max(1);
    config.default_task_timeout_ms = parse_u64("CRAWL_CORE_TASK_TIMEOUT_MS", config.default_task_timeout_ms);
    config.shutdown_timeout_secs = parse_u64("CRAWL_CORE_SHUTDOWN_TIMEOUT", config.shutdown_timeout_secs)
        .clamp(1, MAX_SHUTDOWN_TIMEOUT_SECS);
    config.stats_window_secs = parse_u64("CRAWL_CORE_STATS_WINDOW", config.stats_window_secs).max(1);
    config.checkpoint_interval_secs =
        parse_u64("CRAWL_CORE_CHECKPOINT_INTERVAL", config.checkpoint_interval_secs);

    if std::env::var_os("CRAWL_CORE_PARTITION_RATE").is_some() {
        let rate = parse_f64("CRAWL_CORE_PARTITION_RATE", 0.0);
        config.partition_rate = (rate > 0.0).then_some(rate).or(config.partition_rate);
    }
    config.partition_burst = parse_f64("CRAWL_CORE_PARTITION_BURST", config.partition_burst).max(1.0);
    config.adaptive.enabled = parse_bool("CRAWL_CORE_ADAPTIVE", config.adaptive.enabled);

    config
}

/// Load configuration from defaults and environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> SchedulerConfig {
    apply_env(SchedulerConfig::default())
}

/// Load a TOML file, then apply environment overrides and validate.
pub fn load_file(path: impl AsRef<Path>) -> Result<SchedulerConfig, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let base: SchedulerConfig = toml::from_str(&text)?;
    let config = apply_env(base);
    config.validate()?;
    Ok(config)
}
