//! Config CLI subcommands: show, defaults, validate.
//!
//! These read configuration from the environment (and optionally a TOML
//! file) without starting a scheduler.

use std::path::Path;

use crate::config::{self, EffectiveConfig};
use crate::scheduler::{ConfigError, SchedulerConfig};

fn resolve(path: Option<&Path>) -> Result<SchedulerConfig, ConfigError> {
    match path {
        Some(path) => config::load_file(path),
        None => Ok(config::load()),
    }
}

/// Print effective config as key-value pairs to stdout.
///
/// Returns 0 on success, 2 if the config file cannot be loaded.
pub fn run_show(path: Option<&Path>) -> i32 {
    match resolve(path) {
        Ok(cfg) => {
            print_config(&EffectiveConfig::from(&cfg));
            0
        }
        Err(e) => {
            eprintln!("ERROR: {e}");
            2
        }
    }
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    print_config(&EffectiveConfig::from(&SchedulerConfig::default()));
}

/// Validate configuration for obvious misconfigurations.
///
/// Returns 0 if valid, 1 if warnings are found, 2 on errors.
pub fn run_validate(path: Option<&Path>) -> i32 {
    let cfg = match resolve(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return 2;
        }
    };
    if let Err(e) = cfg.validate() {
        eprintln!("ERROR: {e}");
        return 2;
    }

    let warnings = collect_warnings(&cfg);
    for warning in &warnings {
        eprintln!("WARNING: {warning}");
    }
    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

/// Settings that are accepted but probably not what the operator wants.
fn collect_warnings(cfg: &SchedulerConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if cfg.burst_capacity < cfg.rate {
        warnings.push(format!(
            "CRAWL_CORE_BURST ({}) < CRAWL_CORE_RATE ({}); the bucket cannot hold one second of tokens",
            cfg.burst_capacity, cfg.rate
        ));
    }
    if cfg.default_task_timeout_ms > 0 && cfg.default_task_timeout_ms / 1000 >= cfg.shutdown_timeout_secs {
        warnings.push(format!(
            "CRAWL_CORE_TASK_TIMEOUT_MS ({}) exceeds CRAWL_CORE_SHUTDOWN_TIMEOUT ({}s); running tasks may be abandoned",
            cfg.default_task_timeout_ms, cfg.shutdown_timeout_secs
        ));
    }
    if let Some(partition_rate) = cfg.partition_rate {
        if partition_rate > cfg.rate {
            warnings.push(format!(
                "CRAWL_CORE_PARTITION_RATE ({partition_rate}) > CRAWL_CORE_RATE ({}); the global limit always wins",
                cfg.rate
            ));
        }
    }
    warnings
}

fn print_config(cfg: &EffectiveConfig) {
    for (key, value) in cfg.pairs() {
        println!("{key}={value}");
    }
}
