//! Adaptive rate control (AIMD).
//!
//! Periodically compares the windowed success rate against a floor. Below
//! the floor the global rate is cut multiplicatively; at or above it the
//! rate recovers additively toward the configured ceiling.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::service::Shared;
use super::executor::Executor;
use super::stats::SchedulerStats;
use crate::telemetry::metrics;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    /// Success rate below which the rate is decreased.
    pub min_success_rate: f64,
    /// Window samples required before any adjustment.
    pub min_samples: usize,
    /// Multiplier applied on decrease, in `(0, 1)`.
    pub decrease_factor: f64,
    /// Tokens per second added on recovery.
    pub increase_step: f64,
    pub min_rate: f64,
    /// Ceiling for recovery. Defaults to the configured global rate.
    pub max_rate: Option<f64>,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 5_000,
            min_success_rate: 0.8,
            min_samples: 10,
            decrease_factor: 0.5,
            increase_step: 0.5,
            min_rate: 0.1,
            max_rate: None,
        }
    }
}

impl AdaptiveConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Next rate given the current one and a stats snapshot. Returns `current`
/// unchanged when there are too few samples to judge.
pub fn next_rate(config: &AdaptiveConfig, current: f64, ceiling: f64, stats: &SchedulerStats) -> f64 {
    let Some(success_rate) = stats.success_rate_window else {
        return current;
    };
    if stats.window_samples < config.min_samples {
        return current;
    }
    let floor = config.min_rate.min(ceiling);
    if success_rate < config.min_success_rate {
        (current * config.decrease_factor).max(floor)
    } else {
        (current + config.increase_step).min(ceiling)
    }
}

/// Run the controller until the scheduler stops.
pub(crate) fn spawn_controller<E: Executor>(shared: Arc<Shared<E>>) -> JoinHandle<()> {
    let config = shared.config.adaptive.clone();
    let ceiling = config.max_rate.unwrap_or(shared.config.rate);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                biased;
                () = shared.stop.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let stats = shared.stats();
            let current = stats.rate;
            let next = next_rate(&config, current, ceiling, &stats);
            if (next - current).abs() < f64::EPSILON {
                continue;
            }
            match shared.limiter.set_rate(next) {
                Ok(()) => {
                    metrics::record_rate(next);
                    info!(
                        from = current,
                        to = next,
                        success_rate = stats.success_rate_window.unwrap_or_default(),
                        "adaptive: rate adjusted"
                    );
                }
                Err(e) => warn!(error = %e, "adaptive: rejected rate"),
            }
        }
    })
}
