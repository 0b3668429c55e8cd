//! Metric recorders over the `metrics` facade.
//!
//! Nothing is exported unless the embedding process installs a recorder;
//! without one every call is a no-op.

use std::time::Duration;

use crate::scheduler::ErrorKind;

pub const TASKS_TOTAL: &str = "crawl_core_tasks_total";
pub const TASK_LATENCY_MS: &str = "crawl_core_task_latency_ms";
pub const RETRIES_TOTAL: &str = "crawl_core_retries_total";
pub const QUEUE_DEPTH: &str = "crawl_core_queue_depth";
pub const RUNNING: &str = "crawl_core_running";
pub const RATE_LIMIT_WAIT_MS: &str = "crawl_core_rate_limit_wait_ms";
pub const RATE_LIMIT_RATE: &str = "crawl_core_rate_limit_rate";

/// A task reached a terminal state.
pub fn record_task_finished(outcome: &'static str) {
    metrics::counter!(TASKS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_attempt_latency(latency: Duration) {
    metrics::histogram!(TASK_LATENCY_MS).record(latency.as_secs_f64() * 1000.0);
}

pub fn record_retry(kind: ErrorKind) {
    metrics::counter!(RETRIES_TOTAL, "kind" => kind.as_str()).increment(1);
}

pub fn record_queue_depth(pending: usize, running: usize) {
    metrics::gauge!(QUEUE_DEPTH).set(pending as f64);
    metrics::gauge!(RUNNING).set(running as f64);
}

pub fn record_rate_limit_wait(wait: Duration) {
    metrics::histogram!(RATE_LIMIT_WAIT_MS).record(wait.as_secs_f64() * 1000.0);
}

pub fn record_rate(rate: f64) {
    metrics::gauge!(RATE_LIMIT_RATE).set(rate);
}
