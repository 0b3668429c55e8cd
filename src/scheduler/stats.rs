//! Scheduler counters and sliding-window health figures.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Point-in-time view of scheduler activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Failed attempts that were re-queued.
    pub retried: u64,
    pub timed_out: u64,
    pub panicked: u64,
    pub pending: usize,
    /// Subset of `pending` whose `not_before` is still in the future.
    pub delayed: usize,
    /// Subset of `pending` already dispatched and waiting for rate-limit
    /// permits.
    pub throttled: usize,
    /// Tasks inside an executor call.
    pub running: usize,
    /// Mean executor time per attempt since start.
    pub avg_latency_ms: f64,
    /// Fraction of attempts in the window that succeeded. `None` while the
    /// window is empty.
    pub success_rate_window: Option<f64>,
    /// Attempts completed per second over the window, or over the uptime
    /// while that is shorter.
    pub throughput_per_sec: f64,
    pub window_samples: usize,
    /// Current global rate limit in tokens per second.
    pub rate: f64,
}

impl SchedulerStats {
    /// Tasks that reached a terminal state.
    pub fn finished(&self) -> u64 {
        self.succeeded + self.failed + self.cancelled
    }
}

/// Attempt-level outcome fed into the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttemptOutcome {
    Success,
    Failure,
    Timeout,
    Panic,
}

#[derive(Debug)]
pub(crate) struct StatsTracker {
    window: Duration,
    started: Instant,
    submitted: u64,
    succeeded: u64,
    failed: u64,
    cancelled: u64,
    retried: u64,
    timed_out: u64,
    panicked: u64,
    latency_total: Duration,
    latency_samples: u64,
    samples: VecDeque<(Instant, bool)>,
}

impl StatsTracker {
    pub fn new(window: Duration) -> Self {
        Self::started_at(window, Instant::now())
    }

    pub fn started_at(window: Duration, started: Instant) -> Self {
        Self {
            window,
            started,
            submitted: 0,
            succeeded: 0,
            failed: 0,
            cancelled: 0,
            retried: 0,
            timed_out: 0,
            panicked: 0,
            latency_total: Duration::ZERO,
            latency_samples: 0,
            samples: VecDeque::new(),
        }
    }

    pub fn record_submitted(&mut self) {
        self.submitted += 1;
    }

    pub fn record_attempt(&mut self, outcome: AttemptOutcome, latency: Duration, now: Instant) {
        self.latency_total += latency;
        self.latency_samples += 1;
        match outcome {
            AttemptOutcome::Timeout => self.timed_out += 1,
            AttemptOutcome::Panic => self.panicked += 1,
            AttemptOutcome::Success | AttemptOutcome::Failure => {}
        }
        self.samples.push_back((now, outcome == AttemptOutcome::Success));
        self.prune(now);
    }

    pub fn record_retry(&mut self) {
        self.retried += 1;
    }

    pub fn record_succeeded(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_failed(&mut self) {
        self.failed += 1;
    }

    pub fn record_cancelled(&mut self) {
        self.cancelled += 1;
    }

    fn prune(&mut self, now: Instant) {
        while self
            .samples
            .front()
            .is_some_and(|(at, _)| now.saturating_duration_since(*at) > self.window)
        {
            self.samples.pop_front();
        }
    }

    /// Build a snapshot, dropping samples older than the window first.
    pub fn snapshot(
        &mut self,
        now: Instant,
        pending: usize,
        delayed: usize,
        running: usize,
        rate: f64,
    ) -> SchedulerStats {
        self.prune(now);
        let window_samples = self.samples.len();
        let successes = self.samples.iter().filter(|(_, ok)| *ok).count();
        let success_rate_window =
            (window_samples > 0).then(|| successes as f64 / window_samples as f64);
        let span_secs = self.window.min(now.saturating_duration_since(self.started)).as_secs_f64();
        let throughput_per_sec =
            if span_secs > 0.0 { window_samples as f64 / span_secs } else { 0.0 };
        let avg_latency_ms = if self.latency_samples > 0 {
            self.latency_total.as_secs_f64() * 1000.0 / self.latency_samples as f64
        } else {
            0.0
        };

        SchedulerStats {
            submitted: self.submitted,
            succeeded: self.succeeded,
            failed: self.failed,
            cancelled: self.cancelled,
            retried: self.retried,
            timed_out: self.timed_out,
            panicked: self.panicked,
            pending,
            delayed,
            throttled: 0,
            running,
            avg_latency_ms,
            success_rate_window,
            throughput_per_sec,
            window_samples,
            rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_has_no_success_rate() {
        let mut tracker = StatsTracker::new(Duration::from_secs(10));
        let stats = tracker.snapshot(Instant::now(), 0, 0, 0, 1.0);
        assert_eq!(stats.success_rate_window, None);
        assert_eq!(stats.avg_latency_ms, 0.0);
    }

    #[test]
    fn window_success_rate_and_latency() {
        let started = Instant::now();
        let mut tracker = StatsTracker::started_at(Duration::from_secs(10), started);
        let now = started + Duration::from_secs(30);
        tracker.record_attempt(AttemptOutcome::Success, Duration::from_millis(10), now);
        tracker.record_attempt(AttemptOutcome::Failure, Duration::from_millis(30), now);
        tracker.record_attempt(AttemptOutcome::Timeout, Duration::from_millis(20), now);
        tracker.record_attempt(AttemptOutcome::Success, Duration::from_millis(20), now);

        let stats = tracker.snapshot(now, 1, 0, 2, 5.0);
        assert_eq!(stats.success_rate_window, Some(0.5));
        assert!((stats.avg_latency_ms - 20.0).abs() < 1e-6);
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.window_samples, 4);
        assert!((stats.throughput_per_sec - 0.4).abs() < 1e-9);
        assert_eq!(stats.running, 2);
        assert_eq!(stats.rate, 5.0);
    }

    #[test]
    fn old_samples_fall_out_of_window() {
        let mut tracker = StatsTracker::new(Duration::from_secs(1));
        let t0 = Instant::now();
        tracker.record_attempt(AttemptOutcome::Failure, Duration::ZERO, t0);
        tracker.record_attempt(AttemptOutcome::Success, Duration::ZERO, t0 + Duration::from_secs(2));

        let stats = tracker.snapshot(t0 + Duration::from_secs(2), 0, 0, 0, 1.0);
        assert_eq!(stats.window_samples, 1);
        assert_eq!(stats.success_rate_window, Some(1.0));
    }

    #[test]
    fn throughput_uses_uptime_before_window_fills() {
        let started = Instant::now();
        let mut tracker = StatsTracker::started_at(Duration::from_secs(60), started);
        let now = started + Duration::from_secs(2);
        for _ in 0..4 {
            tracker.record_attempt(AttemptOutcome::Success, Duration::ZERO, now);
        }

        let stats = tracker.snapshot(now, 0, 0, 0, 1.0);
        assert!((stats.throughput_per_sec - 2.0).abs() < 1e-9, "{}", stats.throughput_per_sec);

        // Once the window has filled, it is the divisor again.
        let later = started + Duration::from_secs(60);
        let stats = tracker.snapshot(later, 0, 0, 0, 1.0);
        assert!((stats.throughput_per_sec - 4.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn finished_sums_terminal_counters() {
        let mut tracker = StatsTracker::new(Duration::from_secs(1));
        tracker.record_succeeded();
        tracker.record_failed();
        tracker.record_cancelled();
        tracker.record_cancelled();
        let stats = tracker.snapshot(Instant::now(), 0, 0, 0, 1.0);
        assert_eq!(stats.finished(), 4);
    }
}
