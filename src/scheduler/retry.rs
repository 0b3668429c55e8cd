//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry backoff settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Fraction of the delay used as symmetric jitter, in `[0, 1]`.
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            jitter_ratio: 0.1,
        }
    }
}

/// Computes the delay before the next attempt of a failed task.
///
/// Before jitter, the delay for attempt `n` is
/// `min(base * multiplier^(n-1), max)`. Jitter multiplies that by a uniform
/// factor in `[1 - jitter, 1 + jitter]` and the result is re-capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Out-of-range inputs are clamped: multipliers below 1 become 1, jitter
    /// is held to `[0, 1]`.
    pub fn new(base_delay: Duration, max_delay: Duration, multiplier: f64, jitter_ratio: f64) -> Self {
        let multiplier = if multiplier.is_finite() { multiplier.max(1.0) } else { 1.0 };
        let jitter_ratio = if jitter_ratio.is_finite() { jitter_ratio.clamp(0.0, 1.0) } else { 0.0 };
        Self { base_delay, max_delay, multiplier, jitter_ratio }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.multiplier,
            config.jitter_ratio,
        )
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Deterministic delay for `attempt` (1-based), without jitter.
    /// Attempt 0 is treated as 1.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt.max(1) - 1).unwrap_or(i32::MAX);
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        // Overflow to inf lands on the cap.
        let capped = raw.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Jittered delay using the thread-local RNG.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.next_delay_with(attempt, &mut rand::thread_rng())
    }

    /// Jittered delay drawing from `rng`.
    pub fn next_delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let delay = self.base_delay(attempt);
        if self.jitter_ratio == 0.0 {
            return delay;
        }
        let factor = rng.gen_range((1.0 - self.jitter_ratio)..=(1.0 + self.jitter_ratio));
        let jittered = (delay.as_secs_f64() * factor).clamp(0.0, self.max_delay.as_secs_f64());
        Duration::from_secs_f64(jittered)
    }

    /// A failure is retried only when it is retryable and attempts remain.
    pub fn should_retry(retryable: bool, attempt: u32, max_attempts: u32) -> bool {
        retryable && attempt < max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn policy(jitter: f64) -> RetryPolicy {
        RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(60), 2.0, jitter)
    }

    #[test]
    fn doubles_without_jitter() {
        let p = policy(0.0);
        let delays: Vec<_> = (1..=4).map(|n| p.next_delay(n)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
            ]
        );
    }

    #[test]
    fn caps_at_max_delay() {
        let p = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(5), 2.0, 0.0);
        assert_eq!(p.next_delay(4), Duration::from_secs(5));
        assert_eq!(p.next_delay(10), Duration::from_secs(5));
    }

    #[test]
    fn huge_attempt_saturates() {
        let p = policy(0.5);
        assert_eq!(p.base_delay(u32::MAX), Duration::from_secs(60));
        assert!(p.next_delay(u32::MAX) <= Duration::from_secs(60));
    }

    #[test]
    fn attempt_zero_is_attempt_one() {
        let p = policy(0.0);
        assert_eq!(p.base_delay(0), p.base_delay(1));
    }

    #[test]
    fn jitter_stays_in_band_and_under_cap() {
        let p = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(3), 2.0, 0.25);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let d = p.next_delay_with(1, &mut rng).as_secs_f64();
            assert!((0.75..=1.25).contains(&d), "delay {d} out of band");

            let capped = p.next_delay_with(3, &mut rng);
            assert!(capped <= Duration::from_secs(3));
        }
    }

    #[test]
    fn mean_is_non_decreasing() {
        let p = RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(2), 2.0, 0.5);
        let mut rng = StdRng::seed_from_u64(42);
        let mut previous = 0.0;
        for attempt in 1..=8 {
            let mean: f64 = (0..2_000)
                .map(|_| p.next_delay_with(attempt, &mut rng).as_secs_f64())
                .sum::<f64>()
                / 2_000.0;
            assert!(mean + 0.05 >= previous, "attempt {attempt}: {mean} < {previous}");
            previous = mean;
        }
    }

    #[test]
    fn invalid_inputs_are_clamped() {
        let p = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(10), 0.5, 3.0);
        // Multiplier clamped to 1: constant delay.
        assert_eq!(p.base_delay(5), Duration::from_secs(1));
        let mut rng = StdRng::seed_from_u64(1);
        assert!(p.next_delay_with(1, &mut rng) <= Duration::from_secs(2));
    }

    #[test]
    fn should_retry_respects_budget() {
        assert!(RetryPolicy::should_retry(true, 1, 3));
        assert!(RetryPolicy::should_retry(true, 2, 3));
        assert!(!RetryPolicy::should_retry(true, 3, 3));
        assert!(!RetryPolicy::should_retry(false, 1, 3));
    }
}
