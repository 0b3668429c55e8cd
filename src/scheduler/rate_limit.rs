//! Token bucket rate limiting.
//!
//! Acquisition is a reservation. Inside the lock the bucket is refilled and
//! the request is either granted now or booked at a future grant instant;
//! the caller sleeps outside the lock. Successive reservations stack
//! behind one another, so concurrent waiters are spaced `cost / rate` apart
//! and wake in arrival order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

/// Longest single reservation. Keeps `Instant` arithmetic in range for
/// pathological cost/rate combinations.
const MAX_RESERVATION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum RateLimitError {
    #[error("rate must be a positive finite number, got {0}")]
    InvalidRate(f64),
}

#[derive(Debug)]
struct Bucket {
    capacity: f64,
    rate: f64,
    tokens: f64,
    /// Instant up to which `tokens` is accounted. Ahead of the clock while
    /// reservations are outstanding.
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant) {
        if now > self.last_refill {
            let elapsed = (now - self.last_refill).as_secs_f64();
            self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
            self.last_refill = now;
        }
    }

    fn can_grant(&self, cost: f64, now: Instant) -> bool {
        self.last_refill <= now && self.tokens >= cost
    }
}

/// Token bucket: `capacity` tokens, refilled continuously at `rate` tokens
/// per second. Starts full.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Capacity is held to at least one token so a unit-cost request can
    /// always be granted from a full bucket.
    pub fn new(rate: f64, capacity: f64) -> Result<Self, RateLimitError> {
        validate_rate(rate)?;
        let capacity = if capacity.is_finite() { capacity.max(1.0) } else { 1.0 };
        Ok(Self {
            bucket: Mutex::new(Bucket {
                capacity,
                rate,
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        })
    }

    /// Reserve `cost` tokens as of `now` and return how long the caller must
    /// wait before proceeding. Zero means granted immediately.
    ///
    /// A cost larger than the capacity is granted after a proportional wait
    /// and leaves the bucket empty.
    pub fn reserve_at(&self, cost: u32, now: Instant) -> Duration {
        if cost == 0 {
            return Duration::ZERO;
        }
        let cost = f64::from(cost);
        let mut bucket = self.bucket.lock();
        bucket.refill(now);

        if bucket.can_grant(cost, now) {
            bucket.tokens -= cost;
            return Duration::ZERO;
        }

        if cost > bucket.capacity {
            debug!(
                cost,
                capacity = bucket.capacity,
                "rate_limit: cost exceeds bucket capacity, granting after proportional wait"
            );
        }

        let start = bucket.last_refill.max(now);
        let deficit = cost - bucket.tokens;
        let wait = Duration::try_from_secs_f64(deficit / bucket.rate)
            .unwrap_or(MAX_RESERVATION)
            .min(MAX_RESERVATION);
        let grant_at = start + wait;
        bucket.tokens = 0.0;
        bucket.last_refill = grant_at;
        grant_at - now
    }

    /// Wait until `cost` tokens are granted. Returns the time spent waiting.
    pub async fn acquire(&self, cost: u32) -> Duration {
        let wait = self.reserve_at(cost, Instant::now());
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        wait
    }

    /// Take `cost` tokens only if they are available right now.
    pub fn try_acquire(&self, cost: u32) -> bool {
        self.try_acquire_at(cost, Instant::now())
    }

    pub fn try_acquire_at(&self, cost: u32, now: Instant) -> bool {
        let cost = f64::from(cost);
        let mut bucket = self.bucket.lock();
        bucket.refill(now);
        if bucket.can_grant(cost, now) {
            bucket.tokens -= cost;
            true
        } else {
            false
        }
    }

    /// Change the refill rate. Tokens accrued so far are credited at the old
    /// rate first; reservations already handed out keep their grant instants.
    pub fn set_rate(&self, rate: f64) -> Result<(), RateLimitError> {
        validate_rate(rate)?;
        let mut bucket = self.bucket.lock();
        bucket.refill(Instant::now());
        bucket.rate = rate;
        Ok(())
    }

    pub fn rate(&self) -> f64 {
        self.bucket.lock().rate
    }

    pub fn capacity(&self) -> f64 {
        self.bucket.lock().capacity
    }

    /// Tokens available right now, without consuming any.
    pub fn available_tokens(&self) -> f64 {
        self.available_tokens_at(Instant::now())
    }

    pub fn available_tokens_at(&self, now: Instant) -> f64 {
        let bucket = self.bucket.lock();
        if now <= bucket.last_refill {
            return if now == bucket.last_refill { bucket.tokens } else { 0.0 };
        }
        let elapsed = (now - bucket.last_refill).as_secs_f64();
        (bucket.tokens + elapsed * bucket.rate).min(bucket.capacity)
    }
}

fn validate_rate(rate: f64) -> Result<(), RateLimitError> {
    if rate.is_finite() && rate > 0.0 {
        Ok(())
    } else {
        Err(RateLimitError::InvalidRate(rate))
    }
}

/// Independent buckets per partition key (typically a host), created on
/// first use with the same rate and capacity.
#[derive(Debug)]
pub struct PartitionedRateLimiter {
    rate: f64,
    capacity: f64,
    limiters: DashMap<String, Arc<RateLimiter>>,
}

impl PartitionedRateLimiter {
    pub fn new(rate: f64, capacity: f64) -> Result<Self, RateLimitError> {
        validate_rate(rate)?;
        Ok(Self { rate, capacity, limiters: DashMap::new() })
    }

    /// Bucket for `key`, creating it if needed.
    pub fn limiter(&self, key: &str) -> Arc<RateLimiter> {
        if let Some(existing) = self.limiters.get(key) {
            return Arc::clone(existing.value());
        }
        let entry = self.limiters.entry(key.to_string()).or_insert_with(|| {
            // Rate was validated in `new`.
            Arc::new(RateLimiter {
                bucket: Mutex::new(Bucket {
                    capacity: self.capacity.max(1.0),
                    rate: self.rate,
                    tokens: self.capacity.max(1.0),
                    last_refill: Instant::now(),
                }),
            })
        });
        Arc::clone(entry.value())
    }

    pub async fn acquire(&self, key: &str, cost: u32) -> Duration {
        self.limiter(key).acquire(cost).await
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}
