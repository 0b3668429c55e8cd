//! Token bucket behaviour under sequential and concurrent callers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crawl_core::scheduler::{PartitionedRateLimiter, RateLimitError, RateLimiter};
use tokio_test::{assert_err, assert_ok};

#[test]
fn rejects_non_positive_rates() {
    assert!(matches!(RateLimiter::new(0.0, 5.0), Err(RateLimitError::InvalidRate(_))));
    assert!(matches!(RateLimiter::new(f64::NAN, 5.0), Err(RateLimitError::InvalidRate(_))));
    let limiter = assert_ok!(RateLimiter::new(1.0, 1.0));
    assert_err!(limiter.set_rate(-2.0));
    assert_eq!(limiter.rate(), 1.0);
}

#[test]
fn concurrent_reservations_are_evenly_spaced() {
    let limiter = Arc::new(RateLimiter::new(20.0, 1.0).unwrap());
    let now = Instant::now();

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            std::thread::spawn(move || limiter.reserve_at(1, now))
        })
        .collect();
    let mut waits: Vec<Duration> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    waits.sort();

    // No two callers share a token: one immediate grant, then one per 50ms.
    for (i, wait) in waits.iter().enumerate() {
        let expected = Duration::from_millis(50 * i as u64);
        let diff = if *wait > expected { *wait - expected } else { expected - *wait };
        assert!(diff < Duration::from_millis(1), "grant {i}: waited {wait:?}, expected {expected:?}");
    }
}

#[tokio::test]
async fn sustained_rate_converges_to_configured_rate() {
    let limiter = RateLimiter::new(100.0, 10.0).unwrap();
    let started = Instant::now();
    for _ in 0..40 {
        limiter.acquire(1).await;
    }
    let elapsed = started.elapsed();

    // Ten from the full bucket, thirty more at 100/s.
    assert!(elapsed >= Duration::from_millis(290), "40 grants in {elapsed:?}");
    let observed = 30.0 / elapsed.as_secs_f64();
    assert!(observed <= 105.0, "observed {observed:.1}/s");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acquirers_share_one_budget() {
    let limiter = Arc::new(RateLimiter::new(50.0, 1.0).unwrap());
    let started = Instant::now();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.acquire(1).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    // One immediate grant, seven more at 20ms spacing.
    assert!(started.elapsed() >= Duration::from_millis(135));
}

#[test]
fn rate_change_applies_to_new_reservations() {
    let limiter = RateLimiter::new(10.0, 1.0).unwrap();
    let now = Instant::now();
    assert_eq!(limiter.reserve_at(1, now), Duration::ZERO);
    assert!(!limiter.try_acquire_at(1, now));

    limiter.set_rate(1.0).unwrap();
    let later = now + Duration::from_millis(500);
    assert!(!limiter.try_acquire_at(1, later));
    assert!(limiter.try_acquire_at(1, now + Duration::from_millis(1_001)));
}

#[tokio::test]
async fn partitions_are_independent() {
    let partitions = PartitionedRateLimiter::new(1.0, 1.0).unwrap();
    assert!(partitions.is_empty());

    let started = Instant::now();
    partitions.acquire("a.test", 1).await;
    partitions.acquire("b.test", 1).await;
    partitions.acquire("c.test", 1).await;
    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(partitions.len(), 3);

    let a = partitions.limiter("a.test");
    assert!(Arc::ptr_eq(&a, &partitions.limiter("a.test")));
    assert!(!a.try_acquire(1));
}
