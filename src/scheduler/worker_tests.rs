//! Tests for the worker dispatch-execute loop.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

use super::*;
use crate::scheduler::{
    executor_fn, CancelOutcome, ErrorKind, Priority, RetryConfig, Scheduler, SchedulerConfig,
    StatusClassifier, TaskSpec, TaskState,
};
use crate::shutdown::ShutdownResult;

fn config(workers: usize, rate: f64, burst: f64) -> SchedulerConfig {
    SchedulerConfig {
        worker_count: workers,
        rate,
        burst_capacity: burst,
        retry: RetryConfig { base_delay_ms: 1, max_delay_ms: 5, multiplier: 2.0, jitter_ratio: 0.0 },
        idle_poll_ms: 10,
        ..SchedulerConfig::default()
    }
}

async fn eventually(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..300 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn panicking_executor_does_not_kill_worker() {
    let exec = executor_fn(|url: Arc<&'static str>, _ctx: ExecContext| async move {
        if *url == "boom" {
            panic!("parser blew up on {}", *url);
        }
        Ok::<_, ExecError>(url.len())
    });
    let scheduler = Scheduler::builder(config(1, 1000.0, 1000.0), exec).build().unwrap();
    let boom = scheduler
        .submit(TaskSpec::new("boom").with_priority(Priority::HIGH).with_max_attempts(1))
        .unwrap();
    let ok = scheduler.submit(TaskSpec::new("https://ok")).unwrap();
    scheduler.start();

    let boom = scheduler.wait_for(&boom).await.unwrap();
    assert_eq!(boom.state, TaskState::Failed);
    let error = boom.last_error.as_ref().unwrap();
    assert_eq!(error.kind, ErrorKind::Panicked);
    assert!(error.message.contains("parser blew up"), "{}", error.message);

    // A single worker served both, so it survived the panic.
    let ok = scheduler.wait_for(&ok).await.unwrap();
    assert_eq!(ok.state, TaskState::Succeeded);
    assert_eq!(ok.result, Some(10));
    assert_eq!(scheduler.stats().panicked, 1);
}

#[tokio::test]
async fn attempt_timeout_counts_as_retryable_failure() {
    let exec = executor_fn(|_: Arc<u8>, ctx: ExecContext| async move {
        if ctx.attempt == 1 {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        Ok::<_, ExecError>(ctx.attempt)
    });
    let scheduler = Scheduler::builder(config(1, 1000.0, 1000.0), exec).start().unwrap();
    let id = scheduler
        .submit(TaskSpec::new(0).with_timeout(Duration::from_millis(30)))
        .unwrap();

    let record = scheduler.wait_for(&id).await.unwrap();
    assert_eq!(record.state, TaskState::Succeeded);
    assert_eq!(record.attempts, 2);
    assert_eq!(record.result, Some(2));
    assert!(record.last_error.is_none());

    let stats = scheduler.stats();
    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.retried, 1);
}

#[tokio::test]
async fn cancel_while_waiting_for_permit_skips_execution() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let exec = executor_fn(move |_: Arc<u8>, _ctx: ExecContext| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ExecError>(())
        }
    });
    // One token per second: the second task sits on the limiter.
    let scheduler = Scheduler::builder(config(1, 1.0, 1.0), exec).start().unwrap();
    let first = scheduler.submit(TaskSpec::new(1)).unwrap();
    let second = scheduler.submit(TaskSpec::new(2)).unwrap();

    eventually("second task to be dispatched", || {
        scheduler.record(&first).is_some() && scheduler.stats().throttled == 1
    })
    .await;
    assert_eq!(scheduler.stats().running, 0);
    assert_eq!(scheduler.cancel(&second), CancelOutcome::Signalled);

    let record = scheduler.wait_for(&second).await.unwrap();
    assert_eq!(record.state, TaskState::Cancelled);
    assert_eq!(record.attempts, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn shutdown_returns_unstarted_task_to_queue() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let exec = executor_fn(move |_: Arc<u8>, _ctx: ExecContext| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ExecError>(())
        }
    });
    let scheduler = Scheduler::builder(config(1, 0.5, 1.0), exec).start().unwrap();
    let first = scheduler.submit(TaskSpec::new(1)).unwrap();
    let second = scheduler.submit(TaskSpec::new(2)).unwrap();
    let third = scheduler.submit(TaskSpec::new(3)).unwrap();

    eventually("second task to be dispatched", || {
        scheduler.record(&first).is_some() && scheduler.stats().throttled == 1
    })
    .await;

    let report = scheduler.shutdown_with_timeout(Duration::from_secs(1)).await;
    assert_eq!(report.result, ShutdownResult::Complete);
    assert!(report.abandoned.is_empty());
    assert_eq!(report.pending, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The handed-back task keeps its place ahead of the later submission.
    let snapshot = scheduler.snapshot();
    let ids: Vec<_> = snapshot.records.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids, [second, third]);
    assert!(snapshot.records.iter().all(|r| r.attempt == 0 && !r.in_flight));
}

#[tokio::test]
async fn tasks_waiting_for_permits_count_as_pending() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let exec = executor_fn(move |_: Arc<u8>, _ctx: ExecContext| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
            Ok::<_, ExecError>(())
        }
    });
    // One token, then one every ten seconds: two workers sit on the limiter.
    let scheduler = Scheduler::builder(config(3, 0.1, 1.0), exec).start().unwrap();
    for n in 0..3 {
        scheduler.submit(TaskSpec::new(n)).unwrap();
    }

    eventually("all three tasks to be dispatched", || scheduler.stats().throttled == 2).await;
    let stats = scheduler.stats();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(stats.running, 1);
    assert_eq!(stats.pending, 2);

    let snapshot = scheduler.snapshot();
    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot.records.iter().filter(|r| r.in_flight).count(), 1);
    assert!(snapshot.records.last().is_some_and(|r| r.in_flight));

    let report = scheduler.shutdown_with_timeout(Duration::from_millis(50)).await;
    assert_eq!(report.abandoned.len(), 1);
    assert_eq!(report.pending, 2);
}

/// Collects every `error.kind` value recorded on a span.
#[derive(Clone, Default)]
struct ErrorKinds(Arc<Mutex<Vec<String>>>);

struct KindVisitor<'a>(&'a mut Vec<String>);

impl Visit for KindVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "error.kind" {
            self.0.push(value.to_string());
        }
    }

    fn record_debug(&mut self, _field: &Field, _value: &dyn std::fmt::Debug) {}
}

impl<S: tracing::Subscriber> Layer<S> for ErrorKinds {
    fn on_record(&self, _id: &tracing::span::Id, values: &tracing::span::Record<'_>, _ctx: Context<'_, S>) {
        values.record(&mut KindVisitor(&mut self.0.lock()));
    }
}

#[tokio::test]
async fn attempt_span_carries_classified_kind() {
    let kinds = ErrorKinds::default();
    let subscriber = tracing_subscriber::registry().with(kinds.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    // No declared kind: only the classifier knows this is a server error.
    let exec = executor_fn(|_: Arc<u8>, _ctx: ExecContext| async {
        Err::<(), _>(ExecError::status(503, "upstream unavailable"))
    });
    let scheduler = Scheduler::builder(config(1, 1000.0, 1000.0), exec)
        .classifier(StatusClassifier)
        .start()
        .unwrap();
    let id = scheduler.submit(TaskSpec::new(0).with_max_attempts(1)).unwrap();
    let record = scheduler.wait_for(&id).await.unwrap();

    assert_eq!(record.last_error.as_ref().unwrap().kind, ErrorKind::ServerError);
    assert_eq!(*kinds.0.lock(), ["SERVER_ERROR"]);
}

#[tokio::test]
async fn idle_workers_exit_on_stop() {
    let exec = executor_fn(|_: Arc<u8>, _ctx: ExecContext| async move { Ok::<_, ExecError>(()) });
    let scheduler = Scheduler::builder(config(4, 10.0, 10.0), exec).start().unwrap();

    let report = tokio::time::timeout(
        Duration::from_secs(2),
        scheduler.shutdown_with_timeout(Duration::from_secs(1)),
    )
    .await
    .expect("idle pool should stop promptly");
    assert_eq!(report.result, ShutdownResult::Complete);
    assert_eq!(report.pending, 0);
}
