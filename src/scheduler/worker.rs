//! Worker pool: pull ready tasks, acquire permits, execute one attempt.
//!
//! Each worker owns at most one task at a time, which bounds concurrent
//! executor calls by the pool size. Executor panics and timeouts are turned
//! into ordinary attempt failures; a misbehaving executor never takes a
//! worker down.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, Instrument};

use super::service::{Dispatch, Shared};
use super::error::{ClassifiedError, ExecError};
use super::executor::{ExecContext, Executor};
use super::task::Task;
use crate::shutdown::InFlightGuard;
use crate::telemetry::{metrics, SpanExt, TaskSpan};

/// Spawn `config.worker_count` workers. Returns their handles for shutdown.
pub(crate) fn spawn_workers<E: Executor>(shared: &Arc<Shared<E>>) -> Vec<JoinHandle<()>> {
    (0..shared.config.worker_count)
        .map(|index| {
            let shared = Arc::clone(shared);
            tokio::spawn(async move { worker_loop(index, shared).await })
        })
        .collect()
}

async fn worker_loop<E: Executor>(index: usize, shared: Arc<Shared<E>>) {
    debug!(worker = index, "worker: started");
    let idle_poll = shared.config.idle_poll();

    loop {
        // Registered before checking the queue so a push in between is not
        // missed.
        let notified = shared.work.notified();

        match shared.next_dispatch(Instant::now()) {
            Dispatch::Stop => break,
            Dispatch::Run(task, guard) => run_task(&shared, task, guard).await,
            Dispatch::Wait(next) => {
                let wait = next.map_or(idle_poll, |d| d.min(idle_poll));
                tokio::select! {
                    biased;
                    () = shared.stop.cancelled() => break,
                    () = notified => {}
                    () = tokio::time::sleep(wait) => {}
                }
            }
        }
    }
    debug!(worker = index, "worker: stopped");
}

async fn run_task<E: Executor>(shared: &Shared<E>, task: Task<E::Payload>, _guard: InFlightGuard) {
    let waited = tokio::select! {
        biased;
        () = shared.stop.cancelled() => None,
        waited = acquire_permits(shared, &task) => Some(waited),
    };
    let Some(waited) = waited else {
        shared.requeue_unstarted(task);
        return;
    };
    if !waited.is_zero() {
        metrics::record_rate_limit_wait(waited);
    }

    let Some(task) = shared.begin_attempt(task) else {
        return;
    };
    let (outcome, latency) = execute_attempt(shared, &task).await;
    shared.complete(task, outcome, latency);
}

/// Global permit first, then the task's partition permit if it has one.
async fn acquire_permits<E: Executor>(shared: &Shared<E>, task: &Task<E::Payload>) -> Duration {
    let mut waited = shared.limiter.acquire(task.cost).await;
    if let (Some(partitions), Some(key)) = (&shared.partitions, &task.partition) {
        waited += partitions.acquire(key, task.cost).await;
    }
    waited
}

/// Run one attempt and classify its failure inside the attempt span.
async fn execute_attempt<E: Executor>(
    shared: &Shared<E>,
    task: &Task<E::Payload>,
) -> (Result<E::Output, ClassifiedError>, Duration) {
    let ctx = ExecContext {
        task_id: task.id.clone(),
        attempt: task.attempt + 1,
        max_attempts: task.max_attempts,
        cancel: task.cancel.clone(),
    };
    let span = TaskSpan::new(task.id.as_str(), ctx.attempt, task.max_attempts);
    let started = Instant::now();
    let call = AssertUnwindSafe(shared.executor.execute(Arc::clone(&task.payload), ctx)).catch_unwind();

    let outcome = match task.timeout {
        Some(limit) => match tokio::time::timeout(limit, call).instrument(span.clone()).await {
            Ok(result) => result.unwrap_or_else(|panic| Err(panicked(panic))),
            Err(_) => Err(ExecError::timeout(format!(
                "attempt exceeded {}ms",
                limit.as_millis()
            ))),
        },
        None => call
            .instrument(span.clone())
            .await
            .unwrap_or_else(|panic| Err(panicked(panic))),
    };

    let latency = started.elapsed();
    let outcome = outcome.map_err(|e| shared.classifier.classify(&e));
    span.record("latency_ms", latency.as_millis() as u64);
    span.record_result(&outcome);
    if let Err(error) = &outcome {
        span.record("error.kind", error.kind.as_str());
    }
    (outcome, latency)
}

fn panicked(panic: Box<dyn Any + Send>) -> ExecError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "executor panicked".to_string());
    ExecError::panicked(format!("executor panicked: {message}"))
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
