//! Scheduler facade and shared state.
//!
//! All mutable scheduling state (ready queue, running table, finished
//! records, stats) lives behind one lock so every transition is atomic with
//! respect to snapshots and shutdown. Executor calls and rate-limit waits
//! happen outside it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::adaptive;
use super::checkpoint::{
    record_from_task, Checkpoint, CheckpointStore, ClockAnchor, CHECKPOINT_VERSION,
};
use super::config::{ConfigError, SchedulerConfig};
use super::error::{
    CheckpointError, ClassifiedError, DeclaredClassifier, ErrorClassifier, ErrorKind, SubmitError,
};
use super::executor::Executor;
use super::rate_limit::{PartitionedRateLimiter, RateLimiter};
use super::ready_queue::{PopResult, ReadyQueue};
use super::retry::RetryPolicy;
use super::stats::{AttemptOutcome, SchedulerStats, StatsTracker};
use super::task::{Task, TaskDefaults, TaskId, TaskRecord, TaskSpec, TaskState};
use super::worker;
use crate::shutdown::{InFlightGuard, ShutdownCoordinator, ShutdownResult, ShutdownState};
use crate::telemetry::metrics;

type Payload<E> = <E as Executor>::Payload;
type Output<E> = <E as Executor>::Output;

/// Result of [`Scheduler::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The task was pending and has been removed.
    Removed,
    /// The task is running; its cancel token was triggered.
    Signalled,
    NotFound,
}

/// Outcome of a graceful shutdown.
#[derive(Debug)]
pub struct ShutdownReport {
    pub result: ShutdownResult,
    /// Tasks still running at the deadline, finalized as `SHUTDOWN_TIMEOUT`.
    pub abandoned: Vec<TaskId>,
    /// Tasks left pending (and written to the final checkpoint).
    pub pending: usize,
    /// Records saved in the final checkpoint. `None` without a store.
    pub checkpoint: Option<Result<usize, CheckpointError>>,
}

/// What a worker should do next.
pub(crate) enum Dispatch<P> {
    Run(Task<P>, InFlightGuard),
    /// Nothing ready; sleep at most this long (or until notified).
    Wait(Option<Duration>),
    Stop,
}

pub(crate) struct Inner<P, R> {
    queue: ReadyQueue<P>,
    /// Dispatched tasks as they were before the current attempt. Entries
    /// still waiting for rate-limit permits stay `Pending`.
    running: HashMap<TaskId, Task<P>>,
    finished: HashMap<TaskId, Arc<TaskRecord<P, R>>>,
    stats: StatsTracker,
}

impl<P, R> Inner<P, R> {
    fn knows(&self, id: &TaskId) -> bool {
        self.queue.contains(id) || self.running.contains_key(id) || self.finished.contains_key(id)
    }

    fn is_quiescent(&self) -> bool {
        self.queue.is_empty() && self.running.is_empty()
    }

    /// Dispatched tasks waiting for rate-limit permits.
    fn throttled(&self) -> usize {
        self.running.values().filter(|t| t.state != TaskState::Running).count()
    }

    /// `(pending, running)` by task state.
    fn depth(&self) -> (usize, usize) {
        let throttled = self.throttled();
        (self.queue.len() + throttled, self.running.len() - throttled)
    }
}

pub(crate) struct Shared<E: Executor> {
    pub(crate) config: SchedulerConfig,
    inner: Mutex<Inner<Payload<E>, Output<E>>>,
    /// Wakes idle workers when work is pushed.
    pub(crate) work: Notify,
    /// Fires whenever a task finalizes.
    idle: Notify,
    pub(crate) limiter: Arc<RateLimiter>,
    pub(crate) partitions: Option<PartitionedRateLimiter>,
    retry: RetryPolicy,
    pub(crate) classifier: Arc<dyn ErrorClassifier>,
    pub(crate) executor: Arc<E>,
    pub(crate) shutdown: ShutdownCoordinator,
    /// Cancelled when draining begins. Idle workers exit and workers still
    /// waiting on the rate limiter hand their task back.
    pub(crate) stop: CancellationToken,
    defaults: TaskDefaults,
    anchor: ClockAnchor,
    store: Option<Arc<dyn CheckpointStore<Payload<E>>>>,
}

impl<E: Executor> Shared<E> {
    pub(crate) fn next_dispatch(&self, now: Instant) -> Dispatch<Payload<E>> {
        let mut inner = self.inner.lock();
        let Some(guard) = self.shutdown.track() else {
            return Dispatch::Stop;
        };
        match inner.queue.pop_ready(now) {
            PopResult::Ready(task) => {
                inner.running.insert(task.id.clone(), task.clone());
                let (pending, running) = inner.depth();
                metrics::record_queue_depth(pending, running);
                Dispatch::Run(task, guard)
            }
            PopResult::NotReady { retry_after } => Dispatch::Wait(Some(retry_after)),
            PopResult::Empty => Dispatch::Wait(None),
        }
    }

    /// Put a dispatched task back untouched. Used when draining starts while
    /// the task still waits for rate-limit permits.
    pub(crate) fn requeue_unstarted(&self, task: Task<Payload<E>>) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.running.remove(&task.id);
        if task.is_cancel_requested() {
            self.finalize(&mut inner, task, TaskState::Cancelled, None, now);
        } else {
            debug!(task_id = %task.id, "scheduler: returning undispatched task to queue");
            self.push_or_fail(&mut inner, task, now, true);
        }
        drop(inner);
        self.idle.notify_waiters();
    }

    /// Flip a dispatched task to RUNNING. Returns `None` if it was cancelled
    /// while waiting for permits; it is finalized in that case.
    pub(crate) fn begin_attempt(&self, mut task: Task<Payload<E>>) -> Option<Task<Payload<E>>> {
        let mut inner = self.inner.lock();
        if task.is_cancel_requested() {
            inner.running.remove(&task.id);
            self.finalize(&mut inner, task, TaskState::Cancelled, None, Instant::now());
            drop(inner);
            self.idle.notify_waiters();
            return None;
        }
        task.state = TaskState::Running;
        if let Some(entry) = inner.running.get_mut(&task.id) {
            entry.state = TaskState::Running;
        }
        let (pending, running) = inner.depth();
        metrics::record_queue_depth(pending, running);
        Some(task)
    }

    /// Record the classified outcome of one attempt: finalize, or schedule a
    /// retry.
    pub(crate) fn complete(
        &self,
        mut task: Task<Payload<E>>,
        outcome: Result<Output<E>, ClassifiedError>,
        latency: Duration,
    ) {
        let now = Instant::now();
        metrics::record_attempt_latency(latency);

        let mut inner = self.inner.lock();
        inner.running.remove(&task.id);
        task.attempt += 1;

        let attempt_outcome = match &outcome {
            Ok(_) => AttemptOutcome::Success,
            Err(e) if e.kind == ErrorKind::Timeout => AttemptOutcome::Timeout,
            Err(e) if e.kind == ErrorKind::Panicked => AttemptOutcome::Panic,
            Err(_) => AttemptOutcome::Failure,
        };
        inner.stats.record_attempt(attempt_outcome, latency, now);

        let mut requeued = false;
        match outcome {
            Ok(output) => {
                task.last_error = None;
                self.finalize(&mut inner, task, TaskState::Succeeded, Some(output), now);
            }
            Err(error) if task.attempt > task.max_attempts => {
                error!(
                    task_id = %task.id,
                    attempt = task.attempt,
                    max_attempts = task.max_attempts,
                    "scheduler: attempt count exceeded its limit"
                );
                task.last_error = Some(ClassifiedError::terminal(
                    ErrorKind::Internal,
                    format!("attempt {} exceeds max_attempts {} ({error})", task.attempt, task.max_attempts),
                ));
                self.finalize(&mut inner, task, TaskState::Failed, None, now);
            }
            Err(error) => {
                let retry = RetryPolicy::should_retry(error.retryable, task.attempt, task.max_attempts);
                let kind = error.kind;
                task.last_error = Some(error);
                if task.is_cancel_requested() {
                    self.finalize(&mut inner, task, TaskState::Cancelled, None, now);
                } else if retry {
                    let delay = self.retry.next_delay(task.attempt);
                    debug!(
                        task_id = %task.id,
                        attempt = task.attempt,
                        kind = %kind,
                        delay_ms = delay.as_millis() as u64,
                        "scheduler: retrying task"
                    );
                    task.not_before = now + delay;
                    task.state = TaskState::Pending;
                    inner.stats.record_retry();
                    metrics::record_retry(kind);
                    requeued = self.push_or_fail(&mut inner, task, now, false);
                } else {
                    self.finalize(&mut inner, task, TaskState::Failed, None, now);
                }
            }
        }
        drop(inner);

        if requeued {
            self.work.notify_one();
        }
        self.idle.notify_waiters();
    }

    /// Queue `task`. With `keep_position` an unstarted task keeps its
    /// original insertion order.
    fn push_or_fail(
        &self,
        inner: &mut Inner<Payload<E>, Output<E>>,
        task: Task<Payload<E>>,
        now: Instant,
        keep_position: bool,
    ) -> bool {
        let pushed = if keep_position { inner.queue.requeue(task) } else { inner.queue.push(task) };
        match pushed {
            Ok(()) => true,
            Err(mut task) => {
                error!(task_id = %task.id, "scheduler: task id already queued, failing duplicate");
                task.last_error = Some(ClassifiedError::terminal(
                    ErrorKind::Internal,
                    "task id collided while re-queueing",
                ));
                self.finalize(inner, task, TaskState::Failed, None, now);
                false
            }
        }
    }

    fn finalize(
        &self,
        inner: &mut Inner<Payload<E>, Output<E>>,
        mut task: Task<Payload<E>>,
        state: TaskState,
        result: Option<Output<E>>,
        now: Instant,
    ) {
        task.state = state;
        let outcome = match state {
            TaskState::Succeeded => {
                inner.stats.record_succeeded();
                debug!(task_id = %task.id, attempts = task.attempt, "scheduler: task succeeded");
                "succeeded"
            }
            TaskState::Cancelled => {
                inner.stats.record_cancelled();
                info!(task_id = %task.id, attempts = task.attempt, "scheduler: task cancelled");
                "cancelled"
            }
            _ => {
                inner.stats.record_failed();
                warn!(
                    task_id = %task.id,
                    attempts = task.attempt,
                    error = %task.last_error.as_ref().map_or_else(String::new, ToString::to_string),
                    "scheduler: task failed"
                );
                "failed"
            }
        };
        metrics::record_task_finished(outcome);
        let record = TaskRecord::finalize(task, state, result, now);
        inner.finished.insert(record.id.clone(), Arc::new(record));
    }

    pub(crate) fn stats(&self) -> SchedulerStats {
        let now = Instant::now();
        let rate = self.limiter.rate();
        let mut inner = self.inner.lock();
        let (pending, running) = inner.depth();
        let throttled = inner.throttled();
        let delayed = inner.queue.delayed_len(now);
        let mut stats = inner.stats.snapshot(now, pending, delayed, running, rate);
        stats.throttled = throttled;
        stats
    }

    pub(crate) fn snapshot(&self) -> Checkpoint<Payload<E>> {
        let inner = self.inner.lock();
        let mut pending = inner.queue.tasks();
        let mut running = Vec::new();
        for task in inner.running.values() {
            if task.state == TaskState::Running {
                running.push(task);
            } else {
                pending.push(task);
            }
        }
        pending.sort_by_key(|t| (t.priority, t.not_before, t.sequence));
        running.sort_by(|a, b| a.id.cmp(&b.id));
        let records: Vec<_> = pending
            .into_iter()
            .map(|t| record_from_task(t, &self.anchor, false))
            .chain(running.into_iter().map(|t| record_from_task(t, &self.anchor, true)))
            .collect();
        drop(inner);

        Checkpoint { version: CHECKPOINT_VERSION, taken_at: Utc::now(), records }
    }

    pub(crate) fn checkpoint_now(&self) -> Result<usize, CheckpointError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let checkpoint = self.snapshot();
        store.save(&checkpoint)?;
        Ok(checkpoint.len())
    }
}

/// Builds a [`Scheduler`].
pub struct SchedulerBuilder<E: Executor> {
    config: SchedulerConfig,
    executor: Arc<E>,
    classifier: Option<Arc<dyn ErrorClassifier>>,
    store: Option<Arc<dyn CheckpointStore<Payload<E>>>>,
}

impl<E: Executor> SchedulerBuilder<E> {
    /// Classifier for executor failures. Defaults to [`DeclaredClassifier`].
    pub fn classifier(mut self, classifier: impl ErrorClassifier + 'static) -> Self {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    /// Store used for periodic and shutdown checkpoints.
    pub fn checkpoint_store(mut self, store: impl CheckpointStore<Payload<E>> + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Validate the configuration and build an idle scheduler. Tasks may be
    /// submitted before [`Scheduler::start`].
    pub fn build(self) -> Result<Scheduler<E>, ConfigError> {
        let config = self.config;
        config.validate()?;

        let limiter = RateLimiter::new(config.rate, config.burst_capacity)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let partitions = config
            .partition_rate
            .map(|rate| PartitionedRateLimiter::new(rate, config.partition_burst))
            .transpose()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let shared = Shared {
            inner: Mutex::new(Inner {
                queue: ReadyQueue::new(),
                running: HashMap::new(),
                finished: HashMap::new(),
                stats: StatsTracker::new(config.stats_window()),
            }),
            work: Notify::new(),
            idle: Notify::new(),
            limiter: Arc::new(limiter),
            partitions,
            retry: RetryPolicy::from_config(&config.retry),
            classifier: self.classifier.unwrap_or_else(|| Arc::new(DeclaredClassifier)),
            executor: self.executor,
            shutdown: ShutdownCoordinator::new(),
            stop: CancellationToken::new(),
            defaults: config.task_defaults(),
            anchor: ClockAnchor::now(),
            store: self.store,
            config,
        };

        Ok(Scheduler {
            shared: Arc::new(shared),
            workers: Mutex::new(Vec::new()),
            background: Mutex::new(Vec::new()),
        })
    }

    /// Build and start. Must be called inside a Tokio runtime.
    pub fn start(self) -> Result<Scheduler<E>, ConfigError> {
        let scheduler = self.build()?;
        scheduler.start();
        Ok(scheduler)
    }
}

/// Task scheduler: a ready queue drained by a fixed worker pool under a
/// global rate limit, with retries, cancellation, checkpoints, and graceful
/// shutdown.
pub struct Scheduler<E: Executor> {
    shared: Arc<Shared<E>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl<E: Executor> Scheduler<E> {
    pub fn builder(config: SchedulerConfig, executor: E) -> SchedulerBuilder<E> {
        SchedulerBuilder { config, executor: Arc::new(executor), classifier: None, store: None }
    }

    /// Spawn the worker pool and background loops. No-op if already started
    /// or shutting down.
    pub fn start(&self) {
        let mut workers = self.workers.lock();
        if !workers.is_empty() || !self.shared.shutdown.is_accepting() {
            return;
        }
        *workers = worker::spawn_workers(&self.shared);

        let mut background = self.background.lock();
        if let (Some(interval), Some(_)) = (self.shared.config.checkpoint_interval(), &self.shared.store) {
            background.push(spawn_checkpoint_loop(Arc::clone(&self.shared), interval));
        }
        if self.shared.config.adaptive.enabled {
            background.push(adaptive::spawn_controller(Arc::clone(&self.shared)));
        }
        metrics::record_rate(self.shared.limiter.rate());

        info!(
            workers = workers.len(),
            rate = self.shared.config.rate,
            burst = self.shared.config.burst_capacity,
            "scheduler: started"
        );
    }

    /// Enqueue a task.
    pub fn submit(&self, spec: TaskSpec<Payload<E>>) -> Result<TaskId, SubmitError> {
        let now = Instant::now();
        let task = Task::from_spec(spec, &self.shared.defaults, now)?;
        let id = task.id.clone();
        {
            let mut inner = self.shared.inner.lock();
            let state = self.shared.shutdown.state();
            if state != ShutdownState::Accepting {
                return Err(SubmitError::NotAccepting(state));
            }
            if inner.knows(&id) {
                return Err(SubmitError::DuplicateId(id));
            }
            inner.queue.push(task).map_err(|t| SubmitError::DuplicateId(t.id))?;
            inner.stats.record_submitted();
        }
        self.shared.work.notify_one();
        debug!(task_id = %id, "scheduler: task submitted");
        Ok(id)
    }

    /// Submit several tasks; each succeeds or fails independently.
    pub fn submit_many(
        &self,
        specs: impl IntoIterator<Item = TaskSpec<Payload<E>>>,
    ) -> Vec<Result<TaskId, SubmitError>> {
        specs.into_iter().map(|spec| self.submit(spec)).collect()
    }

    /// Cancel a task. Pending tasks are removed and recorded as `CANCELLED`.
    /// Running tasks only get their cancel token triggered; the executor
    /// decides whether to stop.
    pub fn cancel(&self, id: &TaskId) -> CancelOutcome {
        let mut inner = self.shared.inner.lock();
        if let Some(task) = inner.queue.remove(id) {
            task.cancel.cancel();
            self.shared.finalize(&mut inner, task, TaskState::Cancelled, None, Instant::now());
            drop(inner);
            self.shared.idle.notify_waiters();
            return CancelOutcome::Removed;
        }
        if let Some(task) = inner.running.get(id) {
            task.cancel.cancel();
            debug!(task_id = %id, "scheduler: cancellation signalled to running task");
            return CancelOutcome::Signalled;
        }
        CancelOutcome::NotFound
    }

    /// Wait until no task is pending or running. Returns immediately once the
    /// scheduler has stopped. Does not return while tasks are queued on a
    /// scheduler that was never started.
    pub async fn drain(&self) {
        loop {
            let notified = self.shared.idle.notified();
            {
                let inner = self.shared.inner.lock();
                if inner.is_quiescent() || self.shared.shutdown.state() == ShutdownState::Stopped {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Wait for a task to reach a terminal state. `None` if the id is unknown
    /// or its record was already taken.
    pub async fn wait_for(&self, id: &TaskId) -> Option<Arc<TaskRecord<Payload<E>, Output<E>>>> {
        loop {
            let notified = self.shared.idle.notified();
            {
                let inner = self.shared.inner.lock();
                if let Some(record) = inner.finished.get(id) {
                    return Some(Arc::clone(record));
                }
                if !inner.knows(id) || self.shared.shutdown.state() == ShutdownState::Stopped {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Finalized record for `id`, if available.
    pub fn record(&self, id: &TaskId) -> Option<Arc<TaskRecord<Payload<E>, Output<E>>>> {
        self.shared.inner.lock().finished.get(id).cloned()
    }

    /// Remove and return all finalized records.
    pub fn take_finished(&self) -> Vec<Arc<TaskRecord<Payload<E>, Output<E>>>> {
        let mut inner = self.shared.inner.lock();
        inner.finished.drain().map(|(_, record)| record).collect()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.shared.stats()
    }

    pub fn state(&self) -> ShutdownState {
        self.shared.shutdown.state()
    }

    /// The global limiter, e.g. for manual rate changes.
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.shared.limiter
    }

    /// Every non-terminal task: pending ones (including those waiting for
    /// rate-limit permits) in dispatch order, then in-flight ones by id with
    /// their pre-attempt state.
    pub fn snapshot(&self) -> Checkpoint<Payload<E>> {
        self.shared.snapshot()
    }

    /// Save a checkpoint now. Returns the number of records written; no-op
    /// without a store.
    pub fn checkpoint_now(&self) -> Result<usize, CheckpointError> {
        self.shared.checkpoint_now()
    }

    /// Re-submit the tasks of a checkpoint, preserving attempt counts and
    /// readiness. Tasks already known are skipped. Returns how many were
    /// restored.
    pub fn restore(&self, checkpoint: Checkpoint<Payload<E>>) -> Result<usize, CheckpointError> {
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::Unsupported {
                found: checkpoint.version,
                expected: CHECKPOINT_VERSION,
            });
        }
        let mut restored = 0;
        for record in checkpoint.records {
            match self.submit(record.into_spec(&self.shared.anchor)) {
                Ok(_) => restored += 1,
                Err(SubmitError::DuplicateId(id)) => {
                    warn!(task_id = %id, "checkpoint: task already scheduled, skipping");
                }
                Err(e) => return Err(e.into()),
            }
        }
        info!(restored, "checkpoint: restored tasks");
        Ok(restored)
    }

    /// Load the latest checkpoint from the configured store and restore it.
    pub fn restore_from_store(&self) -> Result<usize, CheckpointError> {
        let Some(store) = &self.shared.store else {
            return Ok(0);
        };
        match store.load()? {
            Some(checkpoint) => self.restore(checkpoint),
            None => Ok(0),
        }
    }

    /// Graceful shutdown with the configured timeout.
    pub async fn request_shutdown(&self) -> ShutdownReport {
        self.shutdown_with_timeout(self.shared.config.shutdown_timeout()).await
    }

    /// Stop accepting work, let running attempts finish within `timeout`,
    /// abandon whatever is still running after that, and write a final
    /// checkpoint of the pending tasks.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> ShutdownReport {
        let began = {
            let _inner = self.shared.inner.lock();
            self.shared.shutdown.begin_drain()
        };
        if began {
            info!(timeout_ms = timeout.as_millis() as u64, "scheduler: draining");
        }
        self.shared.stop.cancel();
        self.shared.work.notify_waiters();

        let result = self.shared.shutdown.wait_for_drain(timeout).await;
        let workers = std::mem::take(&mut *self.workers.lock());
        let background = std::mem::take(&mut *self.background.lock());

        if let ShutdownResult::Timeout { remaining } = result {
            warn!(remaining, "scheduler: shutdown timed out, abandoning running tasks");
            for handle in &workers {
                handle.abort();
            }
        }
        for handle in workers.into_iter().chain(background) {
            let _ = handle.await;
        }

        let abandoned = self.abandon_running();
        let pending = self.shared.inner.lock().queue.len();
        let checkpoint = self.shared.store.as_ref().map(|_| self.shared.checkpoint_now());
        if let Some(Err(e)) = &checkpoint {
            error!(error = %e, "scheduler: final checkpoint failed");
        }

        self.shared.shutdown.finish();
        self.shared.idle.notify_waiters();
        info!(pending, abandoned = abandoned.len(), "scheduler: stopped");

        ShutdownReport { result, abandoned, pending, checkpoint }
    }

    fn abandon_running(&self) -> Vec<TaskId> {
        let now = Instant::now();
        let mut inner = self.shared.inner.lock();
        let mut running: Vec<_> = inner.running.drain().map(|(_, task)| task).collect();
        running.sort_by(|a, b| a.id.cmp(&b.id));

        let mut abandoned = Vec::with_capacity(running.len());
        for mut task in running {
            task.cancel.cancel();
            task.last_error = Some(ClassifiedError::terminal(
                ErrorKind::ShutdownTimeout,
                "still running when the shutdown deadline passed",
            ));
            abandoned.push(task.id.clone());
            self.shared.finalize(&mut inner, task, TaskState::Failed, None, now);
        }
        abandoned
    }
}

impl<E: Executor> Drop for Scheduler<E> {
    fn drop(&mut self) {
        self.shared.stop.cancel();
    }
}

fn spawn_checkpoint_loop<E: Executor>(shared: Arc<Shared<E>>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                () = shared.stop.cancelled() => break,
                () = tokio::time::sleep(interval) => {
                    match shared.checkpoint_now() {
                        Ok(count) => debug!(tasks = count, "checkpoint: periodic save"),
                        Err(e) => warn!(error = %e, "checkpoint: periodic save failed"),
                    }
                }
            }
        }
    })
}
