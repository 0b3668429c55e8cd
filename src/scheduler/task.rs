//! Task data model: submission descriptors, live tasks, and finalized records.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::error::{ClassifiedError, SubmitError};

/// Unique task identifier. Callers may supply their own; otherwise a v4 UUID
/// is generated at submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Dispatch priority. Lower values are more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub i32);

impl Priority {
    pub const CRITICAL: Self = Self(0);
    pub const HIGH: Self = Self(10);
    pub const NORMAL: Self = Self(50);
    pub const LOW: Self = Self(100);
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// What a caller hands to [`crate::scheduler::Scheduler::submit`].
///
/// Unset fields take the scheduler defaults at submission time.
#[derive(Debug, Clone)]
pub struct TaskSpec<P> {
    pub payload: P,
    pub id: Option<TaskId>,
    pub priority: Priority,
    pub max_attempts: Option<u32>,
    pub timeout: Option<Duration>,
    /// Tokens consumed from the rate limiter per attempt.
    pub cost: u32,
    pub not_before: Option<Instant>,
    /// Attempts already made. Non-zero only when restoring a checkpoint.
    pub attempt: u32,
    /// Optional key for per-partition rate limiting (e.g. a host name).
    pub partition: Option<String>,
}

impl<P> TaskSpec<P> {
    pub fn new(payload: P) -> Self {
        Self {
            payload,
            id: None,
            priority: Priority::default(),
            max_attempts: None,
            timeout: None,
            cost: 1,
            not_before: None,
            attempt: 0,
            partition: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    pub fn not_before(mut self, at: Instant) -> Self {
        self.not_before = Some(at);
        self
    }

    /// Delay eligibility by `delay` from now.
    pub fn delayed(self, delay: Duration) -> Self {
        self.not_before(Instant::now() + delay)
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }
}

/// Scheduler-wide values applied to fields a [`TaskSpec`] leaves unset.
#[derive(Debug, Clone, Copy)]
pub struct TaskDefaults {
    pub max_attempts: u32,
    pub timeout: Option<Duration>,
}

impl Default for TaskDefaults {
    fn default() -> Self {
        Self { max_attempts: 3, timeout: None }
    }
}

/// A live task owned by the scheduler.
pub struct Task<P> {
    pub id: TaskId,
    pub payload: Arc<P>,
    pub priority: Priority,
    /// Completed attempts so far.
    pub attempt: u32,
    pub max_attempts: u32,
    pub not_before: Instant,
    pub state: TaskState,
    pub last_error: Option<ClassifiedError>,
    pub cost: u32,
    pub timeout: Option<Duration>,
    pub partition: Option<String>,
    pub submitted_at: Instant,
    /// Insertion order, assigned by the ready queue on every push.
    pub(crate) sequence: u64,
    pub(crate) cancel: CancellationToken,
}

impl<P> fmt::Debug for Task<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("attempt", &self.attempt)
            .field("max_attempts", &self.max_attempts)
            .field("state", &self.state)
            .field("cancelled", &self.is_cancel_requested())
            .finish()
    }
}

// Manual impl: cloning shares the payload and cancel token, so `P` needs no
// `Clone` bound.
impl<P> Clone for Task<P> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            payload: Arc::clone(&self.payload),
            priority: self.priority,
            attempt: self.attempt,
            max_attempts: self.max_attempts,
            not_before: self.not_before,
            state: self.state,
            last_error: self.last_error.clone(),
            cost: self.cost,
            timeout: self.timeout,
            partition: self.partition.clone(),
            submitted_at: self.submitted_at,
            sequence: self.sequence,
            cancel: self.cancel.clone(),
        }
    }
}

impl<P> Task<P> {
    /// Build a pending task from a submission, applying defaults.
    pub fn from_spec(
        spec: TaskSpec<P>,
        defaults: &TaskDefaults,
        now: Instant,
    ) -> Result<Self, SubmitError> {
        let max_attempts = spec.max_attempts.unwrap_or(defaults.max_attempts);
        if max_attempts == 0 {
            return Err(SubmitError::InvalidTask("max_attempts must be at least 1".into()));
        }
        if spec.cost == 0 {
            return Err(SubmitError::InvalidTask("cost must be at least 1".into()));
        }
        if spec.attempt >= max_attempts {
            return Err(SubmitError::InvalidTask(format!(
                "attempt {} leaves no attempts under max_attempts {}",
                spec.attempt, max_attempts
            )));
        }
        if spec.timeout.is_some_and(|t| t.is_zero()) {
            return Err(SubmitError::InvalidTask("timeout must be non-zero".into()));
        }

        Ok(Self {
            id: spec.id.unwrap_or_else(TaskId::generate),
            payload: Arc::new(spec.payload),
            priority: spec.priority,
            attempt: spec.attempt,
            max_attempts,
            not_before: spec.not_before.unwrap_or(now),
            state: TaskState::Pending,
            last_error: None,
            cost: spec.cost,
            timeout: spec.timeout.or(defaults.timeout),
            partition: spec.partition,
            submitted_at: now,
            sequence: 0,
            cancel: CancellationToken::new(),
        })
    }

    pub fn is_ready(&self, now: Instant) -> bool {
        self.state == TaskState::Pending && self.not_before <= now
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempt)
    }
}

/// Final view of a task once it leaves the scheduler.
pub struct TaskRecord<P, R> {
    pub id: TaskId,
    pub payload: Arc<P>,
    pub state: TaskState,
    pub attempts: u32,
    pub max_attempts: u32,
    pub priority: Priority,
    pub result: Option<R>,
    pub last_error: Option<ClassifiedError>,
    pub submitted_at: Instant,
    pub finished_at: Instant,
}

impl<P, R> fmt::Debug for TaskRecord<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRecord")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("attempts", &self.attempts)
            .field("has_result", &self.result.is_some())
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl<P, R> TaskRecord<P, R> {
    pub(crate) fn finalize(
        task: Task<P>,
        state: TaskState,
        result: Option<R>,
        now: Instant,
    ) -> Self {
        Self {
            id: task.id,
            payload: task.payload,
            state,
            attempts: task.attempt,
            max_attempts: task.max_attempts,
            priority: task.priority,
            result,
            last_error: task.last_error,
            submitted_at: task.submitted_at,
            finished_at: now,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == TaskState::Succeeded
    }

    /// Time from submission to finalization.
    pub fn latency(&self) -> Duration {
        self.finished_at.saturating_duration_since(self.submitted_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_defaults_apply() {
        let now = Instant::now();
        let defaults = TaskDefaults { max_attempts: 4, timeout: Some(Duration::from_secs(5)) };
        let task = Task::from_spec(TaskSpec::new("a"), &defaults, now).unwrap();

        assert_eq!(task.max_attempts, 4);
        assert_eq!(task.timeout, Some(Duration::from_secs(5)));
        assert_eq!(task.priority, Priority::NORMAL);
        assert_eq!(task.state, TaskState::Pending);
        assert_eq!(task.not_before, now);
        assert_eq!(task.attempt, 0);
        assert!(!task.id.as_str().is_empty());
    }

    #[test]
    fn explicit_fields_win() {
        let now = Instant::now();
        let spec = TaskSpec::new(1u32)
            .with_id("fetch-1")
            .with_priority(Priority::HIGH)
            .with_max_attempts(7)
            .with_cost(3)
            .with_partition("example.org");
        let task = Task::from_spec(spec, &TaskDefaults::default(), now).unwrap();

        assert_eq!(task.id, TaskId::from("fetch-1"));
        assert_eq!(task.priority, Priority::HIGH);
        assert_eq!(task.max_attempts, 7);
        assert_eq!(task.cost, 3);
        assert_eq!(task.partition.as_deref(), Some("example.org"));
    }

    #[test]
    fn invalid_specs_are_rejected() {
        let now = Instant::now();
        let d = TaskDefaults::default();
        assert!(Task::from_spec(TaskSpec::new(()).with_max_attempts(0), &d, now).is_err());
        assert!(Task::from_spec(TaskSpec::new(()).with_cost(0), &d, now).is_err());
        assert!(Task::from_spec(
            TaskSpec::new(()).with_max_attempts(2).with_attempt(2),
            &d,
            now
        )
        .is_err());
        assert!(Task::from_spec(TaskSpec::new(()).with_timeout(Duration::ZERO), &d, now).is_err());
    }

    #[test]
    fn ready_only_when_pending_and_due() {
        let now = Instant::now();
        let spec = TaskSpec::new(()).not_before(now + Duration::from_millis(10));
        let mut task = Task::from_spec(spec, &TaskDefaults::default(), now).unwrap();
        assert!(!task.is_ready(now));
        assert!(task.is_ready(now + Duration::from_millis(10)));

        task.state = TaskState::Running;
        assert!(!task.is_ready(now + Duration::from_secs(1)));
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(TaskId::generate(), TaskId::generate());
    }

    #[test]
    fn priority_orders_lower_first() {
        assert!(Priority::CRITICAL < Priority::HIGH);
        assert!(Priority::HIGH < Priority::NORMAL);
        assert!(Priority::NORMAL < Priority::LOW);
    }

    #[test]
    fn clone_shares_cancel_token() {
        let task = Task::from_spec(TaskSpec::new(()), &TaskDefaults::default(), Instant::now()).unwrap();
        let copy = task.clone();
        task.cancel.cancel();
        assert!(copy.is_cancel_requested());
    }

    #[test]
    fn terminal_states() {
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Succeeded.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
    }
}
