//! Task scheduling for fetch workloads.
//!
//! Tasks enter a priority-ordered [`ReadyQueue`], are dispatched by a fixed
//! worker pool under a global token-bucket [`RateLimiter`], and are retried
//! with exponential backoff when an [`Executor`] reports a retryable failure.
//! The [`Scheduler`] ties these together and adds cancellation, stats,
//! checkpoints, and graceful shutdown.

mod adaptive;
mod checkpoint;
mod config;
mod error;
mod executor;
mod rate_limit;
mod ready_queue;
mod retry;
mod service;
mod stats;
mod task;
mod worker;

pub use adaptive::{next_rate, AdaptiveConfig};
pub use checkpoint::{
    Checkpoint, CheckpointRecord, CheckpointStore, ClockAnchor, JsonFileStore, MemoryStore,
    CHECKPOINT_VERSION,
};
pub use config::{ConfigError, SchedulerConfig, MAX_SHUTDOWN_TIMEOUT_SECS};
pub use error::{
    CheckpointError, ClassifiedError, DeclaredClassifier, ErrorClassifier, ErrorKind, ExecError,
    StatusClassifier, SubmitError,
};
pub use executor::{executor_fn, ExecContext, Executor, FnExecutor};
pub use rate_limit::{PartitionedRateLimiter, RateLimitError, RateLimiter};
pub use ready_queue::{PopResult, ReadyQueue};
pub use retry::{RetryConfig, RetryPolicy};
pub use service::{CancelOutcome, Scheduler, SchedulerBuilder, ShutdownReport};
pub use stats::SchedulerStats;
pub use task::{Priority, Task, TaskDefaults, TaskId, TaskRecord, TaskSpec, TaskState};
