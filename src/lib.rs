//! Crawl CORE
//!
//! Task scheduling and rate limiting for fetch workloads. Callers submit
//! tasks carrying an opaque payload; a fixed pool of workers hands each task
//! to a pluggable [`Executor`](scheduler::Executor) while a global token
//! bucket bounds the dispatch rate.
//!
//! # Guarantees
//!
//! - Dispatch order: lowest priority value first, FIFO among equals, never
//!   before a task's `not_before`.
//! - At most `worker_count` executor calls in flight.
//! - Failures are classified; retryable ones back off exponentially with
//!   jitter until `max_attempts` is reached.
//! - Every submitted task reaches exactly one terminal state, or remains
//!   pending in the checkpoint written at shutdown.
//!
//! ```no_run
//! use std::sync::Arc;
//! use crawl_core::scheduler::{executor_fn, ExecContext, ExecError, Scheduler, SchedulerConfig, TaskSpec};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let fetch = executor_fn(|url: Arc<String>, _ctx: ExecContext| async move {
//!     Ok::<_, ExecError>(url.len())
//! });
//! let scheduler = Scheduler::builder(SchedulerConfig::default(), fetch).start()?;
//! let id = scheduler.submit(TaskSpec::new("https://example.org/".to_string()))?;
//! let record = scheduler.wait_for(&id).await;
//! assert!(record.is_some_and(|r| r.is_success()));
//! scheduler.request_shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod scheduler;
pub mod shutdown;
pub mod telemetry;

pub use config::EffectiveConfig;
pub use scheduler::{
    Scheduler, SchedulerBuilder, SchedulerConfig, SchedulerStats, TaskId, TaskRecord, TaskSpec,
    TaskState,
};
pub use shutdown::{ShutdownCoordinator, ShutdownResult, ShutdownState};
