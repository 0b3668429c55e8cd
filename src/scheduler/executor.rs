//! The pluggable unit of work.
//!
//! The scheduler never performs network I/O itself. Each attempt of a task is
//! handed to an [`Executor`], which returns either an output or an
//! [`ExecError`] describing the failure.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::error::ExecError;
use super::task::TaskId;

/// Per-attempt context passed to the executor.
#[derive(Debug, Clone)]
pub struct ExecContext {
    pub task_id: TaskId,
    /// 1-based number of the attempt being made.
    pub attempt: u32,
    pub max_attempts: u32,
    /// Cancelled when the task is cancelled while running. Advisory: the
    /// executor decides whether and when to stop.
    pub cancel: CancellationToken,
}

#[async_trait]
pub trait Executor: Send + Sync + 'static {
    type Payload: Clone + Send + Sync + 'static;
    type Output: Send + Sync + 'static;

    async fn execute(
        &self,
        payload: Arc<Self::Payload>,
        ctx: ExecContext,
    ) -> Result<Self::Output, ExecError>;
}

/// Adapts an async closure into an [`Executor`].
pub struct FnExecutor<P, R, F> {
    func: F,
    _marker: PhantomData<fn(P) -> R>,
}

/// Build an executor from `Fn(Arc<P>, ExecContext) -> impl Future`.
pub fn executor_fn<P, R, F, Fut>(func: F) -> FnExecutor<P, R, F>
where
    F: Fn(Arc<P>, ExecContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, ExecError>> + Send + 'static,
{
    FnExecutor { func, _marker: PhantomData }
}

#[async_trait]
impl<P, R, F, Fut> Executor for FnExecutor<P, R, F>
where
    P: Clone + Send + Sync + 'static,
    R: Send + Sync + 'static,
    F: Fn(Arc<P>, ExecContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, ExecError>> + Send + 'static,
{
    type Payload = P;
    type Output = R;

    async fn execute(&self, payload: Arc<P>, ctx: ExecContext) -> Result<R, ExecError> {
        (self.func)(payload, ctx).await
    }
}
