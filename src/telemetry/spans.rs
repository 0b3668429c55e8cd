//! Span utilities for task tracing.

use tracing::{info_span, Span};

/// Extension trait for recording outcomes into a span.
pub trait SpanExt {
    /// Record `status` and, on failure, `error.message`.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for per-attempt spans.
pub struct TaskSpan;

impl TaskSpan {
    /// Span covering one executor attempt.
    ///
    /// `status`, `error.message`, `error.kind` and `latency_ms` start empty
    /// and are filled in when the attempt completes.
    pub fn new(task_id: &str, attempt: u32, max_attempts: u32) -> Span {
        info_span!(
            "task_attempt",
            task_id = %task_id,
            attempt,
            max_attempts,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            error.kind = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    }
}
