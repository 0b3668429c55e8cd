//! Failure taxonomy for scheduled tasks.
//!
//! Executors return raw [`ExecError`]s; an [`ErrorClassifier`] turns each one
//! into a [`ClassifiedError`] that decides between retry and finalization.
//! Nothing in this module unwinds: every failure is a value.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::task::TaskId;
use crate::shutdown::ShutdownState;

/// Normalized failure kind attached to finalized tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    RateLimited,
    Timeout,
    ServerError,
    ConnectionReset,
    AuthRequired,
    MalformedPayload,
    Terminal,
    Panicked,
    ShutdownTimeout,
    Internal,
    Other,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "RATE_LIMITED",
            Self::Timeout => "TIMEOUT",
            Self::ServerError => "SERVER_ERROR",
            Self::ConnectionReset => "CONNECTION_RESET",
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::MalformedPayload => "MALFORMED_PAYLOAD",
            Self::Terminal => "TERMINAL",
            Self::Panicked => "PANICKED",
            Self::ShutdownTimeout => "SHUTDOWN_TIMEOUT",
            Self::Internal => "INTERNAL",
            Self::Other => "OTHER",
        }
    }

    /// Whether a failure of this kind is worth another attempt when the
    /// executor did not say otherwise.
    pub fn default_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimited
                | Self::Timeout
                | Self::ServerError
                | Self::ConnectionReset
                | Self::Panicked
                | Self::Other
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw failure reported by an executor for one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ExecError {
    pub message: String,
    /// Protocol status code, when the transport produced one.
    pub status: Option<u16>,
    /// Kind declared by the executor, if it already knows.
    pub kind: Option<ErrorKind>,
    pub retryable: bool,
}

impl ExecError {
    /// A transient failure; the task may be retried.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self { message: message.into(), status: None, kind: None, retryable: true }
    }

    /// A failure that must not be retried.
    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            kind: Some(ErrorKind::Terminal),
            retryable: false,
        }
    }

    /// A failure carrying a response status. 408, 429 and 5xx are declared
    /// retryable; everything else is not.
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        let retryable = code == 408 || code == 429 || (500..600).contains(&code);
        Self { message: message.into(), status: Some(code), kind: None, retryable }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            kind: Some(ErrorKind::Timeout),
            retryable: true,
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            kind: Some(ErrorKind::ConnectionReset),
            retryable: true,
        }
    }

    pub(crate) fn panicked(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            kind: Some(ErrorKind::Panicked),
            retryable: true,
        }
    }

    /// Override the declared kind.
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// A failure after classification: what went wrong and whether to retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self { kind, message: message.into(), retryable }
    }

    pub fn terminal(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, false)
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Decides whether a raw executor failure is retryable.
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, error: &ExecError) -> ClassifiedError;
}

impl<F> ErrorClassifier for F
where
    F: Fn(&ExecError) -> ClassifiedError + Send + Sync,
{
    fn classify(&self, error: &ExecError) -> ClassifiedError {
        self(error)
    }
}

/// Classifier used when none is configured. Trusts what the executor
/// declared; undeclared kinds become `OTHER` (retryable) or `TERMINAL`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredClassifier;

impl ErrorClassifier for DeclaredClassifier {
    fn classify(&self, error: &ExecError) -> ClassifiedError {
        let kind = error.kind.unwrap_or(if error.retryable {
            ErrorKind::Other
        } else {
            ErrorKind::Terminal
        });
        ClassifiedError::new(kind, error.message.clone(), error.retryable)
    }
}

/// Status-code aware classifier for HTTP-like transports.
///
/// The status decides both kind and retryability; failures without a status
/// fall back to [`DeclaredClassifier`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusClassifier;

impl ErrorClassifier for StatusClassifier {
    fn classify(&self, error: &ExecError) -> ClassifiedError {
        let Some(code) = error.status else {
            return DeclaredClassifier.classify(error);
        };
        let kind = match code {
            429 => ErrorKind::RateLimited,
            408 => ErrorKind::Timeout,
            500..=599 => ErrorKind::ServerError,
            401 | 403 | 407 => ErrorKind::AuthRequired,
            400 | 404 | 410 | 422 => ErrorKind::MalformedPayload,
            400..=499 => ErrorKind::Terminal,
            _ => return DeclaredClassifier.classify(error),
        };
        let message = format!("status {code}: {}", error.message);
        ClassifiedError::new(kind, message, kind.default_retryable())
    }
}

/// Errors returned by [`crate::scheduler::Scheduler::submit`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("scheduler is not accepting submissions (state: {0:?})")]
    NotAccepting(ShutdownState),

    #[error("task {0} is already known to the scheduler")]
    DuplicateId(TaskId),

    #[error("invalid task: {0}")]
    InvalidTask(String),
}

/// Errors from checkpoint persistence.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint encoding failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("unsupported checkpoint version {found} (expected {expected})")]
    Unsupported { found: u32, expected: u32 },

    #[error("checkpoint restore rejected a task: {0}")]
    Restore(#[from] SubmitError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_constructor_declares_retryability() {
        assert!(ExecError::status(503, "unavailable").retryable);
        assert!(ExecError::status(429, "slow down").retryable);
        assert!(!ExecError::status(404, "gone").retryable);
    }

    #[test]
    fn declared_classifier_trusts_executor() {
        let c = DeclaredClassifier.classify(&ExecError::retryable("reset"));
        assert_eq!(c.kind, ErrorKind::Other);
        assert!(c.retryable);

        let c = DeclaredClassifier.classify(&ExecError::terminal("bad payload"));
        assert_eq!(c.kind, ErrorKind::Terminal);
        assert!(!c.retryable);

        let c = DeclaredClassifier.classify(&ExecError::timeout("slow"));
        assert_eq!(c.kind, ErrorKind::Timeout);
        assert!(c.retryable);
    }

    #[test]
    fn status_classifier_maps_codes() {
        let cases = [
            (429, ErrorKind::RateLimited, true),
            (503, ErrorKind::ServerError, true),
            (408, ErrorKind::Timeout, true),
            (401, ErrorKind::AuthRequired, false),
            (422, ErrorKind::MalformedPayload, false),
            (418, ErrorKind::Terminal, false),
        ];
        for (code, kind, retryable) in cases {
            let c = StatusClassifier.classify(&ExecError::status(code, "x"));
            assert_eq!(c.kind, kind, "status {code}");
            assert_eq!(c.retryable, retryable, "status {code}");
        }
    }

    #[test]
    fn status_classifier_overrides_declared_flag() {
        // A 403 is terminal even if the executor guessed otherwise.
        let mut err = ExecError::status(403, "forbidden");
        err.retryable = true;
        assert!(!StatusClassifier.classify(&err).retryable);
    }

    #[test]
    fn closures_are_classifiers() {
        let never_retry = |e: &ExecError| ClassifiedError::terminal(ErrorKind::Terminal, e.message.clone());
        let c = never_retry.classify(&ExecError::retryable("x"));
        assert!(!c.retryable);
    }

    #[test]
    fn kind_display_is_screaming_snake() {
        assert_eq!(ErrorKind::ShutdownTimeout.to_string(), "SHUTDOWN_TIMEOUT");
        let json = serde_json::to_string(&ErrorKind::RateLimited).unwrap();
        assert_eq!(json, "\"RATE_LIMITED\"");
    }
}
