//! Error types for engine operations.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Errors that cross the engine boundary.
///
/// Only configuration problems, use-after-close and result waits surface
/// here. Failures inside submitted work are recorded on the task as a
/// [`TaskFailure`] and only reach the caller through [`EngineError::Execution`]
/// when a result is requested through a future handle.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The component has been closed and accepts no more work.
    #[error("{0} has been closed")]
    Closed(&'static str),
    /// A result wait elapsed before the task finished.
    #[error("timed out after {0:?} waiting for task result")]
    Timeout(Duration),
    /// The task ran and failed.
    #[error("task execution failed: {0}")]
    Execution(#[source] TaskFailure),
    /// The result was already taken, never stored, or has another type.
    #[error("task result unavailable")]
    ResultUnavailable,
    /// An engine thread could not be spawned.
    #[error("failed to spawn thread `{name}`: {source}")]
    Spawn {
        /// Name of the thread that failed to start.
        name: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    /// Returns a short stable label for logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "invalid_config",
            Self::Closed(_) => "closed",
            Self::Timeout(_) => "timeout",
            Self::Execution(_) => "execution_failed",
            Self::ResultUnavailable => "result_unavailable",
            Self::Spawn { .. } => "spawn_failed",
        }
    }
}

/// Engine-facing result.
pub type EngineResult<T> = Result<T, EngineError>;

/// Application-facing result using anyhow, returned by executor code.
pub type AppResult<T> = Result<T, anyhow::Error>;

/// How a task failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The executor returned an error.
    Error,
    /// The executor panicked.
    Panic,
    /// The task never ran: its pool or scheduler closed while it was pending.
    Discarded,
}

/// An error captured onto a task while it executed.
#[derive(Clone)]
pub struct TaskFailure {
    kind: FailureKind,
    message: String,
    trace: Option<String>,
    cause: Option<Arc<anyhow::Error>>,
}

impl TaskFailure {
    /// Capture an error returned by an executor.
    ///
    /// With `full_trace` the anyhow debug rendering (cause chain and, when
    /// enabled, backtrace) is kept alongside the message.
    #[must_use]
    pub fn from_error(error: anyhow::Error, full_trace: bool) -> Self {
        Self {
            kind: FailureKind::Error,
            message: error.to_string(),
            trace: full_trace.then(|| format!("{error:?}")),
            cause: Some(Arc::new(error)),
        }
    }

    /// Capture a panic payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "task panicked".to_string());
        Self {
            kind: FailureKind::Panic,
            message,
            trace: None,
            cause: None,
        }
    }

    /// Record that `owner` dropped the task at close without running it.
    #[must_use]
    pub fn discarded(owner: &str) -> Self {
        Self {
            kind: FailureKind::Discarded,
            message: format!("discarded by {owner} on close"),
            trace: None,
            cause: None,
        }
    }

    /// How the task failed.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Top-level error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Full trace, if the task asked for one.
    #[must_use]
    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }

    /// The original error returned by the executor.
    #[must_use]
    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.cause.as_deref()
    }

    /// Find an error of type `E` anywhere in the cause chain.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.cause()?.chain().find_map(|e| e.downcast_ref::<E>())
    }
}

impl fmt::Debug for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFailure")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("trace", &self.trace.is_some())
            .finish()
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::Error => write!(f, "{}", self.message),
            FailureKind::Panic => write!(f, "panicked: {}", self.message),
            FailureKind::Discarded => write!(f, "never ran: {}", self.message),
        }
    }
}

impl std::error::Error for TaskFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause().map(|e| {
            let source: &(dyn std::error::Error + 'static) = e.as_ref();
            source
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug, Error)]
    #[error("division by zero")]
    struct DivideByZero;

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::Closed("worker pool");
        assert_eq!(format!("{}", err), "worker pool has been closed");

        let err = EngineError::InvalidConfig("worker_count must be at least 2".into());
        assert_eq!(
            format!("{}", err),
            "invalid configuration: worker_count must be at least 2"
        );
        assert_eq!(err.as_label(), "invalid_config");
    }

    #[test]
    fn test_failure_keeps_cause_chain() {
        let error = anyhow::Error::new(DivideByZero).context("computing ratio");
        let failure = TaskFailure::from_error(error, true);

        assert_eq!(failure.kind(), FailureKind::Error);
        assert_eq!(failure.message(), "computing ratio");
        assert!(failure.downcast_ref::<DivideByZero>().is_some());
        assert!(failure.trace().unwrap().contains("division by zero"));
        assert!(failure.source().is_some());
    }

    #[test]
    fn test_failure_without_trace() {
        let failure = TaskFailure::from_error(anyhow::anyhow!("boom"), false);
        assert!(failure.trace().is_none());
        assert_eq!(failure.to_string(), "boom");
    }

    #[test]
    fn test_failure_from_panic_payload() {
        let payload: Box<dyn Any + Send> = Box::new("bad state");
        let failure = TaskFailure::from_panic(payload.as_ref());
        assert_eq!(failure.kind(), FailureKind::Panic);
        assert_eq!(failure.to_string(), "panicked: bad state");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(TaskFailure::from_panic(payload.as_ref()).message(), "owned");
    }

    #[test]
    fn test_discarded_failure() {
        let failure = TaskFailure::discarded("worker pool `io`");
        assert_eq!(failure.kind(), FailureKind::Discarded);
        assert_eq!(failure.to_string(), "never ran: discarded by worker pool `io` on close");
        assert!(failure.cause().is_none());
    }
}
