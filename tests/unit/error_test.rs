//! Tests for error types

use prometheus_task_engine::core::{EngineError, FailureKind, TaskFailure};
use std::time::Duration;

#[test]
fn test_closed_error() {
    let err = EngineError::Closed("worker pool");
    assert_eq!(format!("{}", err), "worker pool has been closed");
    assert_eq!(err.as_label(), "closed");
}

#[test]
fn test_invalid_config_error() {
    let err = EngineError::InvalidConfig("worker_count must be at least 2".to_string());
    assert_eq!(
        format!("{}", err),
        "invalid configuration: worker_count must be at least 2"
    );
    assert_eq!(err.as_label(), "invalid_config");
}

#[test]
fn test_timeout_error() {
    let err = EngineError::Timeout(Duration::from_millis(250));
    assert_eq!(format!("{}", err), "timed out after 250ms waiting for task result");
}

#[test]
fn test_result_unavailable_error() {
    let err = EngineError::ResultUnavailable;
    assert_eq!(format!("{}", err), "task result unavailable");
    assert_eq!(err.as_label(), "result_unavailable");
}

#[test]
fn test_execution_error_exposes_failure() {
    let failure = TaskFailure::from_error(anyhow::anyhow!("disk full"), false);
    let err = EngineError::Execution(failure);
    assert_eq!(format!("{}", err), "task execution failed: disk full");

    let source = std::error::Error::source(&err).expect("failure is the source");
    assert_eq!(source.to_string(), "disk full");
}

#[test]
fn test_full_trace_keeps_context_chain() {
    let err = anyhow::anyhow!("connection reset").context("loading shard 3");
    let failure = TaskFailure::from_error(err, true);
    assert_eq!(failure.kind(), FailureKind::Error);
    assert_eq!(failure.message(), "loading shard 3");
    assert!(failure.trace().unwrap().contains("connection reset"));

    let quiet = TaskFailure::from_error(anyhow::anyhow!("x"), false);
    assert!(quiet.trace().is_none());
}

#[test]
fn test_panic_failure_display() {
    let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bad state"));
    let failure = TaskFailure::from_panic(payload.as_ref());
    assert_eq!(failure.kind(), FailureKind::Panic);
    assert_eq!(format!("{}", failure), "panicked: bad state");
    assert!(failure.cause().is_none());
}
