//! Tests for utility functions

use prometheus_task_engine::util::{duration_to_nanos, join_with_timeout, monotonic_nanos, now_ms};
use std::thread;
use std::time::Duration;

#[test]
fn test_monotonic_nanos_advances() {
    let first = monotonic_nanos();
    thread::sleep(Duration::from_millis(2));
    let second = monotonic_nanos();
    assert!(second >= first + 2_000_000);
}

#[test]
fn test_now_ms_is_wall_clock() {
    // 2020-01-01T00:00:00Z
    assert!(now_ms() > 1_577_836_800_000);
}

#[test]
fn test_duration_to_nanos_saturates() {
    assert_eq!(duration_to_nanos(Duration::from_micros(3)), 3_000);
    assert_eq!(duration_to_nanos(Duration::MAX), u64::MAX);
}

#[test]
fn test_join_with_timeout() {
    let quick = thread::spawn(|| {});
    assert!(join_with_timeout(quick, Duration::from_secs(1), "quick"));

    let slow = thread::spawn(|| thread::sleep(Duration::from_millis(300)));
    assert!(!join_with_timeout(slow, Duration::from_millis(10), "slow"));
}

#[test]
fn test_init_tracing_is_idempotent() {
    prometheus_task_engine::util::init_tracing();
    assert!(!prometheus_task_engine::util::init_tracing_with("debug"));
    tracing::info!(target: "prometheus_task_engine", "tracing installed");
}
