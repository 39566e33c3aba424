//! Tests for configuration validation

use prometheus_task_engine::config::{EngineConfig, SchedulerConfig, WorkerPoolConfig};
use std::time::Duration;

#[test]
fn test_pool_config_defaults() {
    let cfg = WorkerPoolConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.high_mark(), cfg.queue_capacity);
    assert_eq!(cfg.low_mark(), cfg.queue_capacity * 3 / 4);
    assert_eq!(cfg.poll_interval(), Duration::from_millis(500));
}

#[test]
fn test_pool_config_invalid_capacity() {
    let invalid = WorkerPoolConfig::new().with_queue_capacity(1).with_worker_count(2);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_pool_config_invalid_worker_count() {
    let too_few = WorkerPoolConfig::new().with_queue_capacity(8).with_worker_count(1);
    assert!(too_few.validate().is_err());

    let too_many = WorkerPoolConfig::new().with_queue_capacity(8).with_worker_count(9);
    let err = too_many.validate().unwrap_err();
    assert!(err.contains("must not exceed"), "unexpected message: {err}");
}

#[test]
fn test_pool_config_invalid_watermarks() {
    let base = WorkerPoolConfig::new().with_queue_capacity(10).with_worker_count(2);
    assert!(base.clone().with_watermarks(8, 4).validate().is_ok());
    assert!(base.clone().with_watermarks(11, 4).validate().is_err());
    assert!(base.clone().with_watermarks(6, 6).validate().is_err());
    assert!(base.with_watermarks(0, 0).validate().is_err());
}

#[test]
fn test_pool_config_from_json() {
    let cfg: WorkerPoolConfig = serde_json::from_str(
        r#"{ "name": "io", "queue_capacity": 64, "worker_count": 8, "high_mark": 48 }"#,
    )
    .unwrap();
    assert_eq!(cfg.name, "io");
    assert_eq!(cfg.high_mark(), 48);
    assert_eq!(cfg.low_mark(), 48);
    assert!(cfg.validate().is_err(), "default low mark must sit below a lowered high mark");
}

#[test]
fn test_scheduler_config_validation() {
    assert!(SchedulerConfig::default().validate().is_ok());
    let zero_tick = SchedulerConfig::new().with_tick(Duration::ZERO);
    assert!(zero_tick.validate().is_err());
}

#[test]
fn test_engine_config_from_json() {
    let cfg = EngineConfig::from_json_str(r#"{ "queue_size": 128, "thread_count": 6 }"#).unwrap();
    assert_eq!(cfg.queue_size, 128);
    assert_eq!(cfg.worker_count(), 6);
    assert_eq!(cfg.tick_ms, 500);

    assert!(EngineConfig::from_json_str(r#"{ "queue_size": 4, "thread_count": 6 }"#).is_err());
    assert!(EngineConfig::from_json_str("not json").is_err());
}
