//! Tests for builder modules

use prometheus_task_engine::builders::EngineBuilder;
use prometheus_task_engine::config::EngineConfig;
use std::time::Duration;

#[test]
fn test_engine_builder_defaults() {
    let builder = EngineBuilder::new();
    assert_eq!(builder.config(), &EngineConfig::default());
}

#[test]
fn test_engine_builder_overrides() {
    let builder = EngineBuilder::new()
        .queue_size(256)
        .thread_multiplier(3)
        .min_threads(6)
        .tick(Duration::from_millis(25));
    let cfg = builder.config();
    assert_eq!(cfg.queue_size, 256);
    assert_eq!(cfg.thread_multiplier, 3);
    assert_eq!(cfg.min_threads, 6);
    assert_eq!(cfg.tick_ms, 25);
    assert!(cfg.worker_count() >= 6);
}

#[test]
fn test_engine_builder_build_is_lazy() {
    let engine = EngineBuilder::from_config(EngineConfig {
        queue_size: 8,
        thread_count: Some(2),
        ..EngineConfig::default()
    })
    .build()
    .unwrap();
    assert!(!engine.is_frozen());
    assert!(engine.properties().pool.is_none());
}
