//! Integration tests for the Engine context
//!
//! These tests cover:
//! - Lazy construction and configuration freezing
//! - Scheduling through the engine's schedulers
//! - Event delivery through the engine pool
//! - Graceful close ordering and the properties snapshot

use parking_lot::Mutex;
use prometheus_task_engine::builders::EngineBuilder;
use prometheus_task_engine::core::{
    AppResult, Engine, EngineError, Event, Task, TaskArg,
};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn small_engine() -> Engine {
    prometheus_task_engine::util::init_tracing();
    EngineBuilder::new()
        .queue_size(32)
        .thread_count(2)
        .tick(Duration::from_millis(20))
        .build()
        .expect("valid engine config")
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[test]
fn test_builder_rejects_invalid_config() {
    let result = EngineBuilder::new().queue_size(4).thread_count(8).build();
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));

    let result = EngineBuilder::new().thread_multiplier(0).build();
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
}

#[test]
fn test_configuration_freezes_on_first_use() {
    let engine = small_engine();
    assert!(engine.set_thread_count(3));
    assert!(engine.set_min_threads(2));
    assert!(!engine.set_queue_size(1), "invalid values are refused");

    let answer = engine.submit_fn(|| Ok(6 * 7)).unwrap();
    assert_eq!(answer.get().unwrap(), 42);

    assert!(engine.is_frozen());
    assert!(!engine.set_thread_count(2));
    assert!(!engine.set_queue_size(64));
    assert!(!engine.set_thread_multiplier(4));
    assert_eq!(engine.pool().unwrap().worker_count(), 3);
    assert_eq!(engine.config().queue_size, 32);
    engine.shutdown(Duration::from_secs(2));
}

// ============================================================================
// SCHEDULING
// ============================================================================

#[test]
fn test_schedule_through_engine() {
    let engine = small_engine();
    let seen = Arc::new(AtomicU64::new(0));
    let executor = {
        let seen = Arc::clone(&seen);
        Arc::new(move |task: &Task| -> AppResult<()> {
            seen.fetch_add(*task.arg::<u64>(0).unwrap_or(&0), Ordering::SeqCst);
            Ok(())
        })
    };

    let args: Vec<TaskArg> = vec![Arc::new(5_u64)];
    let appointment = engine
        .schedule(Duration::from_millis(10), executor, args)
        .unwrap();
    assert!(wait_until(Duration::from_secs(2), || seen.load(Ordering::SeqCst) == 5));
    assert_eq!(appointment.fire_count(), 1);

    let simple = engine.simple_scheduler().unwrap();
    let (_, handle) = simple.schedule_fn(Duration::ZERO, || Ok("inline")).unwrap();
    assert_eq!(handle.get_timeout(Duration::from_secs(2)).unwrap(), "inline");
    engine.shutdown(Duration::from_secs(2));
}

// ============================================================================
// EVENTS
// ============================================================================

#[test]
fn test_events_delivered_on_pool() {
    let engine = small_engine();
    let events = engine.events().unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&received);
    events
        .subscribe("job.done", move |event: &Event| -> AppResult<()> {
            sink.lock().push(event.payload()["id"].as_u64().unwrap_or_default());
            Ok(())
        })
        .unwrap();

    for id in 0..5 {
        events
            .publish(Event::new("job.done", json!({ "id": id })).with_source("test"))
            .unwrap();
    }

    assert!(wait_until(Duration::from_secs(2), || received.lock().len() == 5));
    let mut ids = received.lock().clone();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    engine.shutdown(Duration::from_secs(2));
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[test]
fn test_wait_if_busy_then_close() {
    let engine = small_engine();
    let done = Arc::new(AtomicU64::new(0));

    for _ in 0..6 {
        let done = Arc::clone(&done);
        engine
            .execute(move || {
                thread::sleep(Duration::from_millis(20));
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }
    let (_, delayed) = engine
        .schedule_fn(Duration::from_millis(50), || Ok(()))
        .unwrap();

    assert!(engine.is_busy());
    engine.wait_if_busy_then_close(Duration::from_millis(5));

    assert_eq!(done.load(Ordering::SeqCst), 6);
    assert!(delayed.is_done());
    assert!(engine.is_closed());
    assert!(!engine.is_busy());
    assert!(matches!(
        engine.submit_fn(|| Ok(1)),
        Err(EngineError::Closed(_))
    ));
    assert!(matches!(engine.events(), Err(EngineError::Closed(_))));
    engine.shutdown(Duration::from_secs(2));
}

#[test]
fn test_close_before_use_builds_nothing() {
    let engine = small_engine();
    engine.close();
    assert!(matches!(engine.pool(), Err(EngineError::Closed(_))));
    assert!(matches!(engine.scheduler(), Err(EngineError::Closed(_))));
    assert!(engine.properties().pool.is_none());
}

#[test]
fn test_properties_serialize() {
    let engine = small_engine();
    let before = serde_json::to_value(engine.properties()).unwrap();
    assert!(before["pool"].is_null());
    assert_eq!(before["frozen"], false);

    engine.submit_fn(|| Ok(())).unwrap().get().unwrap();
    engine.scheduler().unwrap();

    let after = serde_json::to_value(engine.properties()).unwrap();
    assert_eq!(after["frozen"], true);
    assert_eq!(after["config"]["queue_size"], 32);
    assert_eq!(after["pool"]["worker_count"], 2);
    assert_eq!(after["pool"]["total_enqueued"], 1);
    assert_eq!(after["scheduler"]["bound_pool"], after["pool"]["instance_id"]);
    assert!(after["simple_scheduler"].is_null());
    engine.shutdown(Duration::from_secs(2));
}
