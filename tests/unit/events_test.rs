//! Tests for the event manager

use prometheus_task_engine::config::WorkerPoolConfig;
use prometheus_task_engine::core::{
    AppResult, Event, EventListener, EventManager, FailureKind, WorkerPool,
};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Counter {
    hits: AtomicU64,
}

impl EventListener for Counter {
    fn on_event(&self, event: &Event) -> AppResult<()> {
        self.hits
            .fetch_add(event.payload()["weight"].as_u64().unwrap_or(1), Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_shared_listener_on_two_topics() {
    let manager = EventManager::inline();
    let counter = Arc::new(Counter {
        hits: AtomicU64::new(0),
    });
    manager.subscribe_shared("a", counter.clone()).unwrap();
    manager.subscribe_shared("b", counter.clone()).unwrap();

    manager.publish(Event::new("a", json!({ "weight": 2 }))).unwrap();
    manager.publish(Event::new("b", json!({ "weight": 3 }))).unwrap();
    manager.publish(Event::new("c", json!({ "weight": 100 }))).unwrap();

    assert_eq!(counter.hits.load(Ordering::SeqCst), 5);
    let props = manager.properties();
    assert_eq!(props.topics, 2);
    assert_eq!(props.published, 3);
    assert_eq!(props.deliveries, 2);
}

#[test]
fn test_pool_delivery_contains_panics() {
    let pool = Arc::new(
        WorkerPool::new(
            WorkerPoolConfig::new()
                .with_queue_capacity(8)
                .with_worker_count(2),
        )
        .unwrap(),
    );
    let manager = EventManager::with_pool(Arc::clone(&pool));
    manager
        .subscribe("alarm", |_: &Event| -> AppResult<()> { panic!("listener crashed") })
        .unwrap();

    let tasks = manager.publish(Event::new("alarm", json!(null))).unwrap();
    assert_eq!(tasks.len(), 1);
    assert!(tasks[0].wait_executed(Some(Duration::from_secs(2))));
    assert_eq!(tasks[0].error().unwrap().kind(), FailureKind::Panic);

    let later = pool.submit_fn(|| Ok("pool still healthy")).unwrap();
    assert_eq!(later.get().unwrap(), "pool still healthy");
    assert_eq!(manager.properties().bound_pool, Some(pool.id()));

    pool.close();
    assert!(manager.publish(Event::new("alarm", json!(null))).is_err());
    pool.shutdown(Duration::from_secs(2));
}
