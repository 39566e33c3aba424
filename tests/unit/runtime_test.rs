//! Tests for the tokio bridge

use async_trait::async_trait;
use prometheus_task_engine::config::WorkerPoolConfig;
use prometheus_task_engine::core::{AppResult, Task, WorkerPool};
use prometheus_task_engine::runtime::{AsyncExecutor, AsyncTaskExecutor};
use std::sync::Arc;
use std::time::Duration;

struct AsyncDoubler;

#[async_trait]
impl AsyncTaskExecutor for AsyncDoubler {
    async fn execute_task(&self, task: &Task) -> AppResult<()> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        let value = task.arg::<u64>(0).copied().unwrap_or_default();
        task.set_result(value * 2);
        Ok(())
    }
}

#[test]
fn test_async_executor_on_pool_workers() {
    let pool = WorkerPool::new(
        WorkerPoolConfig::new()
            .with_queue_capacity(8)
            .with_worker_count(2),
    )
    .unwrap();

    let tasks: Vec<_> = (0..4_u64)
        .map(|i| Task::builder(AsyncExecutor::new(AsyncDoubler)).with_arg(i).build())
        .collect();
    for task in &tasks {
        pool.submit(Arc::clone(task)).unwrap();
    }

    for (i, task) in tasks.iter().enumerate() {
        assert!(task.wait_executed(Some(Duration::from_secs(2))));
        assert!(task.error().is_none());
        assert_eq!(task.take_result::<u64>(), Some(i as u64 * 2));
    }
    pool.shutdown(Duration::from_secs(2));
}
