//! Fixed-size worker pool: one dispatcher thread plus N worker threads.
//!
//! Submitted tasks enter a [`WatermarkQueue`](crate::infra::WatermarkQueue).
//! The dispatcher pulls them in FIFO order and hands each one to the first
//! idle worker through that worker's single-slot mailbox. A worker is either
//! idle (registered in the idle registry, mailbox empty) or busy (mailbox
//! taken, not registered), never both.
//!
//! # Example
//!
//! ```rust,ignore
//! use prometheus_task_engine::config::WorkerPoolConfig;
//! use prometheus_task_engine::core::WorkerPool;
//!
//! let pool = WorkerPool::new(
//!     WorkerPoolConfig::new()
//!         .with_queue_capacity(10)
//!         .with_worker_count(4),
//! )?;
//!
//! let answer = pool.submit_fn(|| Ok(6 * 7))?;
//! assert_eq!(answer.get()?, 42);
//! pool.shutdown(Duration::from_secs(2));
//! ```

mod native;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

pub use native::WorkerPool;

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Workers currently running a task.
    pub busy_workers: usize,
    /// Tasks waiting for a worker.
    pub pending_tasks: usize,
    /// Total tasks accepted by `submit`.
    pub submitted_tasks: u64,
    /// Total executions completed, failed ones included.
    pub completed_tasks: u64,
    /// Total executions that captured an error.
    pub failed_tasks: u64,
}

/// Serializable snapshot of a pool for external telemetry.
#[derive(Debug, Clone, Serialize)]
pub struct PoolProperties {
    /// Pool instance identifier.
    pub instance_id: Uuid,
    /// Pool name.
    pub name: String,
    /// Number of worker threads.
    pub worker_count: usize,
    /// Pending queue capacity.
    pub queue_capacity: usize,
    /// Fill level at which submitters block.
    pub high_mark: usize,
    /// Fill level at which blocked submitters resume.
    pub low_mark: usize,
    /// Tasks waiting for a worker.
    pub pending: usize,
    /// Idle workers.
    pub available_workers: usize,
    /// Tasks ever accepted by the queue.
    pub total_enqueued: u64,
    /// Total executions completed.
    pub executed: u64,
    /// Total executions that captured an error.
    pub failed: u64,
    /// Whether the pool still accepts work.
    pub live: bool,
}

/// Per-worker counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerSnapshot {
    /// Worker index within the pool.
    pub index: usize,
    /// Tasks this worker has run.
    pub calls: u64,
    /// Cumulative time spent executing tasks.
    pub busy_time: Duration,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub submitted_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
}

impl PoolCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, worker_count: usize, busy_workers: usize, pending_tasks: usize) -> PoolStats {
        PoolStats {
            worker_count,
            busy_workers,
            pending_tasks,
            submitted_tasks: self.submitted_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
        }
    }
}

/// Cumulative counters of one worker.
#[derive(Debug, Default)]
pub(crate) struct WorkerCounters {
    calls: AtomicU64,
    busy_nanos: AtomicU64,
}

impl WorkerCounters {
    pub fn record(&self, elapsed: Duration) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.busy_nanos.fetch_add(
            crate::util::clock::duration_to_nanos(elapsed),
            Ordering::Relaxed,
        );
    }

    pub fn snapshot(&self, index: usize) -> WorkerSnapshot {
        WorkerSnapshot {
            index,
            calls: self.calls.load(Ordering::Relaxed),
            busy_time: Duration::from_nanos(self.busy_nanos.load(Ordering::Relaxed)),
        }
    }
}
