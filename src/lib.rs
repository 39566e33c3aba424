//! # Prometheus Task Engine
//!
//! An in-process engine for running and scheduling work on OS threads.
//!
//! The engine pairs a fixed-size worker pool, fed through a bounded queue
//! with high/low watermark backpressure, with a time-ordered appointment
//! scheduler that releases delayed work into the pool (or runs it inline on
//! its own thread).
//!
//! ## Components
//!
//! - **Task**: a descriptor of work (source, executor, arguments) plus its
//!   outcome (result, captured error, execution count)
//! - **`TaskExecutor`**: what callers implement; plain closures qualify
//! - **`WatermarkQueue`**: blocking FIFO whose producers stall at the high
//!   mark until consumers drain it to the low mark
//! - **`WorkerPool`**: one dispatcher thread handing tasks to the first idle
//!   worker through single-slot mailboxes
//! - **`AppointmentScheduler`**: one thread releasing tasks at their due time
//! - **`FutureTask` / `FutureHandle`**: a computation as a task plus a
//!   blocking handle to its result
//! - **`Engine`**: lazily built default pool, schedulers and event manager
//!
//! Execution errors and panics never reach worker threads. They are
//! recorded on the task and surface through [`core::FutureHandle::get`].
//!
//! ```rust,ignore
//! use prometheus_task_engine::config::WorkerPoolConfig;
//! use prometheus_task_engine::core::{AppointmentScheduler, WorkerPool};
//! use prometheus_task_engine::config::SchedulerConfig;
//! use std::{sync::Arc, time::Duration};
//!
//! let pool = Arc::new(WorkerPool::new(
//!     WorkerPoolConfig::new().with_queue_capacity(10).with_worker_count(4),
//! )?);
//! let scheduler = AppointmentScheduler::with_pool(SchedulerConfig::new(), Arc::clone(&pool))?;
//!
//! let (_appointment, answer) = scheduler.schedule_fn(Duration::from_millis(50), || Ok(42))?;
//! assert_eq!(answer.get()?, 42);
//!
//! scheduler.shutdown(Duration::from_secs(1));
//! pool.shutdown(Duration::from_secs(1));
//! ```
//!
//! For complete examples, see:
//! - `tests/worker_pool_test.rs` - pool sizing, backpressure and failure containment
//! - `tests/scheduler_test.rs` - appointment ordering and cancellation

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Tasks, executors, the worker pool, schedulers and the engine context.
pub mod core;
/// Configuration models for pools, schedulers and the engine.
pub mod config;
/// Builders to construct engine components from configuration.
pub mod builders;
/// Infrastructure: the bounded watermark queue.
pub mod infra;
/// Tokio adapters for async executors and async result waits.
#[cfg(feature = "tokio-runtime")]
pub mod runtime;
/// Shared utilities.
pub mod util;
