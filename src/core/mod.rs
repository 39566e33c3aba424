//! Core engine: tasks, executors, the worker pool, schedulers and the
//! engine context.

pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod facade;
pub mod future;
pub mod scheduler;
pub mod task;
pub mod worker_pool;

pub use engine::{Engine, EngineProperties};
pub use error::{AppResult, EngineError, EngineResult, FailureKind, TaskFailure};
pub use events::{Event, EventListener, EventManager, EventManagerProperties, ListenerId, WILDCARD_TOPIC};
pub use executor::TaskExecutor;
pub use future::{FutureHandle, FutureTask};
pub use scheduler::{Appointment, AppointmentScheduler, FixedRate, RateController, SchedulerProperties};
pub use task::{Task, TaskArg, TaskBuilder, TaskRef, TaskSource};
pub use worker_pool::{PoolProperties, PoolStats, WorkerPool, WorkerSnapshot};
