//! Configuration models for pools, schedulers, and the engine.

pub mod engine;
pub mod pool;

pub use engine::EngineConfig;
pub use pool::{SchedulerConfig, WorkerPoolConfig, DEFAULT_STACK_SIZE, DEFAULT_TICK_MS};
