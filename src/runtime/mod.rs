//! Tokio adapters: async executors on worker threads and async result waits.

pub mod tokio_bridge;

pub use tokio_bridge::{AsyncExecutor, AsyncTaskExecutor};
