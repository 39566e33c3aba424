//! Infrastructure building blocks shared by the pool and the scheduler.

pub mod queue;

pub use queue::WatermarkQueue;
