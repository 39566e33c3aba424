//! Queue implementations.

pub mod watermark;

pub use watermark::{default_low_mark, WatermarkQueue, DEFAULT_POLL_INTERVAL};
