//! Worker pool and scheduler configuration structures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::infra::queue::default_low_mark;

/// Default bounded wait for pool and scheduler threads, in milliseconds.
pub const DEFAULT_TICK_MS: u64 = 500;

/// Default worker thread stack size.
pub const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;

/// Worker pool configuration.
///
/// ```rust,ignore
/// let config = WorkerPoolConfig::new()
///     .with_queue_capacity(10)
///     .with_worker_count(4);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Pool name, used for thread names and logs.
    pub name: String,
    /// Maximum number of pending tasks.
    pub queue_capacity: usize,
    /// Number of worker threads, fixed for the pool's lifetime.
    pub worker_count: usize,
    /// Fill level at which submitters block. Defaults to the capacity.
    pub high_mark: Option<usize>,
    /// Fill level at which blocked submitters resume. Defaults to 75% of capacity.
    pub low_mark: Option<usize>,
    /// Bounded wait used by the dispatcher, workers and blocked submitters.
    pub poll_interval_ms: u64,
    /// Stack size for each worker thread.
    pub thread_stack_size: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            name: "worker-pool".into(),
            queue_capacity: 1024,
            worker_count: 4,
            high_mark: None,
            low_mark: None,
            poll_interval_ms: DEFAULT_TICK_MS,
            thread_stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl WorkerPoolConfig {
    /// Configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pool name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the pending queue capacity.
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the number of worker threads.
    #[must_use]
    pub const fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Set explicit high and low watermarks.
    #[must_use]
    pub const fn with_watermarks(mut self, high: usize, low: usize) -> Self {
        self.high_mark = Some(high);
        self.low_mark = Some(low);
        self
    }

    /// Set the bounded wait interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, size: usize) -> Self {
        self.thread_stack_size = size;
        self
    }

    /// Effective high watermark.
    #[must_use]
    pub fn high_mark(&self) -> usize {
        self.high_mark.unwrap_or(self.queue_capacity)
    }

    /// Effective low watermark.
    #[must_use]
    pub fn low_mark(&self) -> usize {
        self.low_mark
            .unwrap_or_else(|| default_low_mark(self.queue_capacity))
    }

    /// Bounded wait interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate pool configuration values.
    ///
    /// # Errors
    ///
    /// Describes the first violated constraint.
    pub fn validate(&self) -> Result<(), String> {
        if self.queue_capacity < 2 {
            return Err(format!(
                "queue_capacity must be at least 2, got {}",
                self.queue_capacity
            ));
        }
        if self.worker_count < 2 {
            return Err(format!(
                "worker_count must be at least 2, got {}",
                self.worker_count
            ));
        }
        if self.worker_count > self.queue_capacity {
            return Err(format!(
                "worker_count ({}) must not exceed queue_capacity ({})",
                self.worker_count, self.queue_capacity
            ));
        }
        let (high, low) = (self.high_mark(), self.low_mark());
        if high == 0 || high > self.queue_capacity {
            return Err(format!(
                "high_mark ({high}) must be in 1..={}",
                self.queue_capacity
            ));
        }
        if low >= high {
            return Err(format!("low_mark ({low}) must be below high_mark ({high})"));
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".into());
        }
        if self.thread_stack_size == 0 {
            return Err("thread_stack_size must be greater than 0".into());
        }
        Ok(())
    }
}

/// Appointment scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Scheduler name, used for the thread name and logs.
    pub name: String,
    /// Longest the scheduler thread sleeps between liveness checks.
    pub tick_ms: u64,
    /// Stack size for the scheduler thread.
    pub thread_stack_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: "scheduler".into(),
            tick_ms: DEFAULT_TICK_MS,
            thread_stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl SchedulerConfig {
    /// Configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scheduler name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the tick.
    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick_ms = u64::try_from(tick.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Tick as a duration.
    #[must_use]
    pub const fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Validate scheduler configuration values.
    ///
    /// # Errors
    ///
    /// Describes the first violated constraint.
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_ms == 0 {
            return Err("tick_ms must be greater than 0".into());
        }
        if self.thread_stack_size == 0 {
            return Err("thread_stack_size must be greater than 0".into());
        }
        Ok(())
    }
}
