//! Blocking FIFO with a high/low watermark pair.
//!
//! Producers are admitted freely until the queue holds `high_mark` items.
//! From then on every producer blocks until consumers drain the queue to
//! `low_mark` or below, after which admission reopens. The gap between the
//! two marks keeps producers from waking for every single dequeue.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::core::error::{EngineError, EngineResult};

/// Default bounded wait used by [`WatermarkQueue::dequeue`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

struct QueueState<T> {
    items: VecDeque<T>,
    total_enqueued: u64,
    /// Set when the high mark is hit, cleared once drained to the low mark.
    throttled: bool,
    closed: bool,
}

/// Capacity-limited FIFO with watermark backpressure.
pub struct WatermarkQueue<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    high_mark: usize,
    low_mark: usize,
    poll_interval: Duration,
}

impl<T> WatermarkQueue<T> {
    /// Create a queue with the default marks: high = capacity, low = 75%.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidConfig` if `capacity` is below 2.
    pub fn new(capacity: usize) -> EngineResult<Self> {
        Self::with_marks(capacity, capacity, default_low_mark(capacity))
    }

    /// Create a queue with explicit watermarks.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidConfig` unless
    /// `low_mark < high_mark <= capacity` and `capacity >= 2`.
    pub fn with_marks(capacity: usize, high_mark: usize, low_mark: usize) -> EngineResult<Self> {
        if capacity < 2 {
            return Err(EngineError::InvalidConfig(format!(
                "queue capacity must be at least 2, got {capacity}"
            )));
        }
        if high_mark == 0 || high_mark > capacity {
            return Err(EngineError::InvalidConfig(format!(
                "high mark {high_mark} must be in 1..={capacity}"
            )));
        }
        if low_mark >= high_mark {
            return Err(EngineError::InvalidConfig(format!(
                "low mark {low_mark} must be below high mark {high_mark}"
            )));
        }

        Ok(Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(1024)),
                total_enqueued: 0,
                throttled: false,
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
            high_mark,
            low_mark,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Override the bounded wait used by blocking calls.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Append `item`, blocking while the queue is throttled.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Closed` if the queue is closed before or while
    /// waiting; the item is dropped.
    pub fn enqueue(&self, item: T) -> EngineResult<()> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(EngineError::Closed("queue"));
            }
            if state.items.len() >= self.high_mark {
                state.throttled = true;
            }
            if !state.throttled {
                break;
            }
            self.not_full.wait_for(&mut state, self.poll_interval);
        }

        state.items.push_back(item);
        state.total_enqueued += 1;
        if state.items.len() >= self.high_mark {
            state.throttled = true;
        }
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the head item, waiting up to the poll interval for one.
    pub fn dequeue(&self) -> Option<T> {
        self.dequeue_timeout(self.poll_interval)
    }

    /// Remove the head item, waiting up to `timeout` for one.
    ///
    /// Returns `None` on timeout or once the queue is closed and empty.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<T> {
        let mut state = self.state.lock();
        if state.items.is_empty() && !state.closed {
            self.not_empty.wait_for(&mut state, timeout);
        }
        let item = state.items.pop_front()?;
        if state.throttled && state.items.len() <= self.low_mark {
            state.throttled = false;
            self.not_full.notify_all();
        }
        Some(item)
    }

    /// Remove the head item without waiting.
    pub fn try_dequeue(&self) -> Option<T> {
        self.dequeue_timeout(Duration::ZERO)
    }

    /// Close the queue, waking every blocked producer and consumer.
    ///
    /// Returns the items still queued so the owner can account for them.
    pub fn close(&self) -> Vec<T> {
        let mut state = self.state.lock();
        state.closed = true;
        let drained = state.items.drain(..).collect();
        self.not_empty.notify_all();
        self.not_full.notify_all();
        drained
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Current number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Whether the queue holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Whether producers are currently held back.
    #[must_use]
    pub fn is_throttled(&self) -> bool {
        self.state.lock().throttled
    }

    /// Maximum number of items.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fill level at which producers start blocking.
    #[must_use]
    pub const fn high_mark(&self) -> usize {
        self.high_mark
    }

    /// Fill level at which blocked producers are released.
    #[must_use]
    pub const fn low_mark(&self) -> usize {
        self.low_mark
    }

    /// Items accepted since creation.
    #[must_use]
    pub fn total_enqueued(&self) -> u64 {
        self.state.lock().total_enqueued
    }
}

/// 75% of `capacity`, rounded down.
#[must_use]
pub const fn default_low_mark(capacity: usize) -> usize {
    capacity * 3 / 4
}
