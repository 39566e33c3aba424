//! Future bridge: a single computation exposed as a task plus a blocking
//! result handle.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::error::{AppResult, EngineError, EngineResult};
use super::executor::TaskExecutor;
use super::task::{Task, TaskRef};

type Computation<T> = Box<dyn Fn() -> AppResult<T> + Send + Sync>;

/// Executor wrapping one computation.
///
/// The computation runs under a private lock, so resubmitting the same
/// task never runs it concurrently with itself.
pub struct FutureTask<T> {
    computation: Computation<T>,
    guard: Mutex<()>,
}

impl<T: Send + 'static> FutureTask<T> {
    /// Wrap a computation that produces a value or fails.
    pub fn new<F>(computation: F) -> Self
    where
        F: Fn() -> AppResult<T> + Send + Sync + 'static,
    {
        Self {
            computation: Box::new(computation),
            guard: Mutex::new(()),
        }
    }

    /// Wrap a side-effecting action that yields a fixed `value`.
    pub fn from_action<A>(action: A, value: T) -> Self
    where
        A: Fn() + Send + Sync + 'static,
        T: Clone + Sync,
    {
        Self::new(move || {
            action();
            Ok(value.clone())
        })
    }

    /// Turn the computation into a task and a handle to its result.
    #[must_use]
    pub fn into_task(self) -> (TaskRef, FutureHandle<T>) {
        let task = Task::builder(self).build();
        let handle = FutureHandle::new(Arc::clone(&task));
        (task, handle)
    }
}

impl<T: Send + 'static> TaskExecutor for FutureTask<T> {
    fn execute_task(&self, task: &Task) -> AppResult<()> {
        let _guard = self.guard.lock();
        let value = (self.computation)()?;
        task.set_result(value);
        Ok(())
    }
}

/// Blocking handle to the result of a submitted computation.
///
/// Waiting only bounds the caller: the computation keeps running after a
/// timed-out [`get_timeout`](Self::get_timeout). Cancellation is not
/// supported; [`cancel`](Self::cancel) always returns `false`.
pub struct FutureHandle<T> {
    task: TaskRef,
    _result: PhantomData<fn() -> T>,
}

impl<T: 'static> FutureHandle<T> {
    /// Handle over `task`, whose executor stores a `T` result.
    #[must_use]
    pub const fn new(task: TaskRef) -> Self {
        Self {
            task,
            _result: PhantomData,
        }
    }

    /// The underlying task.
    #[must_use]
    pub const fn task(&self) -> &TaskRef {
        &self.task
    }

    /// Whether the task has completed or was discarded at close.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.task.is_executed() || self.task.is_discarded()
    }

    /// Always `false`: running work is never interrupted.
    pub const fn cancel(&self, _may_interrupt: bool) -> bool {
        false
    }

    /// Always `false`.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        false
    }

    /// Block until the task completes and return its result.
    ///
    /// # Errors
    ///
    /// - `EngineError::Execution` carrying the captured failure; a task
    ///   dropped by a closing pool or scheduler reports
    ///   [`FailureKind::Discarded`](crate::core::FailureKind::Discarded)
    /// - `EngineError::ResultUnavailable` if the result was already taken
    pub fn get(&self) -> EngineResult<T> {
        self.task.wait_executed(None);
        self.outcome()
    }

    /// Like [`get`](Self::get), waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// `EngineError::Timeout` if the task is still running, otherwise as
    /// [`get`](Self::get).
    pub fn get_timeout(&self, timeout: Duration) -> EngineResult<T> {
        if !self.task.wait_executed(Some(timeout)) {
            return Err(EngineError::Timeout(timeout));
        }
        self.outcome()
    }

    fn outcome(&self) -> EngineResult<T> {
        if let Some(failure) = self.task.error() {
            return Err(EngineError::Execution(failure));
        }
        self.task
            .take_result::<T>()
            .ok_or(EngineError::ResultUnavailable)
    }
}

impl<T> Clone for FutureHandle<T> {
    fn clone(&self) -> Self {
        Self {
            task: Arc::clone(&self.task),
            _result: PhantomData,
        }
    }
}

impl<T> fmt::Debug for FutureHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureHandle")
            .field("task", &self.task)
            .finish()
    }
}
