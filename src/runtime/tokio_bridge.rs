//! Bridge between the thread-based engine and tokio.
//!
//! [`AsyncExecutor`] lets an async executor run on a pool worker: each
//! worker thread lazily owns a current-thread runtime and blocks on the
//! executor's futures. [`FutureHandle::get_async`] waits for a result from
//! async code without blocking the runtime.

use std::cell::RefCell;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::{Builder, Runtime};

use crate::core::error::{AppResult, EngineError, EngineResult, TaskFailure};
use crate::core::executor::TaskExecutor;
use crate::core::future::FutureHandle;
use crate::core::task::Task;

thread_local! {
    static RUNTIME: RefCell<Option<Runtime>> = const { RefCell::new(None) };
}

/// Async counterpart of [`TaskExecutor`].
#[async_trait]
pub trait AsyncTaskExecutor: Send + Sync + 'static {
    /// Run the task.
    async fn execute_task(&self, task: &Task) -> AppResult<()>;

    /// Called after every execution. Defaults to a no-op.
    async fn finished(&self, _task: &Task) -> AppResult<()> {
        Ok(())
    }
}

/// Runs an [`AsyncTaskExecutor`] wherever a [`TaskExecutor`] is expected.
#[derive(Debug)]
pub struct AsyncExecutor<E> {
    inner: E,
}

impl<E: AsyncTaskExecutor> AsyncExecutor<E> {
    /// Wrap `inner`.
    pub const fn new(inner: E) -> Self {
        Self { inner }
    }

    /// The wrapped executor.
    pub const fn inner(&self) -> &E {
        &self.inner
    }
}

impl<E: AsyncTaskExecutor> TaskExecutor for AsyncExecutor<E> {
    fn execute_task(&self, task: &Task) -> AppResult<()> {
        block_on(self.inner.execute_task(task))?
    }

    fn finished(&self, task: &Task) -> AppResult<()> {
        block_on(self.inner.finished(task))?
    }
}

/// Drive `future` on this thread's runtime, creating it on first use.
fn block_on<F: Future>(future: F) -> AppResult<F::Output> {
    let runtime = match RUNTIME.with(|cell| cell.borrow_mut().take()) {
        Some(runtime) => runtime,
        None => Builder::new_current_thread().enable_all().build()?,
    };
    let output = runtime.block_on(future);
    RUNTIME.with(|cell| *cell.borrow_mut() = Some(runtime));
    Ok(output)
}

impl<T: Send + 'static> FutureHandle<T> {
    /// Await the result from async code, waiting at most `timeout`.
    ///
    /// The wait happens on tokio's blocking pool.
    ///
    /// # Errors
    ///
    /// As [`get_timeout`](Self::get_timeout); a failed blocking task is
    /// reported as `EngineError::Execution`.
    pub async fn get_async(&self, timeout: Duration) -> EngineResult<T> {
        let handle = self.clone();
        tokio::task::spawn_blocking(move || handle.get_timeout(timeout))
            .await
            .map_err(|err| EngineError::Execution(TaskFailure::from_error(err.into(), false)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Sleeper {
        finished: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AsyncTaskExecutor for Sleeper {
        async fn execute_task(&self, task: &Task) -> AppResult<()> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            task.set_result(task.arg::<u32>(0).copied().unwrap_or_default() * 2);
            Ok(())
        }

        async fn finished(&self, _task: &Task) -> AppResult<()> {
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_async_executor_runs_on_plain_thread() {
        let finished = Arc::new(AtomicUsize::new(0));
        let task = Task::builder(AsyncExecutor::new(Sleeper {
            finished: Arc::clone(&finished),
        }))
        .with_arg(21_u32)
        .build();

        assert!(task.run());
        assert!(task.run());
        assert_eq!(task.execution_count(), 2);
        assert_eq!(task.take_result::<u32>(), Some(42));
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_get_async_waits_for_result() {
        let (task, handle) = crate::core::future::FutureTask::new(|| Ok("ready")).into_task();
        let runner = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            task.run();
        });

        assert_eq!(handle.get_async(Duration::from_secs(5)).await.unwrap(), "ready");
        runner.join().unwrap();
    }
}
