//! The executor contract.

use super::error::AppResult;
use super::task::Task;

/// Capability implemented by anything the engine can run.
///
/// The engine calls [`execute_task`](TaskExecutor::execute_task) on a worker
/// thread (or on the scheduler thread for inline schedulers) and then
/// [`finished`](TaskExecutor::finished) on the same thread. Errors and panics
/// from either method are contained: an execution failure is recorded on the
/// task, a `finished` failure is only logged.
///
/// # Example
///
/// ```rust,ignore
/// use prometheus_task_engine::core::{AppResult, Task, TaskExecutor};
///
/// struct Resize;
///
/// impl TaskExecutor for Resize {
///     fn execute_task(&self, task: &Task) -> AppResult<()> {
///         let width = task.arg::<u32>(0).copied().unwrap_or(64);
///         task.set_result(width * 2);
///         Ok(())
///     }
/// }
/// ```
pub trait TaskExecutor: Send + Sync + 'static {
    /// Execute the task. Store any output with [`Task::set_result`].
    ///
    /// # Errors
    ///
    /// Any error is captured onto the task rather than propagated.
    fn execute_task(&self, task: &Task) -> AppResult<()>;

    /// React after the task ran, whether or not it failed.
    ///
    /// The task's execution counter has already been incremented when this
    /// is called.
    ///
    /// # Errors
    ///
    /// Errors are logged and otherwise ignored.
    fn finished(&self, _task: &Task) -> AppResult<()> {
        Ok(())
    }
}

/// Blanket implementation: plain closures over a task are executors.
impl<F> TaskExecutor for F
where
    F: Fn(&Task) -> AppResult<()> + Send + Sync + 'static,
{
    fn execute_task(&self, task: &Task) -> AppResult<()> {
        self(task)
    }
}
