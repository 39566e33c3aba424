//! The task unit: a descriptor of work plus its outcome.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

use super::error::TaskFailure;
use super::executor::TaskExecutor;

/// A positional task argument.
pub type TaskArg = Arc<dyn Any + Send + Sync>;

/// Opaque identity of whoever created a task.
pub type TaskSource = Arc<dyn Any + Send + Sync>;

/// Shared handle to a task. The engine and the caller both hold one.
pub type TaskRef = Arc<Task>;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

struct Outcome {
    result: Option<Box<dyn Any + Send>>,
    error: Option<TaskFailure>,
    executions: u64,
    /// Dropped by a closing pool or scheduler since the last execution.
    discarded: bool,
}

impl Outcome {
    const fn settled(&self) -> bool {
        self.executions > 0 || self.discarded
    }
}

/// One unit of work.
///
/// The descriptor part (source, executor, arguments, reference, trace flag)
/// is fixed at build time. The outcome part (result, captured error,
/// execution counter) is written only by the thread running the task.
/// The engine never deduplicates: submitting the same task twice runs it
/// twice and the counter reflects both runs.
pub struct Task {
    id: u64,
    source: Option<TaskSource>,
    executor: Arc<dyn TaskExecutor>,
    args: Vec<TaskArg>,
    reference: Option<String>,
    full_trace: bool,
    outcome: Mutex<Outcome>,
    done: Condvar,
}

impl Task {
    /// Start building a task around `executor`.
    pub fn builder<E: TaskExecutor>(executor: E) -> TaskBuilder {
        TaskBuilder::new(Arc::new(executor))
    }

    /// Start building a task around an executor that is already shared.
    #[must_use]
    pub fn builder_shared(executor: Arc<dyn TaskExecutor>) -> TaskBuilder {
        TaskBuilder::new(executor)
    }

    /// Build a task from an executor and its arguments.
    #[must_use]
    pub fn new(executor: Arc<dyn TaskExecutor>, args: Vec<TaskArg>) -> TaskRef {
        TaskBuilder::new(executor).with_args(args).build()
    }

    /// Process-unique task identifier.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Originating source, if one was attached.
    #[must_use]
    pub const fn source(&self) -> Option<&TaskSource> {
        self.source.as_ref()
    }

    /// Originating source downcast to `T`.
    #[must_use]
    pub fn source_as<T: 'static>(&self) -> Option<&T> {
        self.source.as_ref()?.downcast_ref::<T>()
    }

    /// The executor this task runs.
    #[must_use]
    pub const fn executor(&self) -> &Arc<dyn TaskExecutor> {
        &self.executor
    }

    /// All positional arguments.
    #[must_use]
    pub fn args(&self) -> &[TaskArg] {
        &self.args
    }

    /// Argument `index` downcast to `T`.
    #[must_use]
    pub fn arg<T: 'static>(&self, index: usize) -> Option<&T> {
        self.args.get(index)?.downcast_ref::<T>()
    }

    /// Correlation id, if one was attached.
    #[must_use]
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    /// Whether captured errors keep their full trace.
    #[must_use]
    pub const fn full_trace(&self) -> bool {
        self.full_trace
    }

    /// Store the task's result, replacing any previous one.
    pub fn set_result<T: Send + 'static>(&self, value: T) {
        self.outcome.lock().result = Some(Box::new(value));
    }

    /// Take the stored result if it has type `T`.
    ///
    /// A result of another type is left in place.
    pub fn take_result<T: 'static>(&self) -> Option<T> {
        let mut outcome = self.outcome.lock();
        let boxed = outcome.result.take()?;
        match boxed.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(other) => {
                outcome.result = Some(other);
                None
            }
        }
    }

    /// Whether a result is currently stored.
    #[must_use]
    pub fn has_result(&self) -> bool {
        self.outcome.lock().result.is_some()
    }

    /// Error captured by the most recent execution.
    #[must_use]
    pub fn error(&self) -> Option<TaskFailure> {
        self.outcome.lock().error.clone()
    }

    /// Number of completed executions.
    #[must_use]
    pub fn execution_count(&self) -> u64 {
        self.outcome.lock().executions
    }

    /// Whether the task has completed at least once.
    #[must_use]
    pub fn is_executed(&self) -> bool {
        self.execution_count() > 0
    }

    /// Whether the task was dropped at close without running.
    ///
    /// Cleared again if the task is later resubmitted and runs.
    #[must_use]
    pub fn is_discarded(&self) -> bool {
        self.outcome.lock().discarded
    }

    /// Block until the task has completed at least once or was discarded.
    ///
    /// With `None` the wait is unbounded. Returns `false` if the timeout
    /// elapsed first.
    pub fn wait_executed(&self, timeout: Option<Duration>) -> bool {
        let mut outcome = self.outcome.lock();
        let Some(timeout) = timeout else {
            while !outcome.settled() {
                self.done.wait(&mut outcome);
            }
            return true;
        };

        let deadline = Instant::now() + timeout;
        while !outcome.settled() {
            if self.done.wait_until(&mut outcome, deadline).timed_out() {
                return outcome.settled();
            }
        }
        true
    }

    /// Record that a closing pool or scheduler dropped this task.
    ///
    /// The executor is not called and the counter is left alone; waiters
    /// wake and observe `failure`.
    pub(crate) fn abandon(&self, failure: TaskFailure) {
        debug!(task_id = self.id, error = %failure, "Task discarded");
        let mut outcome = self.outcome.lock();
        outcome.error = Some(failure);
        outcome.discarded = true;
        self.done.notify_all();
    }

    /// Run the task on the current thread.
    ///
    /// Execution errors and panics are captured onto the task, the counter
    /// is bumped and waiters woken, then `finished` runs with its own
    /// failures logged and dropped. Returns `true` if execution succeeded.
    pub(crate) fn run(&self) -> bool {
        let executor = Arc::clone(&self.executor);

        let failure = match panic::catch_unwind(AssertUnwindSafe(|| executor.execute_task(self))) {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(TaskFailure::from_error(err, self.full_trace)),
            Err(payload) => Some(TaskFailure::from_panic(payload.as_ref())),
        };

        let succeeded = failure.is_none();
        if let Some(failure) = &failure {
            warn!(
                task_id = self.id,
                reference = self.reference.as_deref().unwrap_or(""),
                error = %failure,
                "Task execution failed"
            );
        } else {
            debug!(task_id = self.id, "Task executed");
        }

        {
            let mut outcome = self.outcome.lock();
            outcome.error = failure;
            outcome.executions += 1;
            outcome.discarded = false;
            self.done.notify_all();
        }

        match panic::catch_unwind(AssertUnwindSafe(|| executor.finished(self))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(task_id = self.id, error = %err, "Task finished callback failed");
            }
            Err(payload) => {
                let failure = TaskFailure::from_panic(payload.as_ref());
                error!(task_id = self.id, error = %failure, "Task finished callback panicked");
            }
        }

        succeeded
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = self.outcome.lock();
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("reference", &self.reference)
            .field("args", &self.args.len())
            .field("executions", &outcome.executions)
            .field("error", &outcome.error)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Task`].
pub struct TaskBuilder {
    executor: Arc<dyn TaskExecutor>,
    source: Option<TaskSource>,
    args: Vec<TaskArg>,
    reference: Option<String>,
    full_trace: bool,
}

impl TaskBuilder {
    fn new(executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            executor,
            source: None,
            args: Vec::new(),
            reference: None,
            full_trace: false,
        }
    }

    /// Attach the originating source.
    #[must_use]
    pub fn with_source<S: Any + Send + Sync>(mut self, source: S) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Append one argument.
    #[must_use]
    pub fn with_arg<A: Any + Send + Sync>(mut self, arg: A) -> Self {
        self.args.push(Arc::new(arg));
        self
    }

    /// Append already-shared arguments.
    #[must_use]
    pub fn with_args(mut self, args: Vec<TaskArg>) -> Self {
        self.args.extend(args);
        self
    }

    /// Attach a correlation id.
    #[must_use]
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Keep the full error trace when execution fails.
    #[must_use]
    pub const fn with_full_trace(mut self, full_trace: bool) -> Self {
        self.full_trace = full_trace;
        self
    }

    /// Finish the task.
    #[must_use]
    pub fn build(self) -> TaskRef {
        Arc::new(Task {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            source: self.source,
            executor: self.executor,
            args: self.args,
            reference: self.reference,
            full_trace: self.full_trace,
            outcome: Mutex::new(Outcome {
                result: None,
                error: None,
                executions: 0,
                discarded: false,
            }),
            done: Condvar::new(),
        })
    }
}
