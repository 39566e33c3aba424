//! Engine context: the default pool, its schedulers and the event manager.
//!
//! Components are built on first use with double-checked locking. The
//! pool configuration freezes once the pool exists: later setter calls
//! return `false` and change nothing.
//!
//! # Example
//!
//! ```rust,ignore
//! use prometheus_task_engine::builders::EngineBuilder;
//!
//! let engine = EngineBuilder::new().queue_size(64).thread_count(4).build()?;
//! let answer = engine.submit_fn(|| Ok(6 * 7))?;
//! assert_eq!(answer.get()?, 42);
//! engine.wait_if_busy_then_close(Duration::from_millis(10));
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::{AppResult, EngineError, EngineResult};
use super::events::{EventManager, EventManagerProperties};
use super::executor::TaskExecutor;
use super::future::FutureHandle;
use super::scheduler::{Appointment, AppointmentScheduler, SchedulerProperties};
use super::task::{TaskArg, TaskRef};
use super::worker_pool::{PoolProperties, WorkerPool};
use crate::config::EngineConfig;

/// Serializable snapshot of an engine and the components built so far.
#[derive(Debug, Clone, Serialize)]
pub struct EngineProperties {
    /// Engine instance identifier.
    pub instance_id: Uuid,
    /// Current configuration.
    pub config: EngineConfig,
    /// Whether the pool configuration is frozen.
    pub frozen: bool,
    /// Whether the engine has been closed.
    pub closed: bool,
    /// Default pool, if built.
    pub pool: Option<PoolProperties>,
    /// Pool-bound scheduler, if built.
    pub scheduler: Option<SchedulerProperties>,
    /// Inline scheduler, if built.
    pub simple_scheduler: Option<SchedulerProperties>,
    /// Event manager, if built.
    pub events: Option<EventManagerProperties>,
}

/// Lazily built default pool, schedulers and event manager.
pub struct Engine {
    id: Uuid,
    config: Mutex<EngineConfig>,
    init: Mutex<()>,
    pool: OnceLock<Arc<WorkerPool>>,
    scheduler: OnceLock<Arc<AppointmentScheduler>>,
    simple_scheduler: OnceLock<Arc<AppointmentScheduler>>,
    events: OnceLock<Arc<EventManager>>,
    closed: AtomicBool,
}

impl Engine {
    /// Validate `config` and create an engine. Nothing is started yet.
    ///
    /// # Errors
    ///
    /// `EngineError::InvalidConfig` if validation fails.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate().map_err(EngineError::InvalidConfig)?;
        Ok(Self::unvalidated(config))
    }

    /// Engine whose configuration errors surface on first use.
    pub(crate) fn unvalidated(config: EngineConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            config: Mutex::new(config),
            init: Mutex::new(()),
            pool: OnceLock::new(),
            scheduler: OnceLock::new(),
            simple_scheduler: OnceLock::new(),
            events: OnceLock::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Engine configured from the environment.
    ///
    /// # Errors
    ///
    /// `EngineError::InvalidConfig` if a variable is malformed.
    pub fn from_env() -> EngineResult<Self> {
        Self::new(EngineConfig::from_env().map_err(EngineError::InvalidConfig)?)
    }

    /// Engine instance identifier.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Copy of the current configuration.
    #[must_use]
    pub fn config(&self) -> EngineConfig {
        self.config.lock().clone()
    }

    /// Whether the pool exists and its configuration can no longer change.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.pool.get().is_some()
    }

    /// Apply `change` unless frozen or the result would be invalid.
    fn reconfigure(&self, change: impl FnOnce(&mut EngineConfig)) -> bool {
        let _init = self.init.lock();
        if self.is_frozen() || self.is_closed() {
            return false;
        }
        let mut config = self.config.lock();
        let mut candidate = config.clone();
        change(&mut candidate);
        if let Err(reason) = candidate.validate() {
            debug!(%reason, "Rejected engine reconfiguration");
            return false;
        }
        *config = candidate;
        true
    }

    /// Set the default pool's queue size.
    pub fn set_queue_size(&self, size: usize) -> bool {
        self.reconfigure(|c| c.queue_size = size)
    }

    /// Set the per-CPU thread multiplier.
    pub fn set_thread_multiplier(&self, multiplier: usize) -> bool {
        self.reconfigure(|c| c.thread_multiplier = multiplier)
    }

    /// Set an explicit worker count.
    pub fn set_thread_count(&self, count: usize) -> bool {
        self.reconfigure(|c| c.thread_count = Some(count))
    }

    /// Set the floor for the derived worker count.
    pub fn set_min_threads(&self, min: usize) -> bool {
        self.reconfigure(|c| c.min_threads = min)
    }

    fn get_or_build<T>(
        &self,
        cell: &OnceLock<Arc<T>>,
        build: impl FnOnce(&EngineConfig) -> EngineResult<T>,
    ) -> EngineResult<Arc<T>> {
        if let Some(existing) = cell.get() {
            return Ok(Arc::clone(existing));
        }
        let _init = self.init.lock();
        if let Some(existing) = cell.get() {
            return Ok(Arc::clone(existing));
        }
        if self.is_closed() {
            return Err(EngineError::Closed("engine"));
        }
        let config = self.config.lock().clone();
        let built = Arc::new(build(&config)?);
        let _ = cell.set(Arc::clone(&built));
        Ok(built)
    }

    /// The default worker pool, started on first call.
    ///
    /// # Errors
    ///
    /// `EngineError::Closed` if the engine was closed before the pool was
    /// built, or the pool's construction error.
    pub fn pool(&self) -> EngineResult<Arc<WorkerPool>> {
        self.get_or_build(&self.pool, |config| {
            let pool = WorkerPool::new(config.pool_config())?;
            info!(engine_id = %self.id, workers = pool.worker_count(), "Engine pool started");
            Ok(pool)
        })
    }

    /// The scheduler bound to the default pool.
    ///
    /// # Errors
    ///
    /// As [`pool`](Self::pool).
    pub fn scheduler(&self) -> EngineResult<Arc<AppointmentScheduler>> {
        let pool = self.pool()?;
        self.get_or_build(&self.scheduler, move |config| {
            AppointmentScheduler::with_pool(config.scheduler_config("engine-scheduler"), pool)
        })
    }

    /// The scheduler that runs due tasks on its own thread.
    ///
    /// # Errors
    ///
    /// As [`pool`](Self::pool).
    pub fn simple_scheduler(&self) -> EngineResult<Arc<AppointmentScheduler>> {
        self.get_or_build(&self.simple_scheduler, |config| {
            AppointmentScheduler::simple(config.scheduler_config("engine-simple-scheduler"))
        })
    }

    /// The event manager, delivering through the default pool.
    ///
    /// # Errors
    ///
    /// As [`pool`](Self::pool).
    pub fn events(&self) -> EngineResult<Arc<EventManager>> {
        let pool = self.pool()?;
        self.get_or_build(&self.events, move |_| Ok(EventManager::with_pool(pool)))
    }

    /// Submit a task to the default pool.
    ///
    /// # Errors
    ///
    /// `EngineError::Closed` once the engine is closed.
    pub fn submit(&self, task: TaskRef) -> EngineResult<()> {
        self.pool()?.submit(task)
    }

    /// Run `action` on the default pool.
    ///
    /// # Errors
    ///
    /// `EngineError::Closed` once the engine is closed.
    pub fn execute<A>(&self, action: A) -> EngineResult<FutureHandle<()>>
    where
        A: Fn() + Send + Sync + 'static,
    {
        self.pool()?.execute(action)
    }

    /// Run `computation` on the default pool.
    ///
    /// # Errors
    ///
    /// `EngineError::Closed` once the engine is closed.
    pub fn submit_fn<F, T>(&self, computation: F) -> EngineResult<FutureHandle<T>>
    where
        F: Fn() -> AppResult<T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        self.pool()?.submit_fn(computation)
    }

    /// Schedule `executor` on the pool-bound scheduler.
    ///
    /// # Errors
    ///
    /// `EngineError::Closed` once the engine is closed.
    pub fn schedule(
        &self,
        delay: Duration,
        executor: Arc<dyn TaskExecutor>,
        args: Vec<TaskArg>,
    ) -> EngineResult<Appointment> {
        self.scheduler()?.schedule(delay, executor, args)
    }

    /// Schedule `computation` on the pool-bound scheduler.
    ///
    /// # Errors
    ///
    /// `EngineError::Closed` once the engine is closed.
    pub fn schedule_fn<F, T>(
        &self,
        delay: Duration,
        computation: F,
    ) -> EngineResult<(Appointment, FutureHandle<T>)>
    where
        F: Fn() -> AppResult<T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        self.scheduler()?.schedule_fn(delay, computation)
    }

    /// Whether any built pool or scheduler still has work.
    ///
    /// Components that were never built count as idle.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.pool.get().is_some_and(|pool| pool.is_busy())
            || self.scheduler.get().is_some_and(|s| s.is_busy())
            || self.simple_scheduler.get().is_some_and(|s| s.is_busy())
    }

    /// Block until [`is_busy`](Self::is_busy) is false, checking every `poll`.
    pub fn wait_if_busy(&self, poll: Duration) {
        while self.is_busy() {
            thread::sleep(poll);
        }
    }

    /// [`wait_if_busy`](Self::wait_if_busy), then [`close`](Self::close).
    pub fn wait_if_busy_then_close(&self, poll: Duration) {
        self.wait_if_busy(poll);
        self.close();
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the schedulers, then the pool, then the event manager.
    /// Idempotent and non-blocking.
    pub fn close(&self) {
        let _init = self.init.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(scheduler) = self.scheduler.get() {
            scheduler.close();
        }
        if let Some(scheduler) = self.simple_scheduler.get() {
            scheduler.close();
        }
        if let Some(pool) = self.pool.get() {
            pool.close();
        }
        if let Some(events) = self.events.get() {
            events.close();
        }
        info!(engine_id = %self.id, "Engine closed");
    }

    /// Close, then join every built component's threads within `grace` each.
    pub fn shutdown(&self, grace: Duration) {
        self.close();
        if let Some(scheduler) = self.scheduler.get() {
            scheduler.shutdown(grace);
        }
        if let Some(scheduler) = self.simple_scheduler.get() {
            scheduler.shutdown(grace);
        }
        if let Some(pool) = self.pool.get() {
            pool.shutdown(grace);
        }
    }

    /// Serializable snapshot for telemetry.
    #[must_use]
    pub fn properties(&self) -> EngineProperties {
        EngineProperties {
            instance_id: self.id,
            config: self.config(),
            frozen: self.is_frozen(),
            closed: self.is_closed(),
            pool: self.pool.get().map(|pool| pool.properties()),
            scheduler: self.scheduler.get().map(|s| s.properties()),
            simple_scheduler: self.simple_scheduler.get().map(|s| s.properties()),
            events: self.events.get().map(|e| e.properties()),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("id", &self.id)
            .field("frozen", &self.is_frozen())
            .field("closed", &self.is_closed())
            .finish()
    }
}
