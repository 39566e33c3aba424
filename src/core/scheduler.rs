//! Appointment scheduler: a single thread releasing tasks at their due time.
//!
//! Appointments live in an ordered map keyed by absolute expiration in
//! monotonic nanoseconds. A key collision is resolved by nudging the
//! appointment's high-resolution offset forward one nanosecond at a time,
//! so two appointments due at the same instant both stay in the map and
//! both fire.
//!
//! When due, an appointment's task is submitted to the bound
//! [`WorkerPool`], or, for a simple scheduler with no pool, run inline on
//! the scheduler thread before the next appointment is considered.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::core::error::{AppResult, EngineError, EngineResult, TaskFailure};
use crate::core::executor::TaskExecutor;
use crate::core::future::{FutureHandle, FutureTask};
use crate::core::task::{Task, TaskArg, TaskRef};
use crate::core::worker_pool::WorkerPool;
use crate::util::clock::{duration_to_nanos, monotonic_nanos};
use crate::util::thread::join_with_timeout;

/// Key value meaning "not in the appointment map".
const NOT_PENDING: u64 = u64::MAX;

/// Longest delay honoured; keeps keys clear of `NOT_PENDING`.
const MAX_DELAY_NANOS: u64 = u64::MAX / 4;

/// Supplies the delay for paced scheduling.
pub trait RateController: Send + Sync {
    /// Delay before the next permitted run.
    fn next_wait(&self) -> Duration;
}

/// Paces successive reservations `1 / rate` seconds apart.
#[derive(Debug)]
pub struct FixedRate {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl FixedRate {
    /// Allow `rate` runs per second.
    ///
    /// # Errors
    ///
    /// `EngineError::InvalidConfig` unless `rate` is finite and positive.
    pub fn per_second(rate: f64) -> EngineResult<Self> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "rate must be a positive number, got {rate}"
            )));
        }
        Self::with_interval(Duration::from_secs_f64(1.0 / rate))
    }

    /// Space runs by `interval`.
    ///
    /// # Errors
    ///
    /// `EngineError::InvalidConfig` if `interval` is zero.
    pub fn with_interval(interval: Duration) -> EngineResult<Self> {
        if interval.is_zero() {
            return Err(EngineError::InvalidConfig(
                "rate interval must be greater than 0".into(),
            ));
        }
        Ok(Self {
            interval,
            next_slot: Mutex::new(None),
        })
    }

    /// Spacing between runs.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

impl RateController for FixedRate {
    fn next_wait(&self) -> Duration {
        let now = Instant::now();
        let mut next = self.next_slot.lock();
        let slot = match *next {
            Some(slot) if slot > now => slot,
            _ => now,
        };
        *next = Some(slot + self.interval);
        slot - now
    }
}

/// Mutable appointment state. Writes happen under the scheduler's map lock.
#[derive(Debug)]
struct AppointmentState {
    delay_nanos: AtomicU64,
    offset_nanos: AtomicU64,
    key: AtomicU64,
    fired: AtomicU64,
    closed: AtomicBool,
}

impl AppointmentState {
    fn new(delay: Duration) -> Self {
        Self {
            delay_nanos: AtomicU64::new(clamp_delay(delay)),
            offset_nanos: AtomicU64::new(0),
            key: AtomicU64::new(NOT_PENDING),
            fired: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }
}

fn clamp_delay(delay: Duration) -> u64 {
    duration_to_nanos(delay).min(MAX_DELAY_NANOS)
}

/// First collision-free `(offset, key)` at or after `offset`.
fn unique_key<V>(set: &BTreeMap<u64, V>, mut offset: u64, delay: u64) -> (u64, u64) {
    let mut key = offset.saturating_add(delay);
    while set.contains_key(&key) {
        offset += 1;
        key = offset.saturating_add(delay);
    }
    (offset, key)
}

struct Scheduled {
    state: Arc<AppointmentState>,
    task: TaskRef,
}

struct SchedulerShared {
    id: Uuid,
    config: SchedulerConfig,
    set: Mutex<BTreeMap<u64, Scheduled>>,
    wake: Condvar,
    live: AtomicBool,
    pool: Option<Arc<WorkerPool>>,
    dispatching: AtomicUsize,
    scheduled: AtomicU64,
    dispatched: AtomicU64,
}

impl SchedulerShared {
    /// Insert under the map lock. Returns `true` if it is now the earliest.
    fn insert_locked(&self, set: &mut BTreeMap<u64, Scheduled>, entry: Scheduled) -> bool {
        let delay = entry.state.delay_nanos.load(Ordering::Acquire);
        let (offset, key) = unique_key(set, monotonic_nanos(), delay);
        entry.state.offset_nanos.store(offset, Ordering::Release);
        entry.state.key.store(key, Ordering::Release);
        set.insert(key, entry);
        set.first_key_value().is_some_and(|(first, _)| *first == key)
    }

    fn schedule(&self, delay: Duration, task: TaskRef) -> EngineResult<Arc<AppointmentState>> {
        let state = Arc::new(AppointmentState::new(delay));
        let mut set = self.set.lock();
        if !self.live.load(Ordering::Acquire) {
            return Err(EngineError::Closed("appointment scheduler"));
        }

        let task_id = task.id();
        let earliest = self.insert_locked(
            &mut set,
            Scheduled {
                state: Arc::clone(&state),
                task,
            },
        );
        if earliest {
            self.wake.notify_one();
        }
        drop(set);

        self.scheduled.fetch_add(1, Ordering::Relaxed);
        debug!(scheduler = %self.config.name, task_id, delay = ?delay, "Appointment scheduled");
        Ok(state)
    }

    fn cancel(&self, state: &AppointmentState) -> bool {
        let mut set = self.set.lock();
        let key = state.key.swap(NOT_PENDING, Ordering::AcqRel);
        if key == NOT_PENDING {
            return false;
        }
        let removed = set.remove(&key).is_some();
        self.wake.notify_one();
        removed
    }

    fn reset(
        &self,
        state: &Arc<AppointmentState>,
        task: &TaskRef,
        delay: Option<Duration>,
        run_once: bool,
    ) -> bool {
        let mut set = self.set.lock();
        if !self.live.load(Ordering::Acquire) || state.closed.load(Ordering::Acquire) {
            return false;
        }
        if run_once && state.fired.load(Ordering::Acquire) > 0 {
            return false;
        }

        let key = state.key.swap(NOT_PENDING, Ordering::AcqRel);
        if key != NOT_PENDING {
            set.remove(&key);
        }
        if let Some(delay) = delay {
            state.delay_nanos.store(clamp_delay(delay), Ordering::Release);
        }
        self.insert_locked(
            &mut set,
            Scheduled {
                state: Arc::clone(state),
                task: Arc::clone(task),
            },
        );
        self.wake.notify_one();
        true
    }

    fn close_appointment(&self, state: &AppointmentState) {
        let mut set = self.set.lock();
        state.closed.store(true, Ordering::Release);
        let key = state.key.swap(NOT_PENDING, Ordering::AcqRel);
        if key == NOT_PENDING {
            return;
        }
        if let Some(entry) = set.remove(&key) {
            self.wake.notify_one();
            drop(set);
            entry.task.abandon(self.discard_failure());
        }
    }

    fn discard_failure(&self) -> TaskFailure {
        TaskFailure::discarded(&format!("appointment scheduler `{}`", self.config.name))
    }

    /// Empty the appointment map, settling every task it held.
    fn discard_pending(&self, set: &mut BTreeMap<u64, Scheduled>) {
        if set.is_empty() {
            return;
        }
        let pending = std::mem::take(set);
        warn!(
            scheduler = %self.config.name,
            discarded = pending.len(),
            "Pending appointments discarded on close"
        );
        for entry in pending.into_values() {
            entry.state.key.store(NOT_PENDING, Ordering::Release);
            entry.task.abandon(self.discard_failure());
        }
    }

    fn dispatch(&self, entry: Scheduled) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        let task_id = entry.task.id();
        match &self.pool {
            Some(pool) => {
                if let Err(err) = pool.submit(Arc::clone(&entry.task)) {
                    warn!(scheduler = %self.config.name, task_id, error = %err, "Appointment dropped");
                    entry.task.abandon(self.discard_failure());
                }
            }
            None => {
                entry.task.run();
            }
        }
    }
}

/// Handle to a scheduled appointment.
///
/// Handles do not keep the scheduler alive; once it is gone every
/// operation is a no-op.
#[derive(Clone)]
pub struct Appointment {
    state: Arc<AppointmentState>,
    task: TaskRef,
    scheduler: Weak<SchedulerShared>,
}

impl Appointment {
    /// Remove the appointment if it has not fired yet.
    ///
    /// Returns `true` if it was pending and is now guaranteed not to run.
    pub fn cancel(&self) -> bool {
        self.scheduler
            .upgrade()
            .is_some_and(|shared| shared.cancel(&self.state))
    }

    /// Re-arm with the current delay measured from now.
    ///
    /// With `run_once`, an appointment that already fired is left alone
    /// and `false` is returned. Closed appointments never re-arm.
    pub fn reset(&self, run_once: bool) -> bool {
        self.rearm(None, run_once)
    }

    /// Re-arm with a new delay measured from now.
    pub fn reset_with_delay(&self, delay: Duration, run_once: bool) -> bool {
        self.rearm(Some(delay), run_once)
    }

    fn rearm(&self, delay: Option<Duration>, run_once: bool) -> bool {
        self.scheduler
            .upgrade()
            .is_some_and(|shared| shared.reset(&self.state, &self.task, delay, run_once))
    }

    /// Cancel and make the appointment permanently inert.
    ///
    /// A still-pending task is settled as discarded, so its result
    /// handles stop waiting. A merely cancelled one can be re-armed
    /// and is left untouched.
    pub fn close(&self) {
        if let Some(shared) = self.scheduler.upgrade() {
            shared.close_appointment(&self.state);
        } else {
            self.state.closed.store(true, Ordering::Release);
        }
    }

    /// Whether the appointment is waiting to fire.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state.key.load(Ordering::Acquire) != NOT_PENDING
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }

    /// How many times the appointment has fired.
    #[must_use]
    pub fn fire_count(&self) -> u64 {
        self.state.fired.load(Ordering::Acquire)
    }

    /// Configured delay.
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_nanos(self.state.delay_nanos.load(Ordering::Acquire))
    }

    /// Absolute expiration in monotonic nanoseconds, while pending.
    #[must_use]
    pub fn expiration_nanos(&self) -> Option<u64> {
        let key = self.state.key.load(Ordering::Acquire);
        (key != NOT_PENDING).then_some(key)
    }

    /// The task released when the appointment fires.
    #[must_use]
    pub const fn task(&self) -> &TaskRef {
        &self.task
    }
}

impl std::fmt::Debug for Appointment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Appointment")
            .field("task_id", &self.task.id())
            .field("delay", &self.delay())
            .field("pending", &self.is_pending())
            .field("fired", &self.fire_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Serializable snapshot of a scheduler for telemetry.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerProperties {
    /// Scheduler instance identifier.
    pub instance_id: Uuid,
    /// Scheduler name.
    pub name: String,
    /// Appointments waiting to fire.
    pub pending: usize,
    /// Appointments ever scheduled.
    pub scheduled: u64,
    /// Appointments ever fired.
    pub dispatched: u64,
    /// Milliseconds until the next appointment fires.
    pub next_due_ms: Option<u64>,
    /// Pool receiving due tasks, if any.
    pub bound_pool: Option<Uuid>,
    /// Whether the scheduler accepts appointments.
    pub live: bool,
}

/// Single-threaded scheduler of delayed tasks.
pub struct AppointmentScheduler {
    shared: Arc<SchedulerShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl AppointmentScheduler {
    /// Scheduler that runs due tasks inline on its own thread.
    ///
    /// # Errors
    ///
    /// `EngineError::InvalidConfig` or `EngineError::Spawn`.
    pub fn simple(config: SchedulerConfig) -> EngineResult<Self> {
        Self::start(config, None)
    }

    /// Scheduler that submits due tasks to `pool`.
    ///
    /// # Errors
    ///
    /// `EngineError::InvalidConfig` or `EngineError::Spawn`.
    pub fn with_pool(config: SchedulerConfig, pool: Arc<WorkerPool>) -> EngineResult<Self> {
        Self::start(config, Some(pool))
    }

    fn start(config: SchedulerConfig, pool: Option<Arc<WorkerPool>>) -> EngineResult<Self> {
        config.validate().map_err(EngineError::InvalidConfig)?;

        let shared = Arc::new(SchedulerShared {
            id: Uuid::new_v4(),
            config,
            set: Mutex::new(BTreeMap::new()),
            wake: Condvar::new(),
            live: AtomicBool::new(true),
            pool,
            dispatching: AtomicUsize::new(0),
            scheduled: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
        });

        let name = shared.config.name.clone();
        let runner = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(name.clone())
            .stack_size(shared.config.thread_stack_size)
            .spawn(move || run_loop(&runner))
            .map_err(|source| EngineError::Spawn { name, source })?;

        info!(
            scheduler = %shared.config.name,
            scheduler_id = %shared.id,
            inline = shared.pool.is_none(),
            "AppointmentScheduler started"
        );

        Ok(Self {
            shared,
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Scheduler instance identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Scheduler name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Pool receiving due tasks, if any.
    #[must_use]
    pub fn bound_pool(&self) -> Option<&Arc<WorkerPool>> {
        self.shared.pool.as_ref()
    }

    /// Schedule `executor` with `args` to run after `delay`.
    ///
    /// # Errors
    ///
    /// `EngineError::Closed` once the scheduler has been closed.
    pub fn schedule(
        &self,
        delay: Duration,
        executor: Arc<dyn TaskExecutor>,
        args: Vec<TaskArg>,
    ) -> EngineResult<Appointment> {
        self.schedule_task(delay, Task::new(executor, args))
    }

    /// Schedule an existing task to run after `delay`.
    ///
    /// # Errors
    ///
    /// `EngineError::Closed` once the scheduler has been closed.
    pub fn schedule_task(&self, delay: Duration, task: TaskRef) -> EngineResult<Appointment> {
        let state = self.shared.schedule(delay, Arc::clone(&task))?;
        Ok(Appointment {
            state,
            task,
            scheduler: Arc::downgrade(&self.shared),
        })
    }

    /// Schedule a computation and get a handle to its result.
    ///
    /// # Errors
    ///
    /// `EngineError::Closed` once the scheduler has been closed.
    pub fn schedule_fn<F, T>(
        &self,
        delay: Duration,
        computation: F,
    ) -> EngineResult<(Appointment, FutureHandle<T>)>
    where
        F: Fn() -> AppResult<T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        let (task, handle) = FutureTask::new(computation).into_task();
        Ok((self.schedule_task(delay, task)?, handle))
    }

    /// Schedule `action` after the delay chosen by `pacer`.
    ///
    /// # Errors
    ///
    /// `EngineError::Closed` once the scheduler has been closed.
    pub fn schedule_paced<A>(&self, pacer: &dyn RateController, action: A) -> EngineResult<Appointment>
    where
        A: Fn() + Send + Sync + 'static,
    {
        let (task, _handle) = FutureTask::from_action(action, ()).into_task();
        self.schedule_task(pacer.next_wait(), task)
    }

    /// Cancel `appointment` if it is still pending.
    pub fn cancel(&self, appointment: &Appointment) -> bool {
        self.shared.cancel(&appointment.state)
    }

    /// Appointments waiting to fire.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.set.lock().len()
    }

    /// Time until the earliest appointment fires, if any is pending.
    #[must_use]
    pub fn time_until_next(&self) -> Option<Duration> {
        let set = self.shared.set.lock();
        let (due, _) = set.first_key_value()?;
        Some(Duration::from_nanos(due.saturating_sub(monotonic_nanos())))
    }

    /// Whether appointments are pending or one is being dispatched.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.pending_count() > 0 || self.shared.dispatching.load(Ordering::Acquire) > 0
    }

    /// Whether the scheduler accepts appointments.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.shared.live.load(Ordering::Acquire)
    }

    /// Serializable snapshot for telemetry.
    #[must_use]
    pub fn properties(&self) -> SchedulerProperties {
        let next_due = self.time_until_next();
        SchedulerProperties {
            instance_id: self.shared.id,
            name: self.shared.config.name.clone(),
            pending: self.pending_count(),
            scheduled: self.shared.scheduled.load(Ordering::Relaxed),
            dispatched: self.shared.dispatched.load(Ordering::Relaxed),
            next_due_ms: next_due.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            bound_pool: self.shared.pool.as_ref().map(|pool| pool.id()),
            live: self.is_live(),
        }
    }

    /// Stop the scheduler thread. Idempotent.
    ///
    /// Appointments still pending never fire; their tasks are settled with
    /// a [`FailureKind::Discarded`](crate::core::FailureKind::Discarded)
    /// failure.
    pub fn close(&self) {
        if !self.shared.live.swap(false, Ordering::AcqRel) {
            return;
        }
        let mut set = self.shared.set.lock();
        self.shared.discard_pending(&mut set);
        self.shared.wake.notify_all();
        info!(scheduler = %self.shared.config.name, "Closing appointment scheduler");
    }

    /// Close and join the scheduler thread, detaching it after `grace`.
    pub fn shutdown(&self, grace: Duration) {
        self.close();
        if let Some(handle) = self.thread.lock().take() {
            join_with_timeout(handle, grace, &self.shared.config.name);
        }
    }
}

impl Drop for AppointmentScheduler {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for AppointmentScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppointmentScheduler")
            .field("id", &self.shared.id)
            .field("name", &self.shared.config.name)
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Fire every due appointment, then sleep until the next one or a wake-up.
fn run_loop(shared: &SchedulerShared) {
    let tick = shared.config.tick();
    let mut set = shared.set.lock();

    while shared.live.load(Ordering::Acquire) {
        let now = monotonic_nanos();
        match set.first_key_value().map(|(due, _)| *due) {
            Some(due) if due <= now => {
                let Some((_, entry)) = set.pop_first() else {
                    continue;
                };
                entry.state.key.store(NOT_PENDING, Ordering::Release);
                entry.state.fired.fetch_add(1, Ordering::AcqRel);
                shared.dispatching.fetch_add(1, Ordering::AcqRel);
                MutexGuard::unlocked(&mut set, || shared.dispatch(entry));
                shared.dispatching.fetch_sub(1, Ordering::AcqRel);
            }
            Some(due) => {
                let wait = Duration::from_nanos(due - now).min(tick);
                shared.wake.wait_for(&mut set, wait);
            }
            None => {
                shared.wake.wait_for(&mut set, tick);
            }
        }
    }

    shared.discard_pending(&mut set);
    debug!(scheduler = %shared.config.name, "Scheduler thread exiting");
}
