//! `WorkerPool` on dedicated OS threads.
//!
//! # Design
//!
//! - **Backpressure**: submitters block on the watermark queue, never on workers
//! - **Mailboxes**: each worker owns a `bounded(1)` channel; only the dispatcher sends
//! - **Idle registry**: a channel of worker indices, so "first idle worker" is FIFO
//! - **Clean shutdown**: the dispatcher drops every mailbox sender on exit,
//!   which unblocks idle workers; busy workers finish their task first

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::WorkerPoolConfig;
use crate::core::error::{AppResult, EngineError, EngineResult, TaskFailure};
use crate::core::future::{FutureHandle, FutureTask};
use crate::core::task::TaskRef;
use crate::infra::WatermarkQueue;
use crate::util::thread::join_with_timeout;

use super::{PoolCounters, PoolProperties, PoolStats, WorkerCounters, WorkerSnapshot};

/// State shared by the pool handle, the dispatcher and the workers.
struct PoolShared {
    id: Uuid,
    config: WorkerPoolConfig,
    queue: WatermarkQueue<TaskRef>,
    idle_tx: Sender<usize>,
    idle_rx: Receiver<usize>,
    /// Pool accepts submissions.
    live: AtomicBool,
    /// Workers keep serving; cleared by the dispatcher on its way out.
    running: AtomicBool,
    /// Tasks dequeued by the dispatcher but not yet handed to a worker.
    in_dispatch: AtomicUsize,
    /// Tasks submitted and not yet finished or discarded.
    outstanding: AtomicUsize,
    counters: PoolCounters,
    workers: Vec<WorkerCounters>,
}

impl PoolShared {
    /// Settle a task that will never reach a worker.
    fn discard(&self, task: &TaskRef) {
        task.abandon(TaskFailure::discarded(&format!(
            "worker pool `{}`",
            self.config.name
        )));
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Worker pool with a dispatcher thread and a fixed set of worker threads.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create a pool and start all of its threads.
    ///
    /// Every worker is started eagerly and registered as idle.
    ///
    /// # Errors
    ///
    /// - `EngineError::InvalidConfig` if the configuration is invalid; no
    ///   thread has been started in that case
    /// - `EngineError::Spawn` if a thread could not be started
    pub fn new(config: WorkerPoolConfig) -> EngineResult<Self> {
        config.validate().map_err(EngineError::InvalidConfig)?;

        let queue = WatermarkQueue::with_marks(
            config.queue_capacity,
            config.high_mark(),
            config.low_mark(),
        )?
        .with_poll_interval(config.poll_interval());

        let worker_count = config.worker_count;
        let (idle_tx, idle_rx) = bounded(worker_count);
        for index in 0..worker_count {
            idle_tx
                .send(index)
                .map_err(|_| EngineError::Closed("worker pool"))?;
        }

        let shared = Arc::new(PoolShared {
            id: Uuid::new_v4(),
            workers: (0..worker_count).map(|_| WorkerCounters::default()).collect(),
            config,
            queue,
            idle_tx,
            idle_rx,
            live: AtomicBool::new(true),
            running: AtomicBool::new(true),
            in_dispatch: AtomicUsize::new(0),
            outstanding: AtomicUsize::new(0),
            counters: PoolCounters::default(),
        });

        let mut mailboxes = Vec::with_capacity(worker_count);
        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let (tx, rx) = bounded::<TaskRef>(1);
            workers.push(spawn_worker(index, rx, Arc::clone(&shared))?);
            mailboxes.push(tx);
        }
        let dispatcher = spawn_dispatcher(Arc::clone(&shared), mailboxes)?;

        info!(
            pool = %shared.config.name,
            pool_id = %shared.id,
            worker_count,
            queue_capacity = shared.config.queue_capacity,
            high_mark = shared.queue.high_mark(),
            low_mark = shared.queue.low_mark(),
            "WorkerPool started"
        );

        Ok(Self {
            shared,
            dispatcher: Mutex::new(Some(dispatcher)),
            workers: Mutex::new(workers),
        })
    }

    /// Pool instance identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Configuration the pool was built with.
    #[must_use]
    pub fn config(&self) -> &WorkerPoolConfig {
        &self.shared.config
    }

    /// Submit a task.
    ///
    /// Blocks while the pending queue is throttled by its watermarks.
    ///
    /// # Errors
    ///
    /// `EngineError::Closed` if the pool has been closed, including while
    /// this call was blocked.
    pub fn submit(&self, task: TaskRef) -> EngineResult<()> {
        if !self.is_live() {
            return Err(EngineError::Closed("worker pool"));
        }

        let task_id = task.id();
        self.shared.outstanding.fetch_add(1, Ordering::AcqRel);
        if self.shared.queue.enqueue(task).is_err() {
            self.shared.outstanding.fetch_sub(1, Ordering::AcqRel);
            return Err(EngineError::Closed("worker pool"));
        }

        self.shared.counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);
        debug!(pool = %self.shared.config.name, task_id, "Task submitted");
        Ok(())
    }

    /// Run `action` on the pool.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit).
    pub fn execute<A>(&self, action: A) -> EngineResult<FutureHandle<()>>
    where
        A: Fn() + Send + Sync + 'static,
    {
        self.submit_future(FutureTask::from_action(action, ()))
    }

    /// Run `action` on the pool; the handle yields `value` once it completes.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit).
    pub fn execute_with_result<A, T>(&self, action: A, value: T) -> EngineResult<FutureHandle<T>>
    where
        A: Fn() + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        self.submit_future(FutureTask::from_action(action, value))
    }

    /// Run `computation` on the pool and return a handle to its result.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit).
    pub fn submit_fn<F, T>(&self, computation: F) -> EngineResult<FutureHandle<T>>
    where
        F: Fn() -> AppResult<T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        self.submit_future(FutureTask::new(computation))
    }

    fn submit_future<T: Send + 'static>(&self, future: FutureTask<T>) -> EngineResult<FutureHandle<T>> {
        let (task, handle) = future.into_task();
        self.submit(task)?;
        Ok(handle)
    }

    /// Tasks waiting for a worker, including one the dispatcher may hold.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.queue.len() + self.shared.in_dispatch.load(Ordering::Acquire)
    }

    /// Idle workers.
    #[must_use]
    pub fn available_workers(&self) -> usize {
        self.shared.idle_rx.len()
    }

    /// Number of worker threads.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.shared.config.worker_count
    }

    /// Whether work is pending or any worker is busy.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.shared.outstanding.load(Ordering::Acquire) > 0
            || self.pending_count() > 0
            || self.available_workers() < self.worker_count()
    }

    /// Whether the pool still accepts work.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.shared.live.load(Ordering::Acquire)
    }

    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let worker_count = self.worker_count();
        let busy = worker_count.saturating_sub(self.available_workers());
        self.shared
            .counters
            .snapshot(worker_count, busy, self.pending_count())
    }

    /// Per-worker call counts and busy time.
    #[must_use]
    pub fn worker_stats(&self) -> Vec<WorkerSnapshot> {
        self.shared
            .workers
            .iter()
            .enumerate()
            .map(|(index, counters)| counters.snapshot(index))
            .collect()
    }

    /// Serializable snapshot for telemetry.
    #[must_use]
    pub fn properties(&self) -> PoolProperties {
        let stats = self.stats();
        PoolProperties {
            instance_id: self.shared.id,
            name: self.shared.config.name.clone(),
            worker_count: stats.worker_count,
            queue_capacity: self.shared.queue.capacity(),
            high_mark: self.shared.queue.high_mark(),
            low_mark: self.shared.queue.low_mark(),
            pending: stats.pending_tasks,
            available_workers: self.available_workers(),
            total_enqueued: self.shared.queue.total_enqueued(),
            executed: stats.completed_tasks,
            failed: stats.failed_tasks,
            live: self.is_live(),
        }
    }

    /// Stop accepting work and wake the dispatcher. Idempotent.
    ///
    /// Running tasks are not interrupted. Tasks still queued are discarded:
    /// each records a [`FailureKind::Discarded`](crate::core::FailureKind::Discarded)
    /// failure so its waiters wake.
    pub fn close(&self) {
        if !self.shared.live.swap(false, Ordering::AcqRel) {
            return;
        }

        let discarded = self.shared.queue.close();
        if !discarded.is_empty() {
            warn!(
                pool = %self.shared.config.name,
                discarded = discarded.len(),
                "Pending tasks discarded on close"
            );
            for task in &discarded {
                self.shared.discard(task);
            }
        }
        info!(pool = %self.shared.config.name, "Closing worker pool");
    }

    /// Close the pool and join its threads.
    ///
    /// Threads still running after `grace` are detached.
    pub fn shutdown(&self, grace: Duration) {
        self.close();
        let deadline = Instant::now() + grace;

        if let Some(handle) = self.dispatcher.lock().take() {
            join_with_timeout(
                handle,
                deadline.saturating_duration_since(Instant::now()),
                "dispatcher",
            );
        }

        let mut workers = self.workers.lock();
        let worker_count = workers.len();
        for handle in workers.drain(..) {
            join_with_timeout(
                handle,
                deadline.saturating_duration_since(Instant::now()),
                "worker",
            );
        }

        info!(
            pool = %self.shared.config.name,
            worker_count,
            "Worker pool shut down"
        );
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Signal only; joining here could hang on long-running tasks.
        self.close();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("id", &self.shared.id)
            .field("name", &self.shared.config.name)
            .field("stats", &self.stats())
            .finish()
    }
}

fn spawn_dispatcher(
    shared: Arc<PoolShared>,
    mailboxes: Vec<Sender<TaskRef>>,
) -> EngineResult<JoinHandle<()>> {
    let name = format!("{}-dispatcher", shared.config.name);
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || dispatch_loop(&shared, mailboxes))
        .map_err(|source| EngineError::Spawn { name, source })
}

/// Match pending tasks to idle workers until the pool is closed.
fn dispatch_loop(shared: &PoolShared, mailboxes: Vec<Sender<TaskRef>>) {
    let tick = shared.config.poll_interval();
    debug!(pool = %shared.config.name, "Dispatcher started");

    while shared.live.load(Ordering::Acquire) {
        let Some(task) = shared.queue.dequeue() else {
            continue;
        };
        shared.in_dispatch.fetch_add(1, Ordering::AcqRel);

        let mut held = Some(task);
        while let Some(task) = held.take() {
            match shared.idle_rx.recv_timeout(tick) {
                Ok(index) => {
                    let task_id = task.id();
                    match mailboxes[index].send(task) {
                        Ok(()) => debug!(worker_id = index, task_id, "Task dispatched"),
                        Err(err) => {
                            error!(worker_id = index, "Worker mailbox disconnected");
                            held = Some(err.into_inner());
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) if shared.live.load(Ordering::Acquire) => {
                    held = Some(task);
                }
                Err(_) => {
                    warn!(task_id = task.id(), "Task abandoned: pool closed while waiting for a worker");
                    shared.discard(&task);
                }
            }
        }
        shared.in_dispatch.fetch_sub(1, Ordering::AcqRel);
    }

    shared.running.store(false, Ordering::Release);
    // Dropping the senders wakes every idle worker.
    drop(mailboxes);
    debug!(pool = %shared.config.name, "Dispatcher stopped");
}

fn spawn_worker(
    index: usize,
    mailbox: Receiver<TaskRef>,
    shared: Arc<PoolShared>,
) -> EngineResult<JoinHandle<()>> {
    let name = format!("{}-worker-{index}", shared.config.name);
    thread::Builder::new()
        .name(name.clone())
        .stack_size(shared.config.thread_stack_size)
        .spawn(move || worker_loop(index, &mailbox, &shared))
        .map_err(|source| EngineError::Spawn { name, source })
}

/// Serve mailbox deliveries until the dispatcher goes away.
fn worker_loop(index: usize, mailbox: &Receiver<TaskRef>, shared: &PoolShared) {
    let tick = shared.config.poll_interval();
    debug!(worker_id = index, "Worker thread started");

    loop {
        match mailbox.recv_timeout(tick) {
            Ok(task) => {
                let started = Instant::now();
                let succeeded = task.run();
                drop(task);

                shared.workers[index].record(started.elapsed());
                shared.counters.completed_tasks.fetch_add(1, Ordering::Relaxed);
                if !succeeded {
                    shared.counters.failed_tasks.fetch_add(1, Ordering::Relaxed);
                }
                shared.outstanding.fetch_sub(1, Ordering::AcqRel);

                if shared.idle_tx.send(index).is_err() {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if !shared.running.load(Ordering::Acquire) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!(worker_id = index, "Worker thread exiting");
}
