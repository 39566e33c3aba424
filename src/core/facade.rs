//! Process-wide default [`Engine`].
//!
//! Prefer passing an explicit [`Engine`] to collaborators. This module
//! exists for hosts that want one shared engine per process: the first
//! caller's configuration wins and later [`configure`] calls are refused.
//!
//! The `set_*` functions adjust the pending configuration without building
//! the engine. Once it exists they forward to the engine's own setters,
//! which refuse changes after the pool has been built.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::{const_mutex, Mutex};
use tracing::warn;

use super::engine::Engine;
use super::error::{AppResult, EngineResult};
use super::executor::TaskExecutor;
use super::future::FutureHandle;
use super::scheduler::Appointment;
use super::task::{TaskArg, TaskRef};
use crate::config::EngineConfig;

static ENGINE: OnceLock<Engine> = OnceLock::new();
static PENDING_CONFIG: Mutex<Option<EngineConfig>> = const_mutex(None);

/// Configure the process-wide engine before its first use.
///
/// Returns `false` if the engine already exists or `config` is invalid.
pub fn configure(config: EngineConfig) -> bool {
    let mut pending = PENDING_CONFIG.lock();
    if ENGINE.get().is_some() || config.validate().is_err() {
        return false;
    }
    *pending = Some(config);
    true
}

/// The process-wide engine, created on first call.
///
/// Built from the [`configure`]d value, else the environment, else
/// defaults.
pub fn engine() -> &'static Engine {
    if let Some(engine) = ENGINE.get() {
        return engine;
    }
    // Held across construction so no setter lands between take and build.
    let mut pending = PENDING_CONFIG.lock();
    ENGINE.get_or_init(|| {
        let config = pending.take().unwrap_or_else(base_config);
        Engine::new(config).unwrap_or_else(|err| {
            warn!(error = %err, "Invalid engine configuration, using defaults");
            Engine::unvalidated(EngineConfig::default())
        })
    })
}

/// Whether the process-wide engine has been created.
#[must_use]
pub fn is_initialized() -> bool {
    ENGINE.get().is_some()
}

/// Set the queue size of the process-wide pool.
///
/// Returns `false` if the value is invalid or the pool already exists.
pub fn set_queue_size(size: usize) -> bool {
    adjust(|c| c.queue_size = size, |e| e.set_queue_size(size))
}

/// Set the per-CPU thread multiplier of the process-wide pool.
///
/// Returns `false` if the value is invalid or the pool already exists.
pub fn set_thread_multiplier(multiplier: usize) -> bool {
    adjust(
        |c| c.thread_multiplier = multiplier,
        |e| e.set_thread_multiplier(multiplier),
    )
}

/// Set an explicit worker count for the process-wide pool.
///
/// Returns `false` if the value is invalid or the pool already exists.
pub fn set_thread_count(count: usize) -> bool {
    adjust(|c| c.thread_count = Some(count), |e| e.set_thread_count(count))
}

/// Set the floor for the process-wide pool's derived worker count.
///
/// Returns `false` if the value is invalid or the pool already exists.
pub fn set_min_threads(min: usize) -> bool {
    adjust(|c| c.min_threads = min, |e| e.set_min_threads(min))
}

fn base_config() -> EngineConfig {
    EngineConfig::from_env().unwrap_or_else(|reason| {
        warn!(%reason, "Ignoring engine environment, using defaults");
        EngineConfig::default()
    })
}

fn adjust<A, E>(apply: A, on_engine: E) -> bool
where
    A: FnOnce(&mut EngineConfig),
    E: FnOnce(&Engine) -> bool,
{
    let mut pending = PENDING_CONFIG.lock();
    if let Some(engine) = ENGINE.get() {
        drop(pending);
        return on_engine(engine);
    }

    let mut candidate = pending.as_ref().cloned().unwrap_or_else(base_config);
    apply(&mut candidate);
    if candidate.validate().is_err() {
        return false;
    }
    *pending = Some(candidate);
    true
}

/// Submit a task to the process-wide pool.
///
/// # Errors
///
/// See [`Engine::submit`].
pub fn submit(task: TaskRef) -> EngineResult<()> {
    engine().submit(task)
}

/// Run `action` on the process-wide pool.
///
/// # Errors
///
/// See [`Engine::execute`].
pub fn execute<A>(action: A) -> EngineResult<FutureHandle<()>>
where
    A: Fn() + Send + Sync + 'static,
{
    engine().execute(action)
}

/// Run `computation` on the process-wide pool.
///
/// # Errors
///
/// See [`Engine::submit_fn`].
pub fn submit_fn<F, T>(computation: F) -> EngineResult<FutureHandle<T>>
where
    F: Fn() -> AppResult<T> + Send + Sync + 'static,
    T: Send + 'static,
{
    engine().submit_fn(computation)
}

/// Schedule on the process-wide pool-bound scheduler.
///
/// # Errors
///
/// See [`Engine::schedule`].
pub fn schedule(
    delay: Duration,
    executor: Arc<dyn TaskExecutor>,
    args: Vec<TaskArg>,
) -> EngineResult<Appointment> {
    engine().schedule(delay, executor, args)
}

/// Whether the process-wide engine has work in flight.
#[must_use]
pub fn is_busy() -> bool {
    ENGINE.get().is_some_and(Engine::is_busy)
}

/// Block until the process-wide engine is idle.
pub fn wait_if_busy(poll: Duration) {
    if let Some(engine) = ENGINE.get() {
        engine.wait_if_busy(poll);
    }
}

/// Wait until idle, then close the process-wide engine.
pub fn wait_if_busy_then_close(poll: Duration) {
    if let Some(engine) = ENGINE.get() {
        engine.wait_if_busy_then_close(poll);
    }
}

/// Close the process-wide engine. It stays closed for the process lifetime.
pub fn close() {
    if let Some(engine) = ENGINE.get() {
        engine.close();
    }
}
