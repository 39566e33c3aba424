//! Engine-wide configuration: sizing of the default pool and schedulers.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::pool::{SchedulerConfig, WorkerPoolConfig, DEFAULT_TICK_MS};

/// Environment variable holding the default pool's queue size.
pub const ENV_QUEUE_SIZE: &str = "TASK_ENGINE_QUEUE_SIZE";
/// Environment variable holding the per-core thread multiplier.
pub const ENV_THREAD_MULTIPLIER: &str = "TASK_ENGINE_THREAD_MULTIPLIER";
/// Environment variable holding an explicit worker count.
pub const ENV_THREAD_COUNT: &str = "TASK_ENGINE_THREAD_COUNT";
/// Environment variable holding the minimum worker count.
pub const ENV_MIN_THREADS: &str = "TASK_ENGINE_MIN_THREADS";
/// Environment variable holding the thread tick in milliseconds.
pub const ENV_TICK_MS: &str = "TASK_ENGINE_TICK_MS";

/// Sizing for the engine's default components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Pending queue capacity of the default pool.
    pub queue_size: usize,
    /// Workers per available CPU when no explicit count is set.
    pub thread_multiplier: usize,
    /// Explicit worker count, overriding the derived one.
    pub thread_count: Option<usize>,
    /// Floor applied to the derived worker count.
    pub min_threads: usize,
    /// Bounded wait for every engine thread, in milliseconds.
    pub tick_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_size: 1024,
            thread_multiplier: 2,
            thread_count: None,
            min_threads: 4,
            tick_ms: DEFAULT_TICK_MS,
        }
    }
}

impl EngineConfig {
    /// Worker count for the default pool: the explicit override if set,
    /// else `available CPUs * multiplier`, never below `min_threads`.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.thread_count.unwrap_or_else(|| {
            num_cpus::get()
                .saturating_mul(self.thread_multiplier)
                .max(self.min_threads)
        })
    }

    /// Thread tick as a duration.
    #[must_use]
    pub const fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Configuration of the default worker pool.
    #[must_use]
    pub fn pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig::new()
            .with_name("engine-pool")
            .with_queue_capacity(self.queue_size)
            .with_worker_count(self.worker_count())
            .with_poll_interval(self.tick())
    }

    /// Configuration of an engine scheduler called `name`.
    #[must_use]
    pub fn scheduler_config(&self, name: &str) -> SchedulerConfig {
        SchedulerConfig::new().with_name(name).with_tick(self.tick())
    }

    /// Validate the configuration, including the derived worker count.
    ///
    /// # Errors
    ///
    /// Describes the first violated constraint.
    pub fn validate(&self) -> Result<(), String> {
        if self.thread_multiplier == 0 {
            return Err("thread_multiplier must be greater than 0".into());
        }
        if self.min_threads < 2 {
            return Err(format!(
                "min_threads must be at least 2, got {}",
                self.min_threads
            ));
        }
        if self.tick_ms == 0 {
            return Err("tick_ms must be greater than 0".into());
        }
        self.pool_config().validate()
    }

    /// Parse engine configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the environment, reading a `.env` file first
    /// if one is present. Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns a message naming the variable that failed to parse, or a
    /// validation message.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(v) = parse_var(&lookup, ENV_QUEUE_SIZE)? {
            cfg.queue_size = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_THREAD_MULTIPLIER)? {
            cfg.thread_multiplier = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_THREAD_COUNT)? {
            cfg.thread_count = Some(v);
        }
        if let Some(v) = parse_var(&lookup, ENV_MIN_THREADS)? {
            cfg.min_threads = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_TICK_MS)? {
            cfg.tick_ms = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| format!("{key}: cannot parse `{raw}`: {e}"))
        })
        .transpose()
}
