//! Fluent construction of an [`Engine`].

use std::time::Duration;

use crate::config::EngineConfig;
use crate::core::{Engine, EngineError, EngineResult};

/// Builder for [`Engine`], starting from [`EngineConfig::default`].
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    config: EngineConfig,
}

impl EngineBuilder {
    /// Builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder seeded from the environment (and `.env`, if present).
    ///
    /// # Errors
    ///
    /// `EngineError::InvalidConfig` if a variable is malformed.
    pub fn from_env() -> EngineResult<Self> {
        let config = EngineConfig::from_env().map_err(EngineError::InvalidConfig)?;
        Ok(Self { config })
    }

    /// Builder seeded from `config`.
    #[must_use]
    pub const fn from_config(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Pending queue capacity of the default pool.
    #[must_use]
    pub const fn queue_size(mut self, size: usize) -> Self {
        self.config.queue_size = size;
        self
    }

    /// Workers per available CPU.
    #[must_use]
    pub const fn thread_multiplier(mut self, multiplier: usize) -> Self {
        self.config.thread_multiplier = multiplier;
        self
    }

    /// Explicit worker count.
    #[must_use]
    pub const fn thread_count(mut self, count: usize) -> Self {
        self.config.thread_count = Some(count);
        self
    }

    /// Floor for the derived worker count.
    #[must_use]
    pub const fn min_threads(mut self, min: usize) -> Self {
        self.config.min_threads = min;
        self
    }

    /// Bounded wait used by every engine thread.
    #[must_use]
    pub fn tick(mut self, tick: Duration) -> Self {
        self.config.tick_ms = u64::try_from(tick.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// The configuration built so far.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate and create the engine.
    ///
    /// # Errors
    ///
    /// `EngineError::InvalidConfig` if validation fails.
    pub fn build(self) -> EngineResult<Engine> {
        Engine::new(self.config)
    }
}
