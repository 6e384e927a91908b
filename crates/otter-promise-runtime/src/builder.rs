//! PromiseRuntimeBuilder - Builder API for creating a PromiseRuntime with configuration

use otter_promise::EngineConfig;

use crate::runtime::{PromiseRuntime, RuntimeConfig};

/// Builder for [`PromiseRuntime`]
///
/// # Example
///
/// ```ignore
/// use otter_promise_runtime::PromiseRuntimeBuilder;
///
/// // Defaults
/// let runtime = PromiseRuntimeBuilder::new().build();
///
/// // Large preallocation, no drain budget
/// let runtime = PromiseRuntimeBuilder::new()
///     .initial_capacity(10_000)
///     .unbounded()
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct PromiseRuntimeBuilder {
    config: RuntimeConfig,
}

impl PromiseRuntimeBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole engine configuration.
    ///
    /// If not set, uses `EngineConfig::default()`.
    pub fn engine_config(mut self, config: EngineConfig) -> Self {
        self.config.engine = config;
        self
    }

    /// Number of promise slots to reserve up front
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.config.engine.initial_capacity = capacity;
        self
    }

    /// Registry growth between prunes of dropped thenables
    pub fn registry_prune_threshold(mut self, threshold: usize) -> Self {
        self.config.engine.registry_prune_threshold = threshold;
        self
    }

    /// Maximum number of jobs a single drain may run
    pub fn microtask_budget(mut self, limit: usize) -> Self {
        self.config.microtask_budget = Some(limit);
        self
    }

    /// Drain until the queue is empty, with no budget
    pub fn unbounded(mut self) -> Self {
        self.config.microtask_budget = None;
        self
    }

    /// Build the runtime
    pub fn build(self) -> PromiseRuntime {
        PromiseRuntime::with_config(self.config)
    }
}
