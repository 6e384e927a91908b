//! Promise runtime: an engine wired to a microtask queue, plus the drain loop

use std::sync::Arc;

use otter_promise::{Completion, Engine, EngineConfig, PromiseId, PromiseState};

use crate::error::{RuntimeError, RuntimeResult};
use crate::microtask::MicrotaskQueue;

/// Jobs taken from the queue per lock acquisition
const DRAIN_BATCH: usize = 256;

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Configuration of the owned engine
    pub engine: EngineConfig,
    /// Maximum number of jobs one [`PromiseRuntime::run_microtasks`] call may
    /// run. `None` drains until the queue is empty, however long that takes.
    pub microtask_budget: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            microtask_budget: Some(1_000_000),
        }
    }
}

/// Owns a promise [`Engine`] and the [`MicrotaskQueue`] it submits jobs to.
///
/// # Example
///
/// ```ignore
/// use otter_promise::{Function, Value};
/// use otter_promise_runtime::PromiseRuntime;
///
/// let mut runtime = PromiseRuntime::new();
/// let engine = runtime.engine_mut();
/// let p = engine.resolve(Value::number(5.0));
/// let doubled = engine.then(p, Some(Function::unary(|_, v| {
///     Ok(Value::number(v.as_number().unwrap_or(0.0) * 2.0))
/// })), None);
///
/// assert_eq!(runtime.settlement(doubled)?, Ok(Value::number(10.0)));
/// ```
pub struct PromiseRuntime {
    engine: Engine,
    queue: Arc<MicrotaskQueue>,
    config: RuntimeConfig,
}

impl PromiseRuntime {
    /// Create a runtime with default configuration
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with explicit configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        let queue = Arc::new(MicrotaskQueue::new());
        let engine = Engine::with_config(queue.clone(), config.engine.clone());
        Self {
            engine,
            queue,
            config,
        }
    }

    /// Shared access to the engine
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Exclusive access to the engine
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// The queue the engine submits jobs to
    pub fn queue(&self) -> &Arc<MicrotaskQueue> {
        &self.queue
    }

    /// Active configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Number of jobs waiting to run
    pub fn pending_jobs(&self) -> usize {
        self.queue.len()
    }

    /// Run queued jobs in FIFO order until the queue is empty.
    ///
    /// Jobs enqueued by running jobs are run too. Returns the number of jobs
    /// run. If the configured budget is reached while jobs remain, the drain
    /// stops with [`RuntimeError::MicrotaskBudgetExceeded`] and the remaining
    /// jobs stay queued.
    pub fn run_microtasks(&mut self) -> RuntimeResult<usize> {
        let limit = self.config.microtask_budget;
        let mut ran = 0usize;
        let mut batch = Vec::with_capacity(DRAIN_BATCH);

        loop {
            let allowance = match limit {
                Some(limit) if ran >= limit => {
                    if self.queue.is_empty() {
                        break;
                    }
                    tracing::warn!(
                        limit,
                        queued = self.queue.len(),
                        "microtask budget exceeded, stopping drain"
                    );
                    return Err(RuntimeError::MicrotaskBudgetExceeded { limit });
                }
                Some(limit) => (limit - ran).min(DRAIN_BATCH),
                None => DRAIN_BATCH,
            };

            let taken = self.queue.dequeue_batch(allowance, &mut batch);
            if taken == 0 {
                break;
            }
            for job in batch.drain(..) {
                job(&mut self.engine);
            }
            ran += taken;
            tracing::trace!(taken, ran, queued = self.queue.len(), "drained microtask batch");
        }

        Ok(ran)
    }

    /// Drain the queue, then report how `promise` settled: `Ok(value)` when
    /// fulfilled, `Err(reason)` when rejected.
    ///
    /// Fails with [`RuntimeError::Pending`] if the promise is still pending
    /// once no jobs remain.
    pub fn settlement(&mut self, promise: PromiseId) -> RuntimeResult<Completion> {
        self.run_microtasks()?;
        match self.engine.state(promise) {
            PromiseState::Fulfilled(value) => Ok(Ok(value.clone())),
            PromiseState::Rejected(reason) => Ok(Err(reason.clone())),
            PromiseState::Pending | PromiseState::Following(_) => {
                Err(RuntimeError::Pending(promise))
            }
        }
    }

    /// Drop every queued job without running it
    pub fn clear_microtasks(&self) {
        self.queue.clear();
    }
}

impl Default for PromiseRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PromiseRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromiseRuntime")
            .field("promises", &self.engine.len())
            .field("pending_jobs", &self.queue.len())
            .field("config", &self.config)
            .finish()
    }
}
