//! Runtime error types

use otter_promise::PromiseId;
use thiserror::Error;

/// Errors reported by the promise runtime driver
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Drain stopped after running `limit` jobs with more still queued
    #[error("microtask budget of {limit} jobs exceeded")]
    MicrotaskBudgetExceeded {
        /// Configured budget
        limit: usize,
    },

    /// Promise still pending once the queue ran dry
    #[error("promise {0} is still pending")]
    Pending(PromiseId),
}

/// Result type for runtime operations
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
