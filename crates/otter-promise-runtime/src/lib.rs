//! # Otter Promise Runtime
//!
//! Drives an [`otter_promise::Engine`]: a FIFO [`MicrotaskQueue`] the engine
//! submits its jobs to, and [`PromiseRuntime`], which owns both and drains the
//! queue on request.
//!
//! ```ignore
//! use otter_promise::Value;
//! use otter_promise_runtime::PromiseRuntimeBuilder;
//!
//! let mut runtime = PromiseRuntimeBuilder::new().microtask_budget(10_000).build();
//! let p = runtime.engine_mut().resolve(Value::number(1.0));
//! let outcome = runtime.settlement(p)?;
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod builder;
pub mod error;
pub mod microtask;
pub mod runtime;

pub use builder::PromiseRuntimeBuilder;
pub use error::{RuntimeError, RuntimeResult};
pub use microtask::MicrotaskQueue;
pub use runtime::{PromiseRuntime, RuntimeConfig};
