//! # Otter Promise
//!
//! Promise resolution engine for the Otter runtime:
//! - Promise core: pending / following / fulfilled / rejected, settled once
//! - Resolution: adoption of other promises with follow-chain shortening and
//!   cycle detection
//! - Thenable adoption: foreign objects with a callable `then` are adapted
//!   into promises, calling `then` at most once per object
//! - Chaining (`then` / `catch`) and the `resolve`, `reject`, `cast`, `race`,
//!   `all` combinators
//!
//! The engine owns no scheduler. Handler calls are submitted as [`Job`]s to an
//! injected [`JobQueue`]; `otter-promise-runtime` provides a microtask queue
//! and a driver that drains it.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod combinators;
pub mod engine;
pub mod error;
pub mod job;
pub mod promise;
pub mod reaction;
pub mod thenable;
pub mod value;

pub use engine::{Engine, EngineConfig, PromiseWithResolvers};
pub use error::PromiseError;
pub use job::{Job, JobQueue};
pub use promise::{PromiseId, PromiseState, Reaction};
pub use thenable::{ThenableProbe, ThenableRegistry};
pub use value::{Completion, Function, HostObject, ObjectRef, PlainObject, Value};
