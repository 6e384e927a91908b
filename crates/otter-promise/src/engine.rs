//! Promise engine: the arena of promises and the resolution algorithm
//!
//! ## Rust API
//!
//! ```ignore
//! let queue: Arc<dyn JobQueue> = Arc::new(MyQueue::default());
//! let mut engine = Engine::new(queue);
//!
//! let p = engine.resolve(Value::number(5.0));
//! let q = engine.then(p, Some(Function::unary(|_, v| {
//!     Ok(Value::number(v.as_number().unwrap_or(0.0) * 2.0))
//! })), None);
//! // `q` settles once the queue has been drained.
//! ```
//!
//! All mutation of a promise goes through [`Engine::resolve_promise`] and
//! [`Engine::reject_promise`]. Settlement is final: the terminal state and the
//! hand-off of the derived continuations happen in one step.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::PromiseError;
use crate::job::{Job, JobQueue};
use crate::promise::{PromiseId, PromiseSlot, PromiseState, Reaction};
use crate::thenable::ThenableRegistry;
use crate::value::{Function, Value};

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of promise slots to reserve up front
    pub initial_capacity: usize,
    /// Registry size growth that triggers pruning of dead thenable entries
    pub registry_prune_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 64,
            registry_prune_threshold: 1024,
        }
    }
}

/// Result of [`Engine::with_resolvers`]
///
/// A pending promise together with its resolving functions. Only the first call
/// to either function has an effect.
#[derive(Debug, Clone)]
pub struct PromiseWithResolvers {
    /// The promise
    pub promise: PromiseId,
    /// Function to resolve the promise
    pub resolve: Function,
    /// Function to reject the promise
    pub reject: Function,
}

/// Pending settlements still to be propagated, processed last-in first-out so
/// propagation is depth-first in registration order.
pub(crate) type ReactionStack = Vec<(Reaction, PromiseId)>;

/// Owner of every promise and of the thenable registry
pub struct Engine {
    promises: Vec<PromiseSlot>,
    pub(crate) registry: ThenableRegistry,
    queue: Arc<dyn JobQueue>,
}

impl Engine {
    /// Create an engine submitting its jobs to `queue`
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self::with_config(queue, EngineConfig::default())
    }

    /// Create an engine with explicit configuration
    pub fn with_config(queue: Arc<dyn JobQueue>, config: EngineConfig) -> Self {
        Self {
            promises: Vec::with_capacity(config.initial_capacity),
            registry: ThenableRegistry::new(config.registry_prune_threshold),
            queue,
        }
    }

    /// Create a new pending promise
    pub fn create_promise(&mut self) -> PromiseId {
        debug_assert!(self.promises.len() < u32::MAX as usize);
        let id = PromiseId(self.promises.len() as u32);
        self.promises.push(PromiseSlot::new());
        id
    }

    /// Create a promise and run `resolver` synchronously with its resolving
    /// functions. An `Err` from the resolver rejects the promise unless it was
    /// already resolved.
    pub fn new_promise<F>(&mut self, resolver: F) -> PromiseId
    where
        F: FnOnce(&mut Engine, Function, Function) -> Result<(), Value>,
    {
        let promise = self.create_promise();
        let (resolve, reject, already_resolved) = self.resolving_functions(promise);
        if let Err(thrown) = resolver(self, resolve, reject) {
            if !already_resolved.swap(true, Ordering::AcqRel) {
                self.reject_promise(promise, thrown);
            }
        }
        promise
    }

    /// Create a pending promise with resolve/reject functions for manual control
    pub fn with_resolvers(&mut self) -> PromiseWithResolvers {
        let promise = self.create_promise();
        let (resolve, reject, _) = self.resolving_functions(promise);
        PromiseWithResolvers {
            promise,
            resolve,
            reject,
        }
    }

    /// Resolving functions for `promise` sharing one "already resolved" flag
    pub(crate) fn resolving_functions(
        &self,
        promise: PromiseId,
    ) -> (Function, Function, Arc<AtomicBool>) {
        let already_resolved = Arc::new(AtomicBool::new(false));

        let resolve = {
            let already_resolved = Arc::clone(&already_resolved);
            Function::unary(move |engine, value| {
                if !already_resolved.swap(true, Ordering::AcqRel) {
                    engine.resolve_promise(promise, value);
                }
                Ok(Value::Undefined)
            })
        };

        let reject = {
            let already_resolved = Arc::clone(&already_resolved);
            Function::unary(move |engine, reason| {
                if !already_resolved.swap(true, Ordering::AcqRel) {
                    engine.reject_promise(promise, reason);
                }
                Ok(Value::Undefined)
            })
        };

        (resolve, reject, already_resolved)
    }

    /// Resolve `promise` with `value`.
    ///
    /// No-op if the promise already follows another promise or has settled.
    /// Resolving with a promise adopts its outcome: immediately if it has
    /// settled, otherwise by following the root of its follow chain. Resolving
    /// with itself, directly or through a follow chain, rejects with a
    /// `TypeError`. Any other value fulfills directly; thenables are unwrapped
    /// later, when the value propagates to a continuation.
    ///
    /// # Panics
    ///
    /// Panics if `promise` was not created by this engine.
    pub fn resolve_promise(&mut self, promise: PromiseId, value: Value) {
        if self.slot(promise).is_locked() {
            return;
        }

        let Value::Promise(other) = value else {
            self.settle(promise, PromiseState::Fulfilled(value));
            return;
        };

        if other == promise {
            tracing::debug!(promise = %promise, "promise resolved with itself");
            self.settle(promise, PromiseState::Rejected(PromiseError::SelfResolution.into()));
            return;
        }

        let root = self.follow_root(other);
        if root == promise {
            tracing::debug!(promise = %promise, via = %other, "chaining cycle detected");
            self.settle(promise, PromiseState::Rejected(PromiseError::ChainingCycle.into()));
            return;
        }

        let adopted = self.slot(root).state.clone();
        match adopted {
            PromiseState::Fulfilled(_) | PromiseState::Rejected(_) => {
                self.settle(promise, adopted);
            }
            PromiseState::Pending | PromiseState::Following(_) => {
                self.slot_mut(promise).state = PromiseState::Following(root);
                tracing::trace!(promise = %promise, target = %root, "following");
                self.propagate_from_promise(Reaction::passthrough(promise), root);
            }
        }
    }

    /// Reject `promise` with `reason`.
    ///
    /// No-op if the promise already follows another promise or has settled.
    /// Rejection reasons are never unwrapped.
    ///
    /// # Panics
    ///
    /// Panics if `promise` was not created by this engine.
    pub fn reject_promise(&mut self, promise: PromiseId, reason: Value) {
        if self.slot(promise).is_locked() {
            return;
        }
        self.settle(promise, PromiseState::Rejected(reason));
    }

    /// Register handlers on `promise`, returning the derived promise.
    ///
    /// The derived promise is returned synchronously and settles only after
    /// the relevant handler has run on the job queue (or immediately, with no
    /// job, when the matching handler is absent and the payload needs no
    /// unwrapping).
    pub fn then(
        &mut self,
        promise: PromiseId,
        on_fulfilled: Option<Function>,
        on_rejected: Option<Function>,
    ) -> PromiseId {
        let target = self.follow_root(promise);
        let derived = self.create_promise();
        self.propagate_from_promise(
            Reaction {
                derived,
                on_fulfilled,
                on_rejected,
            },
            target,
        );
        derived
    }

    /// Register a rejection handler only
    pub fn catch(&mut self, promise: PromiseId, on_rejected: Function) -> PromiseId {
        self.then(promise, None, Some(on_rejected))
    }

    /// `then` on an arbitrary value; fails if the receiver is not a promise
    pub fn then_value(
        &mut self,
        receiver: &Value,
        on_fulfilled: Option<Function>,
        on_rejected: Option<Function>,
    ) -> Result<PromiseId, PromiseError> {
        match receiver.as_promise() {
            Some(promise) => Ok(self.then(promise, on_fulfilled, on_rejected)),
            None => Err(PromiseError::NotAPromise(receiver.type_name().to_string())),
        }
    }

    /// `catch` on an arbitrary value; fails if the receiver is not a promise
    pub fn catch_value(
        &mut self,
        receiver: &Value,
        on_rejected: Function,
    ) -> Result<PromiseId, PromiseError> {
        self.then_value(receiver, None, Some(on_rejected))
    }

    /// Get current state
    pub fn state(&self, promise: PromiseId) -> &PromiseState {
        &self.slot(promise).state
    }

    /// Check if promise is pending (including while following another)
    pub fn is_pending(&self, promise: PromiseId) -> bool {
        self.state(promise).is_pending()
    }

    /// Check if promise is fulfilled
    pub fn is_fulfilled(&self, promise: PromiseId) -> bool {
        matches!(self.state(promise), PromiseState::Fulfilled(_))
    }

    /// Check if promise is rejected
    pub fn is_rejected(&self, promise: PromiseId) -> bool {
        matches!(self.state(promise), PromiseState::Rejected(_))
    }

    /// Check if promise is settled (fulfilled or rejected)
    pub fn is_settled(&self, promise: PromiseId) -> bool {
        self.state(promise).is_settled()
    }

    /// Number of continuations waiting on `promise`
    pub fn reaction_count(&self, promise: PromiseId) -> usize {
        self.slot(promise).derived.len()
    }

    /// Number of promises created by this engine
    pub fn len(&self) -> usize {
        self.promises.len()
    }

    /// Check if no promise has been created yet
    pub fn is_empty(&self) -> bool {
        self.promises.is_empty()
    }

    /// Thenable adaptation registry
    pub fn registry(&self) -> &ThenableRegistry {
        &self.registry
    }

    /// Submit a job to the queue
    pub fn enqueue<F>(&self, job: F)
    where
        F: FnOnce(&mut Engine) + Send + 'static,
    {
        self.queue.enqueue(Box::new(job) as Job);
    }

    /// Root of the follow chain starting at `promise`, compressing the path so
    /// every promise on it follows the root directly.
    pub(crate) fn follow_root(&mut self, promise: PromiseId) -> PromiseId {
        let mut root = promise;
        while let Some(next) = self.slot(root).state.following() {
            root = next;
        }

        let mut current = promise;
        while let Some(next) = self.slot(current).state.following() {
            if next != root {
                self.slot_mut(current).state = PromiseState::Following(root);
            }
            current = next;
        }
        root
    }

    /// Move `promise` to a terminal state and propagate to its continuations
    pub(crate) fn settle(&mut self, promise: PromiseId, state: PromiseState) {
        let mut stack = ReactionStack::new();
        self.transition(promise, state, &mut stack);
        self.drain_reactions(&mut stack);
    }

    /// Terminal transition. Ignored if the promise has settled already.
    /// The derived list is taken in the same step, so no continuation can be
    /// notified twice or missed.
    pub(crate) fn transition(
        &mut self,
        promise: PromiseId,
        state: PromiseState,
        stack: &mut ReactionStack,
    ) {
        debug_assert!(state.is_settled());
        let fulfilled = matches!(state, PromiseState::Fulfilled(_));
        let slot = self.slot_mut(promise);
        if slot.state.is_settled() {
            return;
        }
        slot.state = state;
        let derived = std::mem::take(&mut slot.derived);
        tracing::trace!(promise = %promise, fulfilled, reactions = derived.len(), "settled");
        stack.extend(derived.into_iter().rev().map(|reaction| (reaction, promise)));
    }

    pub(crate) fn slot(&self, promise: PromiseId) -> &PromiseSlot {
        &self.promises[promise.index()]
    }

    pub(crate) fn slot_mut(&mut self, promise: PromiseId) -> &mut PromiseSlot {
        &mut self.promises[promise.index()]
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("promises", &self.promises.len())
            .field("registry", &self.registry)
            .finish()
    }
}
