//! Promise core: identity, state and the list of derived continuations
//!
//! Promises live in the engine's arena and are addressed by [`PromiseId`].
//! Following another promise is stored as an id, so shortening a follow chain
//! is an index rewrite.

use std::fmt;

use smallvec::SmallVec;

use crate::value::{Function, Value};

/// Index of a promise in its engine's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PromiseId(pub(crate) u32);

impl PromiseId {
    /// Raw arena index
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PromiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Promise state
#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState {
    /// Not yet settled
    Pending,
    /// Adopting the eventual outcome of another promise (still pending)
    Following(PromiseId),
    /// Resolved with value
    Fulfilled(Value),
    /// Rejected with reason
    Rejected(Value),
}

impl PromiseState {
    /// Check if settled (fulfilled or rejected)
    pub fn is_settled(&self) -> bool {
        matches!(self, PromiseState::Fulfilled(_) | PromiseState::Rejected(_))
    }

    /// Check if still pending, including while following
    pub fn is_pending(&self) -> bool {
        !self.is_settled()
    }

    /// Target of a `Following` state
    pub fn following(&self) -> Option<PromiseId> {
        match self {
            PromiseState::Following(target) => Some(*target),
            _ => None,
        }
    }
}

/// Continuation record: handlers plus the downstream promise they feed.
///
/// Consumed exactly once when the promise it is registered on settles.
#[derive(Debug, Clone)]
pub struct Reaction {
    /// The promise this continuation settles
    pub derived: PromiseId,
    /// Fulfillment handler
    pub on_fulfilled: Option<Function>,
    /// Rejection handler
    pub on_rejected: Option<Function>,
}

impl Reaction {
    /// Reaction without handlers: the outcome passes straight through.
    /// Used when one promise follows another.
    pub fn passthrough(derived: PromiseId) -> Self {
        Self {
            derived,
            on_fulfilled: None,
            on_rejected: None,
        }
    }
}

/// Most promises carry at most one continuation
pub(crate) type ReactionList = SmallVec<[Reaction; 1]>;

/// Arena slot for a single promise
#[derive(Debug)]
pub(crate) struct PromiseSlot {
    pub(crate) state: PromiseState,
    pub(crate) derived: ReactionList,
}

impl PromiseSlot {
    pub(crate) fn new() -> Self {
        Self {
            state: PromiseState::Pending,
            derived: ReactionList::new(),
        }
    }

    /// Settlement attempts through the public resolve/reject path are ignored
    /// once the promise follows another or has settled.
    pub(crate) fn is_locked(&self) -> bool {
        !matches!(self.state, PromiseState::Pending)
    }
}

impl fmt::Display for PromiseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromiseState::Pending | PromiseState::Following(_) => write!(f, "Promise {{ <pending> }}"),
            PromiseState::Fulfilled(v) => write!(f, "Promise {{ <fulfilled>: {:?} }}", v),
            PromiseState::Rejected(v) => write!(f, "Promise {{ <rejected>: {:?} }}", v),
        }
    }
}
