//! Thenable detection and the adaptation registry
//!
//! A thenable is any object with a callable `then`. Each thenable is adapted
//! into a promise at most once: the adapter is recorded in a
//! [`ThenableRegistry`] keyed by object identity, and later coercions of the
//! same object reuse it instead of calling `then` again.

use std::sync::Weak;

use rustc_hash::FxHashMap;

use crate::promise::PromiseId;
use crate::value::{Function, HostObject, ObjectRef, Value};

/// Outcome of probing a value for a callable `then`
#[derive(Debug)]
pub enum ThenableProbe {
    /// Not an object, or `then` is not callable
    NotThenable,
    /// `then` is callable
    Thenable(ObjectRef, Function),
    /// Reading `then` threw
    Threw(Value),
}

impl ThenableProbe {
    /// Read `then` off `value` and classify the result
    pub fn probe(value: &Value) -> Self {
        let Value::Object(obj) = value else {
            return Self::NotThenable;
        };
        match obj.get("then") {
            Ok(Value::Function(then)) => Self::Thenable(obj.clone(), then),
            Ok(_) => Self::NotThenable,
            Err(thrown) => Self::Threw(thrown),
        }
    }
}

struct Entry {
    object: Weak<dyn HostObject>,
    adapter: PromiseId,
}

/// Weak side-table from adapted thenables to their adapter promises.
///
/// Entries hold a non-owning back-reference; once the thenable is dropped the
/// entry is dead and is ignored by lookups, then pruned.
pub struct ThenableRegistry {
    entries: FxHashMap<usize, Entry>,
    prune_threshold: usize,
    next_prune: usize,
}

impl ThenableRegistry {
    /// Create an empty registry that prunes dead entries whenever it grows
    /// past `prune_threshold` live-or-dead entries.
    pub fn new(prune_threshold: usize) -> Self {
        let prune_threshold = prune_threshold.max(1);
        Self {
            entries: FxHashMap::default(),
            prune_threshold,
            next_prune: prune_threshold,
        }
    }

    /// Adapter previously created for `object`, if any
    pub fn get(&self, object: &ObjectRef) -> Option<PromiseId> {
        self.entries
            .get(&object.identity())
            .filter(|entry| object.is_same_as(&entry.object))
            .map(|entry| entry.adapter)
    }

    /// Check whether `object` has been adapted
    pub fn has(&self, object: &ObjectRef) -> bool {
        self.get(object).is_some()
    }

    /// Record the adapter for `object`.
    ///
    /// A dead entry at the same address (the old object was dropped and the
    /// allocation reused) is replaced.
    pub fn set(&mut self, object: &ObjectRef, adapter: PromiseId) {
        self.entries.insert(
            object.identity(),
            Entry {
                object: object.downgrade(),
                adapter,
            },
        );
        if self.entries.len() >= self.next_prune {
            self.prune();
        }
    }

    /// Drop entries whose thenable no longer exists. Returns how many were removed.
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.object.strong_count() > 0);
        let removed = before - self.entries.len();
        self.next_prune = self.entries.len() + self.prune_threshold;
        if removed > 0 {
            tracing::trace!(removed, remaining = self.entries.len(), "pruned thenable registry");
        }
        removed
    }

    /// Number of entries, including dead ones not yet pruned
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ThenableRegistry {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for ThenableRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThenableRegistry")
            .field("entries", &self.entries.len())
            .field("prune_threshold", &self.prune_threshold)
            .finish()
    }
}
