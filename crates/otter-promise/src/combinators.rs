//! Promise statics: `resolve`, `reject`, `cast`, `race`, `all`

use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::Engine;
use crate::promise::PromiseId;
use crate::value::{Function, Value};

/// Shared state of one `all` call
struct AllState {
    values: Vec<Value>,
    remaining: usize,
}

impl Engine {
    /// New promise resolved with `value`
    pub fn resolve(&mut self, value: Value) -> PromiseId {
        let promise = self.create_promise();
        self.resolve_promise(promise, value);
        promise
    }

    /// New promise rejected with `reason`
    pub fn reject(&mut self, reason: Value) -> PromiseId {
        let promise = self.create_promise();
        self.reject_promise(promise, reason);
        promise
    }

    /// `value` itself if it is a promise, otherwise `resolve(value)`
    pub fn cast(&mut self, value: Value) -> PromiseId {
        match value {
            Value::Promise(promise) => promise,
            other => self.resolve(other),
        }
    }

    /// Settle like whichever input settles first.
    ///
    /// Every input shares the same resolve/reject pair; later settlements are
    /// no-ops on the already settled result. An empty input never settles.
    pub fn race(&mut self, items: impl IntoIterator<Item = Value>) -> PromiseId {
        let result = self.create_promise();

        let resolve = Function::unary(move |engine, value| {
            engine.resolve_promise(result, value);
            Ok(Value::Undefined)
        });
        let reject = Function::unary(move |engine, reason| {
            engine.reject_promise(result, reason);
            Ok(Value::Undefined)
        });

        for item in items {
            let next = self.cast(item);
            self.then(next, Some(resolve.clone()), Some(reject.clone()));
        }

        result
    }

    /// Fulfill with every input's value, in input order, once all have
    /// fulfilled; reject with the first rejection. An empty input fulfills
    /// immediately with an empty array.
    pub fn all(&mut self, items: impl IntoIterator<Item = Value>) -> PromiseId {
        let result = self.create_promise();
        let inputs: Vec<PromiseId> = items.into_iter().map(|item| self.cast(item)).collect();

        if inputs.is_empty() {
            self.resolve_promise(result, Value::array(Vec::<Value>::new()));
            return result;
        }

        let state = Arc::new(Mutex::new(AllState {
            values: vec![Value::Undefined; inputs.len()],
            remaining: inputs.len(),
        }));
        let reject = Function::unary(move |engine, reason| {
            engine.reject_promise(result, reason);
            Ok(Value::Undefined)
        });

        for (index, input) in inputs.into_iter().enumerate() {
            let state = Arc::clone(&state);
            let on_fulfilled = Function::unary(move |engine, value| {
                let completed = {
                    let mut state = state.lock();
                    state.values[index] = value;
                    state.remaining -= 1;
                    (state.remaining == 0).then(|| std::mem::take(&mut state.values))
                };
                if let Some(values) = completed {
                    engine.resolve_promise(result, Value::array(values));
                }
                Ok(Value::Undefined)
            });
            self.then(input, Some(on_fulfilled), Some(reject.clone()));
        }

        result
    }
}
