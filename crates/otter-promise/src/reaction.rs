//! Continuation propagation, handler invocation and thenable coercion
//!
//! When a promise settles, each continuation registered on it is walked here.
//! Handlers always run as jobs. Payloads that are objects are first checked
//! for a callable `then` (also inside a job) so a thenable is never exposed as
//! a fulfillment value downstream.

use std::sync::atomic::Ordering;

use crate::engine::{Engine, ReactionStack};
use crate::error::PromiseError;
use crate::promise::{PromiseId, PromiseState, Reaction};
use crate::thenable::ThenableProbe;
use crate::value::{Function, ObjectRef, Value};

impl Engine {
    /// Propagate `promise`'s outcome to `reaction`, or queue the reaction on
    /// `promise` if it has not settled yet.
    pub(crate) fn propagate_from_promise(&mut self, reaction: Reaction, promise: PromiseId) {
        let mut stack = ReactionStack::new();
        self.react_from_promise(reaction, promise, &mut stack);
        self.drain_reactions(&mut stack);
    }

    pub(crate) fn drain_reactions(&mut self, stack: &mut ReactionStack) {
        while let Some((reaction, originator)) = stack.pop() {
            self.react(reaction, originator, stack);
        }
    }

    fn react_from_promise(
        &mut self,
        reaction: Reaction,
        promise: PromiseId,
        stack: &mut ReactionStack,
    ) {
        if self.slot(promise).state.is_settled() {
            stack.push((reaction, promise));
        } else {
            self.slot_mut(promise).derived.push(reaction);
        }
    }

    /// Feed a settled originator's payload into one continuation
    fn react(&mut self, reaction: Reaction, originator: PromiseId, stack: &mut ReactionStack) {
        match self.slot(originator).state.clone() {
            PromiseState::Fulfilled(value) if value.is_object() => {
                self.enqueue(move |engine| engine.coerce_and_react(reaction, originator, value));
            }
            PromiseState::Fulfilled(value) => self.react_with_value(reaction, value, stack),
            PromiseState::Rejected(reason) => self.react_with_reason(reaction, reason, stack),
            PromiseState::Pending | PromiseState::Following(_) => {
                self.slot_mut(originator).derived.push(reaction);
            }
        }
    }

    fn react_with_value(&mut self, reaction: Reaction, value: Value, stack: &mut ReactionStack) {
        match reaction.on_fulfilled {
            Some(handler) => self.call_handler(reaction.derived, handler, value),
            None => self.transition(reaction.derived, PromiseState::Fulfilled(value), stack),
        }
    }

    fn react_with_reason(&mut self, reaction: Reaction, reason: Value, stack: &mut ReactionStack) {
        match reaction.on_rejected {
            Some(handler) => self.call_handler(reaction.derived, handler, reason),
            None => self.transition(reaction.derived, PromiseState::Rejected(reason), stack),
        }
    }

    /// Schedule `handler(argument)`; its result resolves `derived`, a throw rejects it.
    fn call_handler(&self, derived: PromiseId, handler: Function, argument: Value) {
        self.enqueue(move |engine| {
            match handler.call(engine, &Value::Undefined, std::slice::from_ref(&argument)) {
                Ok(value) => engine.resolve_promise(derived, value),
                Err(thrown) => engine.reject_promise(derived, thrown),
            }
        });
    }

    /// Runs as a job: unwrap `value` if it is a thenable, then continue propagation
    fn coerce_and_react(&mut self, reaction: Reaction, originator: PromiseId, value: Value) {
        let mut stack = ReactionStack::new();

        if let Value::Promise(promise) = value {
            let root = self.follow_root(promise);
            self.react_from_promise(reaction, root, &mut stack);
            self.drain_reactions(&mut stack);
            return;
        }

        if let Value::Object(obj) = &value {
            if let Some(adapter) = self.registry.get(obj) {
                if adapter == originator {
                    // The thenable resolved its own adapter with itself
                    tracing::debug!(promise = %adapter, "thenable resolved with itself");
                    let cycle = Value::from(PromiseError::ChainingCycle);
                    self.react_with_reason(reaction, cycle, &mut stack);
                } else {
                    self.react_from_promise(reaction, adapter, &mut stack);
                }
                self.drain_reactions(&mut stack);
                return;
            }
        }

        match ThenableProbe::probe(&value) {
            ThenableProbe::NotThenable => self.react_with_value(reaction, value, &mut stack),
            ThenableProbe::Thenable(thenable, then) => {
                let adapter = self.coerce_thenable(thenable, then);
                self.react_from_promise(reaction, adapter, &mut stack);
            }
            ThenableProbe::Threw(thrown) => {
                tracing::debug!(derived = %reaction.derived, "reading `then` threw");
                self.react_with_reason(reaction, thrown, &mut stack);
            }
        }
        self.drain_reactions(&mut stack);
    }

    /// Adapt a thenable into a fresh promise, calling its `then` exactly once.
    ///
    /// The adapter is registered before `then` runs, so a re-entrant coercion of
    /// the same object from inside `then` finds it instead of calling again.
    fn coerce_thenable(&mut self, thenable: ObjectRef, then: Function) -> PromiseId {
        let adapter = self.create_promise();
        self.registry.set(&thenable, adapter);
        tracing::debug!(adapter = %adapter, object = ?thenable, "adapting thenable");

        let (resolve, reject, already_resolved) = self.resolving_functions(adapter);
        let this = Value::Object(thenable);
        let args = [Value::Function(resolve), Value::Function(reject)];
        if let Err(thrown) = then.call(self, &this, &args) {
            if !already_resolved.swap(true, Ordering::AcqRel) {
                tracing::debug!(adapter = %adapter, "thenable `then` threw");
                self.reject_promise(adapter, thrown);
            }
        }
        adapter
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::tests::{engine, fulfilled, rejected};
    use crate::error::PromiseError;
    use crate::promise::PromiseState;
    use crate::value::{Completion, Function, HostObject, PlainObject, Value};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Function) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = {
            let log = log.clone();
            move |tag: &str| {
                let log = log.clone();
                let tag = tag.to_string();
                Function::unary(move |_, v| {
                    log.lock().push(format!("{tag}:{v:?}"));
                    Ok(v)
                })
            }
        };
        (log, make)
    }

    /// Thenable whose `then` counts calls and resolves with `value`
    fn counting_thenable(calls: Arc<AtomicUsize>, value: Value) -> Value {
        let then = Function::new(move |engine, _this, args| {
            calls.fetch_add(1, Ordering::SeqCst);
            let resolve = args[0].as_function().cloned().expect("resolve function");
            resolve.call(engine, &Value::Undefined, &[value.clone()])
        });
        Value::object(PlainObject::new().with("then", then))
    }

    #[test]
    fn test_handlers_never_run_synchronously() {
        let (mut engine, queue) = engine();
        let p = engine.resolve(Value::number(1.0));
        let (log, handler) = recorder();
        let q = engine.then(p, Some(handler("a")), None);
        assert!(log.lock().is_empty());
        assert!(engine.is_pending(q));
        assert_eq!(queue.len(), 1);

        queue.drain(&mut engine);
        assert_eq!(*log.lock(), vec!["a:1".to_string()]);
        assert_eq!(fulfilled(&engine, q), Some(Value::number(1.0)));
    }

    #[test]
    fn test_reactions_fire_in_registration_order() {
        let (mut engine, queue) = engine();
        let p = engine.create_promise();
        let (log, handler) = recorder();
        engine.then(p, Some(handler("c1")), None);
        engine.then(p, Some(handler("c2")), None);
        engine.then(p, Some(handler("c3")), None);
        assert_eq!(engine.reaction_count(p), 3);

        engine.resolve_promise(p, Value::string("v"));
        assert_eq!(engine.reaction_count(p), 0);
        queue.drain(&mut engine);
        assert_eq!(
            *log.lock(),
            vec![
                "c1:\"v\"".to_string(),
                "c2:\"v\"".to_string(),
                "c3:\"v\"".to_string()
            ]
        );
    }

    #[test]
    fn test_missing_handlers_pass_through() {
        let (mut engine, queue) = engine();
        let p = engine.create_promise();
        let q = engine.then(p, None, None);
        engine.resolve_promise(p, Value::number(4.0));
        // No handler and a primitive payload: no job needed
        assert_eq!(queue.len(), 0);
        assert_eq!(fulfilled(&engine, q), Some(Value::number(4.0)));

        let r = engine.create_promise();
        let (_, handler) = recorder();
        let s = engine.then(r, Some(handler("unused")), None);
        engine.reject_promise(r, Value::string("nope"));
        assert_eq!(rejected(&engine, s), Some(Value::string("nope")));
    }

    #[test]
    fn test_handler_return_and_throw() {
        let (mut engine, queue) = engine();
        let p = engine.resolve(Value::number(1.0));
        let plus_one = Function::unary(|_, v| Ok(Value::number(v.as_number().unwrap_or(0.0) + 1.0)));
        let boom = Function::unary(|_, _| Err(Value::string("boom")));
        let q = engine.then(p, Some(plus_one), None);
        let r = engine.then(p, Some(boom), None);
        queue.drain(&mut engine);
        assert_eq!(fulfilled(&engine, q), Some(Value::number(2.0)));
        assert_eq!(rejected(&engine, r), Some(Value::string("boom")));
    }

    #[test]
    fn test_catch_recovers() {
        let (mut engine, queue) = engine();
        let p = engine.reject(Value::string("bad"));
        let q = engine.catch(p, Function::unary(|_, _| Ok(Value::string("recovered"))));
        queue.drain(&mut engine);
        assert_eq!(fulfilled(&engine, q), Some(Value::string("recovered")));
    }

    #[test]
    fn test_handler_returning_promise_rechains() {
        let (mut engine, queue) = engine();
        let inner = engine.create_promise();
        let p = engine.resolve(Value::Null);
        let q = engine.then(p, Some(Function::unary(move |_, _| Ok(Value::promise(inner)))), None);
        queue.drain(&mut engine);
        assert_eq!(engine.state(q), &PromiseState::Following(inner));

        engine.resolve_promise(inner, Value::number(8.0));
        assert_eq!(fulfilled(&engine, q), Some(Value::number(8.0)));
    }

    #[test]
    fn test_then_on_following_promise_forwards_to_target() {
        let (mut engine, queue) = engine();
        let target = engine.create_promise();
        let p = engine.resolve(Value::promise(target));
        engine.then(p, None, None);
        assert_eq!(engine.reaction_count(p), 0);
        assert_eq!(engine.reaction_count(target), 2);
        engine.resolve_promise(target, Value::Boolean(true));
        queue.drain(&mut engine);
        assert_eq!(fulfilled(&engine, p), Some(Value::Boolean(true)));
    }

    #[test]
    fn test_thenable_is_unwrapped() {
        let (mut engine, queue) = engine();
        let calls = Arc::new(AtomicUsize::new(0));
        let thenable = counting_thenable(calls.clone(), Value::number(42.0));
        let p = engine.resolve(thenable.clone());
        // Resolution itself stores the object; unwrapping happens downstream
        assert_eq!(fulfilled(&engine, p), Some(thenable));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let q = engine.then(p, None, None);
        assert!(engine.is_pending(q));
        queue.drain(&mut engine);
        assert_eq!(fulfilled(&engine, q), Some(Value::number(42.0)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_thenable_adapted_once() {
        let (mut engine, queue) = engine();
        let calls = Arc::new(AtomicUsize::new(0));
        let thenable = counting_thenable(calls.clone(), Value::string("once"));
        let a = engine.resolve(thenable.clone());
        let b = engine.resolve(thenable.clone());
        let qa = engine.then(a, None, None);
        let qb = engine.then(b, None, None);
        let qa2 = engine.then(a, None, None);
        queue.drain(&mut engine);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for q in [qa, qb, qa2] {
            assert_eq!(fulfilled(&engine, q), Some(Value::string("once")));
        }
        let Value::Object(obj) = &thenable else { unreachable!() };
        assert!(engine.registry().has(obj));
    }

    #[test]
    fn test_thenable_first_capability_call_wins() {
        let (mut engine, queue) = engine();
        let then = Function::new(|engine, _this, args| {
            let resolve = args[0].as_function().cloned().expect("resolve");
            let reject = args[1].as_function().cloned().expect("reject");
            resolve.call(engine, &Value::Undefined, &[Value::number(1.0)])?;
            reject.call(engine, &Value::Undefined, &[Value::number(2.0)])?;
            resolve.call(engine, &Value::Undefined, &[Value::number(3.0)])?;
            Err(Value::string("thrown after resolving"))
        });
        let p = engine.resolve(Value::object(PlainObject::new().with("then", then)));
        let q = engine.then(p, None, None);
        queue.drain(&mut engine);
        assert_eq!(fulfilled(&engine, q), Some(Value::number(1.0)));
    }

    #[test]
    fn test_thenable_throwing_then_rejects() {
        let (mut engine, queue) = engine();
        let then = Function::new(|_, _, _| Err(Value::string("then blew up")));
        let p = engine.resolve(Value::object(PlainObject::new().with("then", then)));
        let q = engine.then(p, None, None);
        queue.drain(&mut engine);
        assert_eq!(rejected(&engine, q), Some(Value::string("then blew up")));
    }

    struct ThrowingGetter;

    impl HostObject for ThrowingGetter {
        fn get(&self, _key: &str) -> Completion {
            Err(Value::string("getter threw"))
        }
    }

    #[test]
    fn test_then_getter_throwing_rejects_without_adapter() {
        let (mut engine, queue) = engine();
        let p = engine.resolve(Value::object(ThrowingGetter));
        let q = engine.then(p, None, None);
        queue.drain(&mut engine);
        assert_eq!(rejected(&engine, q), Some(Value::string("getter threw")));
        assert!(engine.registry().is_empty());
    }

    #[test]
    fn test_non_callable_then_is_plain_value() {
        let (mut engine, queue) = engine();
        let obj = Value::object(PlainObject::new().with("then", 5.0));
        let p = engine.resolve(obj.clone());
        let q = engine.then(p, None, None);
        queue.drain(&mut engine);
        assert_eq!(fulfilled(&engine, q), Some(obj));
    }

    #[test]
    fn test_thenable_resolving_itself_rejects_with_cycle() {
        let (mut engine, queue) = engine();
        let obj = Arc::new(PlainObject::new());
        let this_obj = crate::value::ObjectRef::from_arc(obj.clone());
        let then = Function::new(|engine, this, args| {
            let resolve = args[0].as_function().cloned().expect("resolve");
            resolve.call(engine, &Value::Undefined, std::slice::from_ref(this))
        });
        obj.set("then", then);

        let p = engine.resolve(Value::Object(this_obj));
        let q = engine.then(p, None, None);
        queue.drain(&mut engine);
        let reason = rejected(&engine, q).expect("cycle should reject");
        assert_eq!(reason.as_error(), Some(&PromiseError::ChainingCycle));
    }

    #[test]
    fn test_thenable_resolving_later() {
        let (mut engine, queue) = engine();
        let captured: Arc<Mutex<Option<Function>>> = Arc::new(Mutex::new(None));
        let then = {
            let captured = captured.clone();
            Function::new(move |_, _, args| {
                *captured.lock() = args[0].as_function().cloned();
                Ok(Value::Undefined)
            })
        };
        let p = engine.resolve(Value::object(PlainObject::new().with("then", then)));
        let q = engine.then(p, None, None);
        queue.drain(&mut engine);
        assert!(engine.is_pending(q));

        let resolve = captured.lock().take().expect("then should have run");
        resolve
            .call(&mut engine, &Value::Undefined, &[Value::string("late")])
            .unwrap();
        queue.drain(&mut engine);
        assert_eq!(fulfilled(&engine, q), Some(Value::string("late")));
    }
}
