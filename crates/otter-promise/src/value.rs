//! Values flowing through promises
//!
//! The engine only needs a narrow object model: tell objects from primitives,
//! read a `then` property (which may throw), call a function with a `this`
//! binding, and compare identities. Host embeddings plug their own objects in
//! through [`HostObject`].

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::engine::Engine;
use crate::error::PromiseError;
use crate::promise::PromiseId;

/// Result of calling a function or reading a property: `Err` carries the thrown value
pub type Completion = Result<Value, Value>;

/// A value as seen by the promise engine
#[derive(Clone, Default)]
pub enum Value {
    /// `undefined`
    #[default]
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Boolean(bool),
    /// Number
    Number(f64),
    /// String
    String(Arc<str>),
    /// Ordered collection (the fulfillment value of `all`)
    Array(Arc<[Value]>),
    /// Host object
    Object(ObjectRef),
    /// Callable
    Function(Function),
    /// A promise owned by the engine
    Promise(PromiseId),
    /// Error produced by the engine
    Error(Arc<PromiseError>),
}

impl Value {
    /// Create a number value
    pub fn number(n: f64) -> Self {
        Self::Number(n)
    }

    /// Create a string value
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Self::String(s.into())
    }

    /// Create an array value
    pub fn array(items: impl Into<Arc<[Value]>>) -> Self {
        Self::Array(items.into())
    }

    /// Wrap a host object
    pub fn object(obj: impl HostObject + 'static) -> Self {
        Self::Object(ObjectRef::new(obj))
    }

    /// Wrap a promise id
    pub fn promise(id: PromiseId) -> Self {
        Self::Promise(id)
    }

    /// Check if undefined
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Object test used by thenable coercion. Primitives are never probed for `then`.
    pub fn is_object(&self) -> bool {
        matches!(
            self,
            Self::Array(_) | Self::Object(_) | Self::Function(_) | Self::Promise(_) | Self::Error(_)
        )
    }

    /// Check if callable
    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function(_))
    }

    /// Get as number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(&**s),
            _ => None,
        }
    }

    /// Get as array slice
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(&**items),
            _ => None,
        }
    }

    /// Get the promise id, if this is a promise
    pub fn as_promise(&self) -> Option<PromiseId> {
        match self {
            Self::Promise(id) => Some(*id),
            _ => None,
        }
    }

    /// Get the engine error, if this is one
    pub fn as_error(&self) -> Option<&PromiseError> {
        match self {
            Self::Error(err) => Some(&**err),
            _ => None,
        }
    }

    /// Get as function
    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Short type name, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Function(_) => "function",
            Self::Promise(_) => "promise",
            Self::Error(_) => "error",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            (Self::Promise(a), Self::Promise(b)) => a == b,
            (Self::Error(a), Self::Error(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Self::Object(obj) => write!(f, "{obj:?}"),
            Self::Function(_) => write!(f, "[Function]"),
            Self::Promise(id) => write!(f, "Promise({id})"),
            Self::Error(err) => write!(f, "{err}"),
        }
    }
}

impl From<PromiseError> for Value {
    fn from(err: PromiseError) -> Self {
        Self::Error(Arc::new(err))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s.into())
    }
}

impl From<PromiseId> for Value {
    fn from(id: PromiseId) -> Self {
        Self::Promise(id)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Self::Function(f)
    }
}

/// Property access on host objects.
///
/// `get` may fail; the thrown value is returned as `Err`. Accessor-backed
/// properties run arbitrary host code, so the engine never assumes a read is pure.
pub trait HostObject: Send + Sync {
    /// Read a property
    fn get(&self, key: &str) -> Completion;

    /// Class name shown in debug output
    fn class_name(&self) -> &str {
        "Object"
    }
}

/// Shared reference to a host object, compared by identity
#[derive(Clone)]
pub struct ObjectRef(Arc<dyn HostObject>);

impl ObjectRef {
    /// Wrap a host object
    pub fn new(obj: impl HostObject + 'static) -> Self {
        Self(Arc::new(obj))
    }

    /// Wrap an already shared host object
    pub fn from_arc(obj: Arc<dyn HostObject>) -> Self {
        Self(obj)
    }

    /// Read a property
    pub fn get(&self, key: &str) -> Completion {
        self.0.get(key)
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }

    /// Stable identity token for the lifetime of the object
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Non-owning back-reference
    pub fn downgrade(&self) -> Weak<dyn HostObject> {
        Arc::downgrade(&self.0)
    }

    /// Check whether `weak` still points at this object
    pub fn is_same_as(&self, weak: &Weak<dyn HostObject>) -> bool {
        weak.upgrade()
            .is_some_and(|strong| std::ptr::addr_eq(Arc::as_ptr(&strong), Arc::as_ptr(&self.0)))
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[object {}]", self.0.class_name())
    }
}

type NativeFn = dyn Fn(&mut Engine, &Value, &[Value]) -> Completion + Send + Sync;

/// A callable value: handlers, resolving functions and `then` methods
#[derive(Clone)]
pub struct Function(Arc<NativeFn>);

impl Function {
    /// Create a function taking `this` and an argument list
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Engine, &Value, &[Value]) -> Completion + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Create a function of one argument, ignoring `this`.
    ///
    /// Missing arguments are passed as `undefined`.
    pub fn unary<F>(f: F) -> Self
    where
        F: Fn(&mut Engine, Value) -> Completion + Send + Sync + 'static,
    {
        Self::new(move |engine, _this, args| {
            f(engine, args.first().cloned().unwrap_or_default())
        })
    }

    /// Call the function
    pub fn call(&self, engine: &mut Engine, this: &Value, args: &[Value]) -> Completion {
        (self.0)(engine, this, args)
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &Function) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Function]")
    }
}

/// Simple property-bag object
///
/// Useful for embedding and tests: a plain object whose `then` property can be
/// set to a [`Function`] to make it a thenable.
#[derive(Default)]
pub struct PlainObject {
    properties: Mutex<FxHashMap<String, Value>>,
}

impl PlainObject {
    /// Create an empty object
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style property definition
    pub fn with(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Define or overwrite a property
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.properties.lock().insert(key.into(), value.into());
    }
}

impl HostObject for PlainObject {
    fn get(&self, key: &str) -> Completion {
        Ok(self.properties.lock().get(key).cloned().unwrap_or_default())
    }
}
