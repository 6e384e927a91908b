//! Promise error types
//!
//! These never surface as Rust errors from the engine. They become rejection
//! reasons (`Value::Error`) on the promise that hit them.

use thiserror::Error;

/// Errors the engine itself produces as rejection reasons
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromiseError {
    /// A promise was resolved with itself
    #[error("TypeError: Promise cannot resolve itself")]
    SelfResolution,

    /// A promise was resolved with a promise that (transitively) follows it,
    /// or a thenable resolved its own adapter with itself
    #[error("TypeError: Chaining cycle detected for promise")]
    ChainingCycle,

    /// `then`/`catch` was invoked on something that is not a promise
    #[error("TypeError: {0} is not a promise")]
    NotAPromise(String),

    /// Generic type error raised by host objects or functions
    #[error("TypeError: {0}")]
    TypeError(String),
}

impl PromiseError {
    /// Create a generic type error
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Whether this error describes a resolution cycle
    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::SelfResolution | Self::ChainingCycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_type_error_shaped() {
        assert_eq!(
            PromiseError::SelfResolution.to_string(),
            "TypeError: Promise cannot resolve itself"
        );
        assert_eq!(
            PromiseError::NotAPromise("number".into()).to_string(),
            "TypeError: number is not a promise"
        );
        assert!(PromiseError::ChainingCycle.is_cycle());
        assert!(!PromiseError::type_error("boom").is_cycle());
    }
}
