//! Error types for the virtual machine

use crate::value::JsValue;
use thiserror::Error;

/// Main error type for the virtual machine.
///
/// Native errors (`TypeError`, `RangeError`, ...) are lightweight until they
/// reach an exception handler, at which point the interpreter materializes
/// them into real JS error objects. `Quit` and `Timeout` are uncatchable:
/// they bypass every handler on the JS call stack.
#[derive(Debug, Clone, Error)]
pub enum JsError {
    #[error("TypeError: {message}")]
    TypeError { message: String },

    #[error("RangeError: {message}")]
    RangeError { message: String },

    #[error("ReferenceError: {message}")]
    ReferenceError { message: String },

    #[error("SyntaxError: {message}")]
    SyntaxError { message: String },

    /// A JS value in flight (the operand of `throw`, or a materialized error)
    #[error("Uncaught exception")]
    Thrown { value: JsValue },

    /// Host-requested termination; not observable by JS `catch`/`finally`
    #[error("Quit")]
    Quit,

    /// Execution time limit exceeded; uncatchable
    #[error("Javascript execution has timed out.")]
    Timeout,

    /// Bytecode failed structural verification
    #[error("Bytecode verification failed: {0}")]
    Verify(String),

    /// Interpreter invariant violation (malformed bytecode, dangling handle)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl JsError {
    pub fn type_error(message: impl Into<String>) -> Self {
        JsError::TypeError {
            message: message.into(),
        }
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        JsError::RangeError {
            message: message.into(),
        }
    }

    pub fn reference_error(message: impl Into<String>) -> Self {
        JsError::ReferenceError {
            message: message.into(),
        }
    }

    pub fn syntax_error(message: impl Into<String>) -> Self {
        JsError::SyntaxError {
            message: message.into(),
        }
    }

    /// Reference to an undeclared global
    pub fn not_defined(name: &str) -> Self {
        JsError::reference_error(format!("{} is not defined", name))
    }

    /// Create an internal error for unexpected interpreter states.
    /// These should never happen for verified bytecode.
    pub fn internal_error(message: impl Into<String>) -> Self {
        JsError::Internal(message.into())
    }

    /// Wrap a thrown JS value
    pub fn thrown(value: JsValue) -> Self {
        JsError::Thrown { value }
    }

    /// Whether JS `catch` handlers may observe this error
    pub fn is_catchable(&self) -> bool {
        !matches!(
            self,
            JsError::Quit | JsError::Timeout | JsError::Internal(_) | JsError::Verify(_)
        )
    }

    /// Constructor name and message for native errors
    pub fn native_parts(&self) -> Option<(&'static str, &str)> {
        match self {
            JsError::TypeError { message } => Some(("TypeError", message)),
            JsError::RangeError { message } => Some(("RangeError", message)),
            JsError::ReferenceError { message } => Some(("ReferenceError", message)),
            JsError::SyntaxError { message } => Some(("SyntaxError", message)),
            _ => None,
        }
    }

    /// The thrown JS value, if this error carries one
    pub fn value(&self) -> Option<&JsValue> {
        match self {
            JsError::Thrown { value } => Some(value),
            _ => None,
        }
    }
}
