//! # Relay Core Promise Errors
//!
//! [`PromiseError`] covers misuse of the promise API (self resolution,
//! conflicting settlement) as well as the error values a rejected promise
//! surfaces through [`Promise::wait`](crate::promise::Promise::wait):
//! cancellation, aggregate failures from combinators and wait failures.
//!
//! [`Reason`] is the rejection reason carried by a promise. It is plain data
//! until a caller unwraps it.
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::promise::PromiseState;

#[derive(Debug, Clone, Error)]
pub enum PromiseError {
    #[error("Cannot fulfill or reject a promise with itself")]
    SelfResolution,

    #[error("The promise is already {state}")]
    AlreadySettled { state: PromiseState },

    #[error("Cannot change a {from} promise to {to}")]
    StateConflict { from: PromiseState, to: PromiseState },

    #[error("The promise is already resolving with another promise")]
    AlreadyResolving,

    #[error("The promise was rejected with reason: {reason}")]
    Rejected { reason: Value },

    #[error("Promise has been cancelled")]
    Cancelled,

    #[error("{message} ({} rejection(s))", reasons.len())]
    Aggregate { message: String, reasons: Vec<Reason> },

    #[error("{0}")]
    WaitFailed(String),

    #[error("Promise handler panicked: {0}")]
    HandlerPanicked(String),

    #[error("Promise handler failed: {0}")]
    HandlerFailed(String),
}

/// Rejection reason of a promise.
#[derive(Debug, Clone)]
pub enum Reason {
    /// Arbitrary data supplied to `reject`
    Value(Value),
    /// A structured error, shared so every handler sees the same instance
    Error(Arc<PromiseError>),
}

impl Reason {
    pub fn value(value: impl Into<Value>) -> Self {
        Reason::Value(value.into())
    }

    pub fn error(error: PromiseError) -> Self {
        Reason::Error(Arc::new(error))
    }

    pub fn as_error(&self) -> Option<&PromiseError> {
        match self {
            Reason::Error(e) => Some(e),
            Reason::Value(_) => None,
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self.as_error(), Some(PromiseError::Cancelled))
    }

    /// Identity comparison used for idempotent re-rejection.
    pub(crate) fn same_as(&self, other: &Reason) -> bool {
        match (self, other) {
            (Reason::Value(a), Reason::Value(b)) => a == b,
            (Reason::Error(a), Reason::Error(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Convert into the error a caller sees when unwrapping the rejection.
    pub fn into_error(self) -> PromiseError {
        match self {
            Reason::Value(reason) => PromiseError::Rejected { reason },
            Reason::Error(e) => Arc::try_unwrap(e).unwrap_or_else(|shared| (*shared).clone()),
        }
    }

    /// JSON rendering used by settlement descriptors.
    pub fn to_value(&self) -> Value {
        match self {
            Reason::Value(v) => v.clone(),
            Reason::Error(e) => Value::String(e.to_string()),
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Value(v) => write!(f, "The promise was rejected with reason: {}", v),
            Reason::Error(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Reason {}

impl From<PromiseError> for Reason {
    fn from(error: PromiseError) -> Self {
        Reason::error(error)
    }
}

impl From<Value> for Reason {
    fn from(value: Value) -> Self {
        Reason::Value(value)
    }
}

impl From<&str> for Reason {
    fn from(msg: &str) -> Self {
        Reason::Value(Value::String(msg.to_string()))
    }
}

impl From<String> for Reason {
    fn from(msg: String) -> Self {
        Reason::Value(Value::String(msg))
    }
}

impl From<crate::kernel::error::Error> for Reason {
    fn from(error: crate::kernel::error::Error) -> Self {
        match error {
            crate::kernel::error::Error::Promise(e) => Reason::error(e),
            other => Reason::error(PromiseError::HandlerFailed(other.to_string())),
        }
    }
}
