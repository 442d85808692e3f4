//! Error types for the xcall engine.
//!
//! `CallError` is the single error surfaced at the boundary of a call. The
//! service-unavailable variant doubles as the "not handled" signal of an
//! executor: it is a first-class outcome, distinct from a handler that ran
//! and produced an empty result, and it never travels over the wire.

use serde_json::Value;
use thiserror::Error;
use xcall_core::NodeIdError;

/// Errors observed by a caller or raised by an executor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    /// The name (or its addressing) cannot be served here.
    ///
    /// Raised by an executor, this suppresses the response entirely so that
    /// another node sharing the channel may answer instead.
    #[error("service unavailable")]
    ServiceUnavailable,

    /// No response arrived before the request's timer fired.
    #[error("request timed out")]
    Timeout,

    /// The remote executor failed; carries the response's `error` payload.
    #[error("remote call failed: {0}")]
    Remote(Value),

    /// The messenger owning the pending request was dropped.
    #[error("messenger dropped before a response arrived")]
    Closed,

    /// A member or directory call received arguments it cannot interpret.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

impl CallError {
    /// Build a remote failure from any JSON-convertible payload.
    pub fn remote(payload: impl Into<Value>) -> Self {
        CallError::Remote(payload.into())
    }

    /// Whether this is the "not handled" signal.
    pub fn is_service_unavailable(&self) -> bool {
        matches!(self, CallError::ServiceUnavailable)
    }

    /// Payload placed in a response envelope's `error` field.
    ///
    /// Remote failures are forwarded verbatim; every other error travels as
    /// its display string. The payload is never `null`, which the receiving
    /// side reads as success.
    pub fn to_wire(&self) -> Value {
        match self {
            CallError::Remote(payload) if !payload.is_null() => payload.clone(),
            other => Value::String(other.to_string()),
        }
    }
}

/// Errors raised while validating a [`NodeConfig`](crate::NodeConfig).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeConfigError {
    /// The explicit node id is not a valid address prefix.
    #[error("invalid node id: {0}")]
    InvalidId(#[from] NodeIdError),

    /// The sub-channel id contains `:`, the separator of envelope type tags.
    #[error("channel id cannot contain ':': {0}")]
    InvalidChannelId(String),
}
