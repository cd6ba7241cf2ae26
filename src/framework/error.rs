//! # Step Errors
//!
//! Every remote call made on behalf of an order fails with a [`StepError`].
//! The variants decide how the [retry engine](crate::framework::retry) treats the failure:
//!
//! | Variant | Meaning | Retried? |
//! |---------|---------|----------|
//! | [`StepError::Transport`] | The remote call could not be completed | yes |
//! | [`StepError::State`] | The call worked but the answer does not allow progress | yes |
//! | [`StepError::Validation`] | The request itself is malformed | no |

use std::time::Duration;
use thiserror::Error;

/// A remote call could not be completed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    /// The backend could not be reached (connection refused, process missing, ...).
    #[error("{transport} unavailable: {reason}")]
    Unavailable { transport: String, reason: String },

    /// A local deadline elapsed while waiting for the remote side.
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// The backend answered with an explicit error.
    #[error("remote error from {transport}: {reason}")]
    Remote { transport: String, reason: String },

    /// The transport was used before `initialize` (or after `shutdown`).
    #[error("transport {0} is not initialized")]
    NotInitialized(String),

    /// The backend answered with something we could not decode.
    #[error("protocol error from {transport}: {reason}")]
    Protocol { transport: String, reason: String },
}

impl TransportError {
    pub fn unavailable(transport: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unavailable {
            transport: transport.into(),
            reason: reason.to_string(),
        }
    }

    pub fn remote(transport: impl Into<String>, reason: impl ToString) -> Self {
        Self::Remote {
            transport: transport.into(),
            reason: reason.to_string(),
        }
    }

    pub fn protocol(transport: impl Into<String>, reason: impl ToString) -> Self {
        Self::Protocol {
            transport: transport.into(),
            reason: reason.to_string(),
        }
    }

    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }
}

/// Failure of a single step attempt.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StepError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Malformed request (unknown sound cue, bad payload). Never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The backend answered, but not with something we can progress on.
    #[error("unexpected state: expected {expected}, got {actual}")]
    State { expected: String, actual: String },
}

impl StepError {
    pub fn state(expected: impl ToString, actual: impl ToString) -> Self {
        Self::State {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// Errors the retry engine knows how to classify.
///
/// The engine never looks inside an error beyond these two questions, which keeps
/// it usable around any asynchronous operation.
pub trait Retryable {
    /// Whether another attempt may be made after this error.
    fn is_retryable(&self) -> bool;

    /// Build the error reported when a single attempt exceeds its timeout.
    fn attempt_timed_out(operation: &str, after: Duration) -> Self;
}

impl Retryable for StepError {
    fn is_retryable(&self) -> bool {
        !matches!(self, StepError::Validation(_))
    }

    fn attempt_timed_out(operation: &str, after: Duration) -> Self {
        StepError::Transport(TransportError::timeout(operation, after))
    }
}
