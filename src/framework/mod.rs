//! Backend-agnostic building blocks of the orchestration engine.
//!
//! # Main Components
//!
//! - [`Transport`] - Lifecycle + health contract every adapter implements
//! - Capability traits ([`CustomerDirectory`], [`RobotArm`], [`ServingUnits`], ...) - the remote operations
//! - [`retry`](retry::retry) and [`RetryPolicy`] - uniform retry/backoff/timeout around any operation
//! - [`StepError`] / [`TransportError`] - the step-level error taxonomy
//!
//! # Testing
//!
//! See [`mock`] for scripted backends that let the orchestrator run without any real peer.

pub mod error;
pub mod mock;
pub mod retry;
pub mod transport;

pub use error::*;
pub use retry::{retry, InvalidRetryPolicy, RetryPolicy};
pub use transport::*;
