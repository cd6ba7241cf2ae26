//! # Order Orchestrator
//!
//! | Part | Role |
//! |------|------|
//! | [`Orchestrator`] | Admission gate and the step sequence of one order |
//! | [`ActiveOrders`] | In-flight orders, keyed by id |
//! | [`FailurePipeline`] | Uniform reaction to a terminally failed order |
//! | [`ComponentAlertHandler`] | Inventory alerts and menu disabling |
//! | [`HealthMonitor`] | Transport liveness for health and metrics |

pub mod active;
pub mod alerts;
pub mod error;
pub mod failure;
pub mod health;
pub mod saga;

pub use active::{ActiveOrder, ActiveOrders, Admission};
pub use alerts::{ComponentAlertHandler, ComponentAlertOutcome};
pub use error::{OrderProcessingError, StepKind};
pub use failure::{
    DeadLetterRecord, DeadLetterSink, FailurePipeline, LogDeadLetterSink, ALERT_SOURCE,
};
pub use health::{HealthMonitor, HealthReport, Metrics, PerformanceSnapshot, TransportHealth};
pub use saga::{open_units_concurrently, Orchestrator};
