use crate::framework::StepError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The retried units of work of the saga (plus the menu-disable side path).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    ResolveCustomer,
    CheckArmState,
    DispatchWork,
    OpenUnits,
    UpdateScreen,
    PlaySound,
    DisableMenu,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::ResolveCustomer => "resolve_customer",
            StepKind::CheckArmState => "check_arm_state",
            StepKind::DispatchWork => "dispatch_work",
            StepKind::OpenUnits => "open_units",
            StepKind::UpdateScreen => "update_screen",
            StepKind::PlaySound => "play_sound",
            StepKind::DisableMenu => "disable_menu",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of `process_order` when the order did not complete.
///
/// Only [`OrderProcessingError::StepFailed`] is raised after admission and is the
/// only variant that runs the failure pipeline.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrderProcessingError {
    /// Malformed payload. Rejected before admission.
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    /// An order with the same id is already in flight.
    #[error("order {0} is already being processed")]
    DuplicateOrder(String),

    /// No admission slot freed up in time.
    #[error("order {order_id} not admitted within {waited:?}")]
    AdmissionTimeout { order_id: String, waited: Duration },

    /// The orchestrator is shutting down and admits no new orders.
    #[error("order {0} rejected: shutting down")]
    ShuttingDown(String),

    /// A step exhausted its retries or failed with a non-retryable error.
    #[error("order {order_id} failed at {step}: {source}")]
    StepFailed {
        order_id: String,
        step: StepKind,
        #[source]
        source: StepError,
    },
}

impl OrderProcessingError {
    pub fn step(&self) -> Option<StepKind> {
        match self {
            OrderProcessingError::StepFailed { step, .. } => Some(*step),
            _ => None,
        }
    }
}
