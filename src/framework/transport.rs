//! # Transport Contract
//!
//! Every backend adapter implements [`Transport`] (lifecycle + health) and one or more
//! **capability traits** describing the remote operations it offers.
//!
//! The orchestrator never sees a concrete adapter type. It holds a [`Backends`] set of
//! capability trait objects, so a database reached over HTTP and a robot arm reached
//! over a pub/sub bus are driven through the same retry and failure-handling code.
//!
//! Every capability method represents a remote call and may be invoked more than once
//! under retry (at-least-once delivery). Adapters must tolerate that.

use crate::framework::error::{StepError, TransportError};
use crate::model::{
    ArmState, ComponentAlert, CustomerInfo, CustomerRecord, DeliveryReport, Order, ServingUnitInfo,
    SoundCue, WorkDeadlines, WorkRequest, WorkResult,
};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Wire family of a transport, reported by the health aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Request/response over HTTP.
    HttpClient,
    /// Publish, then wait for an asynchronous callback on another topic.
    PubSub,
    /// Request/response over the bus' service-call mechanism.
    ServiceCall,
    /// Local subprocess lifecycle.
    LocalOs,
    /// Outbound SMS notifications.
    Sms,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::HttpClient => "http_client",
            TransportKind::PubSub => "pub_sub",
            TransportKind::ServiceCall => "service_call",
            TransportKind::LocalOs => "local_os",
            TransportKind::Sms => "sms",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle and liveness contract shared by every adapter.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Registry name (e.g. `"robot_arm"`).
    fn name(&self) -> &str;

    fn kind(&self) -> TransportKind;

    /// Connects / validates resources. Called exactly once before use.
    async fn initialize(&self) -> Result<(), TransportError>;

    /// Releases resources. Best-effort: problems are logged, never returned.
    async fn shutdown(&self);

    /// Liveness check that may report why it failed.
    async fn health_check(&self) -> Result<bool, TransportError>;

    /// Liveness check that never fails: errors count as unhealthy.
    async fn is_healthy(&self) -> bool {
        match self.health_check().await {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!(transport = self.name(), error = %e, "Health check failed");
                false
            }
        }
    }
}

/// Customer lookup by order id.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn lookup_customer(&self, order_id: &str) -> Result<CustomerRecord, StepError>;
}

/// Disables menu items that depend on unavailable components.
#[async_trait]
pub trait MenuControl: Send + Sync {
    /// Returns the ids of the menu items that were disabled.
    async fn disable_menu_items(&self, components: &[String]) -> Result<Vec<String>, StepError>;
}

/// Robotic actuator: state query and work dispatch.
#[async_trait]
pub trait RobotArm: Send + Sync {
    async fn query_state(&self) -> Result<ArmState, StepError>;

    /// Dispatches work and waits for acknowledgment, then completion.
    ///
    /// Each milestone has its own deadline in `deadlines`; missing either one fails
    /// the whole call. A retry is a fresh dispatch, never a resume.
    async fn dispatch_work(
        &self,
        request: &WorkRequest,
        deadlines: WorkDeadlines,
    ) -> Result<WorkResult, StepError>;
}

/// Physical serving units that are opened for pickup.
#[async_trait]
pub trait ServingUnits: Send + Sync {
    /// Units needed for `order`. One unit per line item unless an adapter knows better.
    fn units_for(&self, order: &Order) -> Vec<String> {
        (0..order.items.len()).map(|i| format!("unit_{i}")).collect()
    }

    /// Opens a single unit. A unit that refuses to open is an error.
    async fn open_unit(&self, unit_id: &str) -> Result<(), StepError>;
}

/// Customer-facing display screen.
#[async_trait]
pub trait DisplayScreen: Send + Sync {
    async fn publish_customer_info(&self, info: &CustomerInfo) -> Result<(), StepError>;

    async fn publish_serving_units(
        &self,
        order_id: &str,
        units: &[ServingUnitInfo],
    ) -> Result<(), StepError>;
}

/// Audio cues.
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    async fn play(&self, cue: SoundCue) -> Result<(), StepError>;
}

/// Operator notifications.
///
/// Delivery to each recipient is independent; per-recipient failures are reported in
/// the [`DeliveryReport`], not as an error.
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn send_failure_alert(
        &self,
        system: &str,
        error: &str,
        order_id: Option<&str>,
    ) -> Result<DeliveryReport, StepError>;

    async fn send_component_alert(
        &self,
        alert: &ComponentAlert,
    ) -> Result<DeliveryReport, StepError>;
}

/// The capability set the orchestrator is written against.
#[derive(Clone)]
pub struct Backends {
    pub customers: Arc<dyn CustomerDirectory>,
    pub menu: Arc<dyn MenuControl>,
    pub arm: Arc<dyn RobotArm>,
    pub units: Arc<dyn ServingUnits>,
    pub screen: Arc<dyn DisplayScreen>,
    pub audio: Arc<dyn AudioPlayer>,
    pub notifier: Arc<dyn AlertNotifier>,
}
