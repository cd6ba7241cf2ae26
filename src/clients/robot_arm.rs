//! # Robot Arm Client
//!
//! The arm is driven over the bus with a publish-then-await-callback protocol:
//!
//! ```text
//! query_state:    register(request_id) ─▶ publish state_request ─▶ await state_response
//! dispatch_work:  register(order_id)   ─▶ publish work_request  ─▶ await work_ack
//!                                                               ─▶ await work_complete
//! ```
//!
//! A one-shot handle is registered **before** publishing so a fast answer can never
//! be missed, and it is removed on every exit path (answer, timeout or error) so
//! abandoned waits do not leak. A background listener task routes incoming callbacks
//! to the registered handles.
//!
//! The listener also collects component alerts (e.g. "milk empty"), keeping the last
//! ten and re-broadcasting them to [`RobotArmClient::subscribe_alerts`].

use crate::clients::bus::{MessageBus, Payload};
use crate::config::RobotArmConfig;
use crate::framework::{
    RobotArm, StepError, Transport, TransportError, TransportKind,
};
use crate::model::{ArmState, ComponentAlert, WorkDeadlines, WorkRequest, WorkResult};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

const NAME: &str = "robot_arm";
const RECENT_ALERTS: usize = 10;

#[derive(Debug, Deserialize)]
struct StateResponse {
    request_id: u64,
    state: ArmState,
}

#[derive(Debug, Deserialize)]
struct WorkAck {
    order_id: String,
}

/// Handles waiting for callbacks, plus the alert history.
struct Pending {
    states: DashMap<u64, oneshot::Sender<ArmState>>,
    acks: DashMap<String, oneshot::Sender<()>>,
    completions: DashMap<String, oneshot::Sender<WorkResult>>,
    recent_alerts: Mutex<VecDeque<ComponentAlert>>,
    alerts: broadcast::Sender<ComponentAlert>,
}

impl Pending {
    fn new() -> Self {
        Self {
            states: DashMap::new(),
            acks: DashMap::new(),
            completions: DashMap::new(),
            recent_alerts: Mutex::new(VecDeque::with_capacity(RECENT_ALERTS)),
            alerts: broadcast::channel(64).0,
        }
    }

    fn on_state(&self, payload: Payload) {
        match serde_json::from_value::<StateResponse>(payload) {
            Ok(response) => match self.states.remove(&response.request_id) {
                Some((_, waiter)) => {
                    let _ = waiter.send(response.state);
                }
                None => debug!(request_id = response.request_id, "Late state response ignored"),
            },
            Err(e) => warn!(error = %e, "Malformed state response"),
        }
    }

    fn on_ack(&self, payload: Payload) {
        match serde_json::from_value::<WorkAck>(payload) {
            Ok(ack) => {
                if let Some((_, waiter)) = self.acks.remove(&ack.order_id) {
                    let _ = waiter.send(());
                }
            }
            Err(e) => warn!(error = %e, "Malformed work ack"),
        }
    }

    fn on_complete(&self, payload: Payload) {
        match serde_json::from_value::<WorkResult>(payload) {
            Ok(result) => {
                // A completion implies the acknowledgment, even if that got lost.
                if let Some((_, ack)) = self.acks.remove(&result.order_id) {
                    let _ = ack.send(());
                }
                match self.completions.remove(&result.order_id) {
                    Some((_, waiter)) => {
                        let _ = waiter.send(result);
                    }
                    None => debug!(order_id = %result.order_id, "Late work completion ignored"),
                }
            }
            Err(e) => warn!(error = %e, "Malformed work completion"),
        }
    }

    fn on_alert(&self, payload: Payload) {
        match serde_json::from_value::<ComponentAlert>(payload) {
            Ok(alert) => {
                warn!(
                    component = %alert.component,
                    level = %alert.level,
                    message = %alert.message,
                    "Component alert"
                );
                {
                    let mut recent = self.recent_alerts.lock();
                    if recent.len() == RECENT_ALERTS {
                        recent.pop_front();
                    }
                    recent.push_back(alert.clone());
                }
                let _ = self.alerts.send(alert);
            }
            Err(e) => warn!(error = %e, "Malformed component alert"),
        }
    }
}

/// Removes a dispatch's registrations when the dispatch ends, however it ends.
struct WorkRegistration<'a> {
    pending: &'a Pending,
    order_id: &'a str,
}

impl Drop for WorkRegistration<'_> {
    fn drop(&mut self) {
        self.pending.acks.remove(self.order_id);
        self.pending.completions.remove(self.order_id);
    }
}

struct StateRegistration<'a> {
    pending: &'a Pending,
    request_id: u64,
}

impl Drop for StateRegistration<'_> {
    fn drop(&mut self) {
        self.pending.states.remove(&self.request_id);
    }
}

struct Listener {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct RobotArmClient {
    bus: Arc<dyn MessageBus>,
    config: RobotArmConfig,
    pending: Arc<Pending>,
    next_request_id: AtomicU64,
    listener: Mutex<Option<Listener>>,
}

impl RobotArmClient {
    pub fn new(bus: Arc<dyn MessageBus>, config: RobotArmConfig) -> Self {
        Self {
            bus,
            config,
            pending: Arc::new(Pending::new()),
            next_request_id: AtomicU64::new(1),
            listener: Mutex::new(None),
        }
    }

    /// Stream of component alerts received from now on.
    pub fn subscribe_alerts(&self) -> broadcast::Receiver<ComponentAlert> {
        self.pending.alerts.subscribe()
    }

    /// Up to the last ten component alerts, oldest first.
    pub fn recent_alerts(&self) -> Vec<ComponentAlert> {
        self.pending.recent_alerts.lock().iter().cloned().collect()
    }

    /// Number of callbacks currently awaited.
    pub fn pending_waits(&self) -> usize {
        self.pending.states.len() + self.pending.acks.len() + self.pending.completions.len()
    }

    fn ensure_listening(&self) -> Result<(), TransportError> {
        match &*self.listener.lock() {
            Some(listener) if !listener.handle.is_finished() => Ok(()),
            _ => Err(TransportError::NotInitialized(NAME.into())),
        }
    }

    async fn publish<T: serde::Serialize + Sync>(
        &self,
        topic: &str,
        message: &T,
    ) -> Result<(), StepError> {
        let payload = serde_json::to_value(message).map_err(|e| TransportError::protocol(NAME, e))?;
        self.bus.publish(topic, payload).await?;
        Ok(())
    }
}

enum Inbound {
    Message(Payload),
    Skip,
    Closed,
}

fn inbound(topic: &str, received: Result<Payload, RecvError>) -> Inbound {
    match received {
        Ok(payload) => Inbound::Message(payload),
        Err(RecvError::Lagged(missed)) => {
            warn!(topic, missed, "Listener lagged behind");
            Inbound::Skip
        }
        Err(RecvError::Closed) => Inbound::Closed,
    }
}

#[async_trait]
impl Transport for RobotArmClient {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> TransportKind {
        TransportKind::PubSub
    }

    async fn initialize(&self) -> Result<(), TransportError> {
        let topics = &self.config.topics;
        // Subscribe before spawning so nothing published after initialize is missed.
        let mut states = self.bus.subscribe(&topics.state_response);
        let mut acks = self.bus.subscribe(&topics.work_ack);
        let mut completions = self.bus.subscribe(&topics.work_complete);
        let mut alerts = self.bus.subscribe(&topics.component_alert);
        let pending = self.pending.clone();
        let (stop, mut stopped) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            loop {
                let (topic, received) = tokio::select! {
                    _ = &mut stopped => break,
                    r = states.recv() => ("state_response", r),
                    r = acks.recv() => ("work_ack", r),
                    r = completions.recv() => ("work_complete", r),
                    r = alerts.recv() => ("component_alert", r),
                };
                let payload = match inbound(topic, received) {
                    Inbound::Message(payload) => payload,
                    Inbound::Skip => continue,
                    Inbound::Closed => break,
                };
                match topic {
                    "state_response" => pending.on_state(payload),
                    "work_ack" => pending.on_ack(payload),
                    "work_complete" => pending.on_complete(payload),
                    _ => pending.on_alert(payload),
                }
            }
            debug!("Robot arm listener stopped");
        });

        if let Some(previous) = self.listener.lock().replace(Listener { stop, handle }) {
            previous.handle.abort();
        }
        info!(transport = NAME, "Robot arm client initialized");
        Ok(())
    }

    async fn shutdown(&self) {
        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            let _ = listener.stop.send(());
            if let Err(e) = listener.handle.await {
                warn!(transport = NAME, error = %e, "Listener task ended abnormally");
            }
        }
        self.pending.states.clear();
        self.pending.acks.clear();
        self.pending.completions.clear();
        info!(transport = NAME, "Robot arm client shut down");
    }

    async fn health_check(&self) -> Result<bool, TransportError> {
        self.ensure_listening()?;
        Ok(true)
    }
}

#[async_trait]
impl RobotArm for RobotArmClient {
    #[instrument(skip(self))]
    async fn query_state(&self) -> Result<ArmState, StepError> {
        self.ensure_listening()?;
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (sender, answer) = oneshot::channel();
        self.pending.states.insert(request_id, sender);
        let _registration = StateRegistration {
            pending: &self.pending,
            request_id,
        };

        self.publish(&self.config.topics.state_request, &json!({ "request_id": request_id }))
            .await?;

        let timeout = self.config.state_timeout;
        match tokio::time::timeout(timeout, answer).await {
            Ok(Ok(state)) => {
                debug!(request_id, %state, "Arm state received");
                Ok(state)
            }
            Ok(Err(_)) => Err(TransportError::remote(NAME, "state request abandoned").into()),
            Err(_) => Err(TransportError::timeout("arm state query", timeout).into()),
        }
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn dispatch_work(
        &self,
        request: &WorkRequest,
        deadlines: WorkDeadlines,
    ) -> Result<WorkResult, StepError> {
        self.ensure_listening()?;
        let order_id = request.order_id.as_str();
        let (ack_tx, ack) = oneshot::channel();
        let (done_tx, done) = oneshot::channel();
        self.pending.acks.insert(order_id.to_string(), ack_tx);
        self.pending.completions.insert(order_id.to_string(), done_tx);
        let _registration = WorkRegistration {
            pending: &self.pending,
            order_id,
        };

        self.publish(&self.config.topics.work_request, request).await?;

        match tokio::time::timeout(deadlines.ack, ack).await {
            Ok(Ok(())) => debug!("Work acknowledged"),
            Ok(Err(_)) => {
                return Err(TransportError::remote(NAME, "work acknowledgment abandoned").into())
            }
            Err(_) => {
                return Err(TransportError::timeout("work acknowledgment", deadlines.ack).into())
            }
        }

        let result = match tokio::time::timeout(deadlines.completion, done).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                return Err(TransportError::remote(NAME, "work completion abandoned").into())
            }
            Err(_) => {
                return Err(
                    TransportError::timeout("work completion", deadlines.completion).into()
                )
            }
        };

        if !result.success {
            let details = format!("work failed: {}", result.details);
            return Err(TransportError::remote(NAME, details).into());
        }
        info!("Work completed");
        Ok(result)
    }
}
