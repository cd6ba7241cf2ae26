use crate::clients::MessageBus;
use crate::config::{AppConfig, PerformanceConfig};
use crate::framework::{Backends, StepError};
use crate::lifecycle::{build_transports, LifecycleError, TransportRegistry};
use crate::model::{AlertLevel, ComponentAlert, OrderRequest, OrderResponse};
use crate::orchestrator::{
    ActiveOrders, ComponentAlertHandler, ComponentAlertOutcome, DeadLetterSink, HealthMonitor,
    HealthReport, Metrics, Orchestrator, OrderProcessingError, PerformanceSnapshot, StepKind,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// The running communication layer.
///
/// `CommLayer` is responsible for:
/// - **Lifecycle Management**: initializing every transport at start, shutting them down at the end
/// - **Dependency Wiring**: handing the capability set to the orchestrator, the failure
///   pipeline and the component-alert handler
/// - **Alert Forwarding**: routing robot-arm component alerts to the alert handler
///
/// # Example
///
/// ```ignore
/// let system = CommLayer::start(config, Arc::new(LocalBus::new()), Arc::new(LogDeadLetterSink)).await?;
///
/// let response = system.process_order(request).await?;
/// let health = system.get_health_status().await;
///
/// system.shutdown().await;
/// ```
pub struct CommLayer {
    orchestrator: Arc<Orchestrator>,
    alerts: Arc<ComponentAlertHandler>,
    health: HealthMonitor,
    registry: TransportRegistry,
    performance: PerformanceConfig,
    /// Task forwarding robot-arm alerts (absent when wired from parts).
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl CommLayer {
    /// Builds every transport from `config`, initializes them and starts alert forwarding.
    pub async fn start(
        config: AppConfig,
        bus: Arc<dyn MessageBus>,
        dead_letters: Arc<dyn DeadLetterSink>,
    ) -> Result<Self, LifecycleError> {
        config.validate()?;
        let built = build_transports(&config.transports, bus);
        built.registry.initialize_all().await?;

        let system = Self::from_parts(config, built.backends, built.registry, dead_letters);

        let mut stream = built.robot_arm.subscribe_alerts();
        let handler = system.alerts.clone();
        let forwarder = tokio::spawn(async move {
            loop {
                match stream.recv().await {
                    Ok(alert) => {
                        handler.handle(&alert).await;
                    }
                    Err(RecvError::Lagged(missed)) => warn!(missed, "Component alerts dropped"),
                    Err(RecvError::Closed) => break,
                }
            }
        });
        *system.forwarder.lock() = Some(forwarder);

        info!(transports = system.registry.len(), "Comm layer started");
        Ok(system)
    }

    /// Wires already-built (and already-initialized) backends.
    pub fn from_parts(
        config: AppConfig,
        backends: Backends,
        registry: TransportRegistry,
        dead_letters: Arc<dyn DeadLetterSink>,
    ) -> Self {
        let alerts = Arc::new(ComponentAlertHandler::new(
            backends.notifier.clone(),
            backends.menu.clone(),
            config
                .orchestrator
                .steps
                .for_step(StepKind::DisableMenu)
                .clone(),
        ));
        let health = HealthMonitor::new(registry.clone(), config.orchestrator.health_check_timeout);
        let orchestrator = Arc::new(Orchestrator::new(
            backends,
            &config.performance,
            config.orchestrator,
            ActiveOrders::new(),
            dead_letters,
        ));

        Self {
            orchestrator,
            alerts,
            health,
            registry,
            performance: config.performance,
            forwarder: Mutex::new(None),
        }
    }

    /// Processes one order. See [`Orchestrator::process_order`].
    pub async fn process_order(
        &self,
        request: OrderRequest,
    ) -> Result<OrderResponse, OrderProcessingError> {
        self.orchestrator.process_order(request).await
    }

    pub async fn get_health_status(&self) -> HealthReport {
        self.health.check_all().await
    }

    pub async fn get_metrics(&self) -> Metrics {
        Metrics {
            active_orders: self.orchestrator.active_orders().len(),
            transport_health: self.health.check_all().await,
            performance: PerformanceSnapshot {
                max_concurrent_orders: self.performance.max_concurrent_orders,
                order_timeout: self.performance.order_timeout,
            },
        }
    }

    /// Handles an inventory alert. An unknown level is rejected before anything is sent.
    pub async fn handle_component_alert(
        &self,
        component: &str,
        level: &str,
        message: &str,
    ) -> Result<ComponentAlertOutcome, StepError> {
        let level: AlertLevel = level.parse().map_err(StepError::Validation)?;
        let alert = ComponentAlert::new(component, level, message);
        Ok(self.alerts.handle(&alert).await)
    }

    pub fn active_orders(&self) -> &ActiveOrders {
        self.orchestrator.active_orders()
    }

    /// Free admission slots.
    pub fn available_slots(&self) -> usize {
        self.orchestrator.available_slots()
    }

    pub fn registry(&self) -> &TransportRegistry {
        &self.registry
    }

    /// Stops admitting orders, stops alert forwarding and shuts every transport down.
    ///
    /// Shutdown problems are logged, never returned.
    pub async fn shutdown(&self) {
        info!("Shutting down comm layer...");
        self.orchestrator.close();

        let forwarder = self.forwarder.lock().take();
        if let Some(forwarder) = forwarder {
            forwarder.abort();
            if let Err(e) = forwarder.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Alert forwarder failed");
                }
            }
        }

        self.registry.shutdown_all().await;
        info!("Comm layer shutdown complete.");
    }
}
