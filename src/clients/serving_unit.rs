//! Serving units, opened through a request/response service call.

use crate::clients::bus::MessageBus;
use crate::config::ServingUnitsConfig;
use crate::framework::{ServingUnits, StepError, Transport, TransportError, TransportKind};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument};

const NAME: &str = "serving_units";

#[derive(Debug, Deserialize)]
struct OpenResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

pub struct ServingUnitClient {
    bus: Arc<dyn MessageBus>,
    config: ServingUnitsConfig,
    ready: AtomicBool,
}

impl ServingUnitClient {
    pub fn new(bus: Arc<dyn MessageBus>, config: ServingUnitsConfig) -> Self {
        Self {
            bus,
            config,
            ready: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Transport for ServingUnitClient {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> TransportKind {
        TransportKind::ServiceCall
    }

    async fn initialize(&self) -> Result<(), TransportError> {
        self.ready.store(true, Ordering::SeqCst);
        info!(
            transport = NAME,
            service = %self.config.services.open_unit,
            "Serving unit client initialized"
        );
        Ok(())
    }

    async fn shutdown(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    async fn health_check(&self) -> Result<bool, TransportError> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(TransportError::NotInitialized(NAME.into()));
        }
        Ok(self.bus.has_service(&self.config.services.open_unit))
    }
}

#[async_trait]
impl ServingUnits for ServingUnitClient {
    #[instrument(skip(self))]
    async fn open_unit(&self, unit_id: &str) -> Result<(), StepError> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(TransportError::NotInitialized(NAME.into()).into());
        }
        let answer = self
            .bus
            .call(
                &self.config.services.open_unit,
                json!({ "unit_id": unit_id }),
                self.config.call_timeout,
            )
            .await?;
        let response: OpenResponse =
            serde_json::from_value(answer).map_err(|e| TransportError::protocol(NAME, e))?;

        if response.success {
            debug!("Unit opened");
            Ok(())
        } else {
            let reason = response.message.unwrap_or_else(|| "refused".into());
            Err(StepError::state("opened", reason))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::bus::LocalBus;

    fn spawn_units(bus: &LocalBus, broken: &'static str) {
        let mut requests = bus.advertise(&ServingUnitsConfig::default().services.open_unit);
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                let unit = request.payload["unit_id"].as_str().unwrap_or_default().to_string();
                let answer = if unit == broken {
                    json!({ "success": false, "message": "door jammed" })
                } else {
                    json!({ "success": true })
                };
                let _ = request.respond_to.send(Ok(answer));
            }
        });
    }

    #[tokio::test]
    async fn refused_open_is_a_state_error() {
        let bus = Arc::new(LocalBus::new());
        spawn_units(&bus, "unit_1");
        let units = ServingUnitClient::new(bus, ServingUnitsConfig::default());
        units.initialize().await.unwrap();

        assert!(units.open_unit("unit_0").await.is_ok());
        let err = units.open_unit("unit_1").await.unwrap_err();
        assert_eq!(err, StepError::state("opened", "door jammed"));
        assert!(units.is_healthy().await);
    }

    #[tokio::test]
    async fn unhealthy_without_a_provider() {
        let bus = Arc::new(LocalBus::new());
        let units = ServingUnitClient::new(bus, ServingUnitsConfig::default());
        units.initialize().await.unwrap();
        assert!(!units.is_healthy().await);
        assert!(units.open_unit("unit_0").await.is_err());
    }
}
