//! Customer-facing display, updated with fire-and-forget publishes.

use crate::clients::bus::MessageBus;
use crate::config::ScreenConfig;
use crate::framework::{DisplayScreen, StepError, Transport, TransportError, TransportKind};
use crate::model::{CustomerInfo, ServingUnitInfo};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

const NAME: &str = "screen";

#[derive(Serialize)]
struct ServingUnitsMessage<'a> {
    order_id: &'a str,
    units: &'a [ServingUnitInfo],
}

pub struct ScreenClient {
    bus: Arc<dyn MessageBus>,
    config: ScreenConfig,
    ready: AtomicBool,
}

impl ScreenClient {
    pub fn new(bus: Arc<dyn MessageBus>, config: ScreenConfig) -> Self {
        Self {
            bus,
            config,
            ready: AtomicBool::new(false),
        }
    }

    async fn publish<T: Serialize + Sync>(
        &self,
        topic: &str,
        message: &T,
    ) -> Result<(), StepError> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(TransportError::NotInitialized(NAME.into()).into());
        }
        let payload = serde_json::to_value(message).map_err(|e| TransportError::protocol(NAME, e))?;
        self.bus.publish(topic, payload).await?;
        debug!(topic, "Screen updated");
        Ok(())
    }
}

#[async_trait]
impl Transport for ScreenClient {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> TransportKind {
        TransportKind::PubSub
    }

    async fn initialize(&self) -> Result<(), TransportError> {
        self.ready.store(true, Ordering::SeqCst);
        info!(transport = NAME, "Screen client initialized");
        Ok(())
    }

    async fn shutdown(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    async fn health_check(&self) -> Result<bool, TransportError> {
        Ok(self.ready.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl DisplayScreen for ScreenClient {
    async fn publish_customer_info(&self, info: &CustomerInfo) -> Result<(), StepError> {
        self.publish(&self.config.topics.customer_info, info).await
    }

    async fn publish_serving_units(
        &self,
        order_id: &str,
        units: &[ServingUnitInfo],
    ) -> Result<(), StepError> {
        let message = ServingUnitsMessage { order_id, units };
        self.publish(&self.config.topics.serving_units, &message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::bus::LocalBus;
    use crate::model::UnitStatus;

    #[tokio::test]
    async fn publishes_on_both_topics() {
        let bus = Arc::new(LocalBus::new());
        let topics = ScreenConfig::default().topics;
        let mut customers = bus.subscribe(&topics.customer_info);
        let mut units = bus.subscribe(&topics.serving_units);

        let screen = ScreenClient::new(bus, ScreenConfig::default());
        screen.initialize().await.unwrap();

        let info = CustomerInfo {
            order_id: "order_123".into(),
            customer_name: "Ada".into(),
            estimated_time: 40,
        };
        screen.publish_customer_info(&info).await.unwrap();
        let unit = ServingUnitInfo {
            unit_id: "unit_0".into(),
            item_name: "Espresso".into(),
            status: UnitStatus::Opened,
        };
        screen.publish_serving_units("order_123", &[unit]).await.unwrap();

        let published = customers.recv().await.unwrap();
        assert_eq!(published["customer_name"], "Ada");
        let published = units.recv().await.unwrap();
        assert_eq!(published["order_id"], "order_123");
        assert_eq!(published["units"][0]["status"], "opened");
    }
}
