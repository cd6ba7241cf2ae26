//! # SMS Notifier
//!
//! Sends operator alerts to every configured recipient. Each recipient is tried
//! independently: one failed send is logged and counted, never propagated.
//!
//! Message formats:
//!
//! ```text
//! SYSTEM FAILURE: ORCHESTRATOR - robot arm not ready (Order: order_123)
//! Component Alert - MILK: Milk container is empty
//! ```

use crate::framework::{AlertNotifier, StepError, Transport, TransportError, TransportKind};
use crate::model::{ComponentAlert, DeliveryReport, Priority, SmsMessage};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

const NAME: &str = "notifier";

/// Delivers a single SMS. Provider wire protocols live behind this trait.
#[async_trait]
pub trait SmsProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the provider can currently accept messages.
    async fn is_available(&self) -> bool;

    async fn send(&self, message: &SmsMessage) -> Result<(), TransportError>;
}

/// Provider that only logs what it would send.
#[derive(Debug, Default)]
pub struct LogSmsProvider;

#[async_trait]
impl SmsProvider for LogSmsProvider {
    fn name(&self) -> &str {
        "log"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn send(&self, message: &SmsMessage) -> Result<(), TransportError> {
        info!(
            recipient = %message.recipient,
            priority = ?message.priority,
            text = %message.message,
            "SMS"
        );
        Ok(())
    }
}

pub fn failure_message(system: &str, error: &str, order_id: Option<&str>) -> String {
    let mut message = format!("SYSTEM FAILURE: {} - {}", system.to_uppercase(), error);
    if let Some(order_id) = order_id {
        message.push_str(&format!(" (Order: {order_id})"));
    }
    message
}

pub fn component_message(alert: &ComponentAlert) -> String {
    format!(
        "Component Alert - {}: {}",
        alert.component.to_uppercase(),
        alert.message
    )
}

pub struct SmsNotifier {
    provider: Arc<dyn SmsProvider>,
    recipients: Vec<String>,
}

impl SmsNotifier {
    pub fn new(provider: Arc<dyn SmsProvider>, recipients: Vec<String>) -> Self {
        Self {
            provider,
            recipients,
        }
    }

    async fn broadcast(&self, text: String, priority: Priority) -> DeliveryReport {
        if self.recipients.is_empty() {
            warn!(transport = NAME, "No recipients configured, alert dropped");
            return DeliveryReport::default();
        }

        let sends = self.recipients.iter().map(|recipient| {
            let message = SmsMessage {
                recipient: recipient.clone(),
                message: text.clone(),
                priority,
            };
            async move {
                let outcome = self.provider.send(&message).await;
                (message.recipient, outcome)
            }
        });

        let mut report = DeliveryReport::default();
        for (recipient, outcome) in join_all(sends).await {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(transport = NAME, %recipient, error = %e, "SMS delivery failed");
                    report.failed.push(recipient);
                }
            }
        }
        report
    }
}

#[async_trait]
impl Transport for SmsNotifier {
    fn name(&self) -> &str {
        NAME
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Sms
    }

    async fn initialize(&self) -> Result<(), TransportError> {
        if self.recipients.is_empty() {
            warn!(transport = NAME, "Notifier has no recipients");
        }
        info!(
            transport = NAME,
            provider = self.provider.name(),
            recipients = self.recipients.len(),
            "Notifier initialized"
        );
        Ok(())
    }

    async fn shutdown(&self) {}

    async fn health_check(&self) -> Result<bool, TransportError> {
        Ok(self.provider.is_available().await)
    }
}

#[async_trait]
impl AlertNotifier for SmsNotifier {
    async fn send_failure_alert(
        &self,
        system: &str,
        error: &str,
        order_id: Option<&str>,
    ) -> Result<DeliveryReport, StepError> {
        let text = failure_message(system, error, order_id);
        Ok(self.broadcast(text, Priority::High).await)
    }

    async fn send_component_alert(
        &self,
        alert: &ComponentAlert,
    ) -> Result<DeliveryReport, StepError> {
        let priority = if alert.level.is_urgent() {
            Priority::High
        } else {
            Priority::Normal
        };
        Ok(self.broadcast(component_message(alert), priority).await)
    }
}
