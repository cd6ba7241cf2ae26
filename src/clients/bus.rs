//! # Message Bus
//!
//! The robot arm, the serving units and the display screen are reached through a
//! robotics middleware offering three primitives:
//!
//! | Primitive | Shape | Used by |
//! |-----------|-------|---------|
//! | `publish` | fire-and-forget on a topic | screen, arm requests |
//! | `subscribe` | stream of every message on a topic | arm callbacks |
//! | `call` | request/response on a named service | serving units |
//!
//! [`MessageBus`] is that contract. [`LocalBus`] implements it in-process with
//! `tokio::sync::broadcast` topics and services advertised as `mpsc` channels whose
//! requests carry a `oneshot` responder.
//!
//! ```text
//! caller ──call()──▶ mpsc::Sender<ServiceRequest> ──▶ service task
//!    ▲                                                   │
//!    └──────────────── oneshot respond_to ◀──────────────┘
//! ```

use crate::framework::TransportError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, trace};

/// Messages travel as JSON documents.
pub type Payload = Value;

/// One-shot channel a service answers through.
pub type Responder = oneshot::Sender<Result<Payload, TransportError>>;

/// A request delivered to an advertised service.
#[derive(Debug)]
pub struct ServiceRequest {
    pub payload: Payload,
    pub respond_to: Responder,
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes `payload` on `topic`. Succeeds even when nobody is listening.
    async fn publish(&self, topic: &str, payload: Payload) -> Result<(), TransportError>;

    /// Receives every message published on `topic` from now on.
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<Payload>;

    /// Calls `service` and waits up to `timeout` for its answer.
    async fn call(
        &self,
        service: &str,
        payload: Payload,
        timeout: Duration,
    ) -> Result<Payload, TransportError>;

    /// Whether a provider is currently advertising `service`.
    fn has_service(&self, service: &str) -> bool;
}

const DEFAULT_TOPIC_CAPACITY: usize = 256;
const DEFAULT_SERVICE_BUFFER: usize = 32;

/// In-process bus.
pub struct LocalBus {
    topics: DashMap<String, broadcast::Sender<Payload>>,
    services: DashMap<String, mpsc::Sender<ServiceRequest>>,
    capacity: usize,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }

    /// Bus whose topics buffer up to `capacity` messages per slow subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            services: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Advertises `service`, replacing any previous provider.
    ///
    /// The returned receiver yields every call made to the service. Dropping it
    /// withdraws the service.
    pub fn advertise(&self, service: &str) -> mpsc::Receiver<ServiceRequest> {
        let (sender, receiver) = mpsc::channel(DEFAULT_SERVICE_BUFFER);
        self.services.insert(service.to_string(), sender);
        debug!(service, "Service advertised");
        receiver
    }

    fn topic(&self, topic: &str) -> broadcast::Sender<Payload> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn publish(&self, topic: &str, payload: Payload) -> Result<(), TransportError> {
        // A send error only means there is no subscriber right now.
        let receivers = self.topic(topic).send(payload).unwrap_or(0);
        trace!(topic, receivers, "Published");
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> broadcast::Receiver<Payload> {
        self.topic(topic).subscribe()
    }

    async fn call(
        &self,
        service: &str,
        payload: Payload,
        timeout: Duration,
    ) -> Result<Payload, TransportError> {
        // Clone the sender out so no map guard is held across an await.
        let sender = self
            .services
            .get(service)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::unavailable(service, "service not advertised"))?;

        let (respond_to, response) = oneshot::channel();
        let request = ServiceRequest {
            payload,
            respond_to,
        };

        let exchange = async {
            sender
                .send(request)
                .await
                .map_err(|_| TransportError::unavailable(service, "service provider gone"))?;
            response
                .await
                .map_err(|_| TransportError::remote(service, "service dropped the request"))?
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::timeout(service, timeout)),
        }
    }

    fn has_service(&self, service: &str) -> bool {
        self.services
            .get(service)
            .map(|sender| !sender.is_closed())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscribers_receive_published_messages() {
        let bus = LocalBus::new();
        let mut first = bus.subscribe("/t");
        let mut second = bus.subscribe("/t");

        bus.publish("/t", json!({"n": 1})).await.unwrap();

        assert_eq!(first.recv().await.unwrap(), json!({"n": 1}));
        assert_eq!(second.recv().await.unwrap(), json!({"n": 1}));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let bus = LocalBus::new();
        assert!(bus.publish("/nobody", json!(null)).await.is_ok());
    }

    #[tokio::test]
    async fn call_round_trips_through_the_provider() {
        let bus = LocalBus::new();
        let mut requests = bus.advertise("/echo");
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                let _ = request.respond_to.send(Ok(request.payload));
            }
        });

        assert!(bus.has_service("/echo"));
        let answer = bus
            .call("/echo", json!({"unit_id": "unit_0"}), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(answer, json!({"unit_id": "unit_0"}));
    }

    #[tokio::test]
    async fn call_to_unknown_service_is_unavailable() {
        let bus = LocalBus::new();
        let err = bus
            .call("/missing", json!({}), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Unavailable { .. }));
        assert!(!bus.has_service("/missing"));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_provider_times_out() {
        let bus = LocalBus::new();
        let _requests = bus.advertise("/slow");
        let err = bus
            .call("/slow", json!({}), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::timeout("/slow", Duration::from_millis(200)));
    }
}
