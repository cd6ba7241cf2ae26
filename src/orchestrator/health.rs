//! # Health & Metrics
//!
//! A thin reader over the transport registry and the active-orders table. It cannot
//! fail: a check that errors, hangs past the check timeout, or panics is reported as
//! unhealthy with the reason.

use crate::framework::TransportKind;
use crate::lifecycle::TransportRegistry;
use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::debug;

/// Liveness of one transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportHealth {
    pub healthy: bool,
    #[serde(rename = "type")]
    pub kind: TransportKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Transport name to health, ordered by name.
pub type HealthReport = BTreeMap<String, TransportHealth>;

/// Static performance settings, echoed for observability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSnapshot {
    pub max_concurrent_orders: usize,
    #[serde(with = "crate::config::seconds")]
    pub order_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub active_orders: usize,
    pub transport_health: HealthReport,
    pub performance: PerformanceSnapshot,
}

pub struct HealthMonitor {
    registry: TransportRegistry,
    check_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(registry: TransportRegistry, check_timeout: Duration) -> Self {
        Self {
            registry,
            check_timeout,
        }
    }

    /// Checks every registered transport concurrently.
    pub async fn check_all(&self) -> HealthReport {
        let checks = self.registry.iter().map(|transport| async move {
            let kind = transport.kind();
            let check = tokio::time::timeout(self.check_timeout, transport.health_check());
            let health = match AssertUnwindSafe(check).catch_unwind().await {
                Ok(Ok(Ok(healthy))) => TransportHealth {
                    healthy,
                    kind,
                    error: None,
                },
                Ok(Ok(Err(e))) => unhealthy(kind, e.to_string()),
                Ok(Err(_)) => unhealthy(
                    kind,
                    format!("health check timed out after {:?}", self.check_timeout),
                ),
                Err(_) => unhealthy(kind, "health check panicked".to_string()),
            };
            debug!(transport = transport.name(), healthy = health.healthy, "Health checked");
            (transport.name().to_string(), health)
        });
        join_all(checks).await.into_iter().collect()
    }
}

fn unhealthy(kind: TransportKind, error: String) -> TransportHealth {
    TransportHealth {
        healthy: false,
        kind,
        error: Some(error),
    }
}
