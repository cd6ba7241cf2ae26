//! # Failure Pipeline
//!
//! Runs exactly once for every order that fails after admission, whichever step
//! failed:
//!
//! 1. failure alert to every operator (per-recipient failures are only logged)
//! 2. error-alert audio cue (best-effort)
//! 3. removal from the active-orders table (no-op if absent)
//! 4. dead-letter record, when enabled
//!
//! Nothing in here can fail the caller: a broken alerting channel must never mask
//! the order's own failure.

use crate::framework::{AlertNotifier, AudioPlayer};
use crate::model::SoundCue;
use crate::orchestrator::ActiveOrders;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Name the orchestrator signs its alerts with.
pub const ALERT_SOURCE: &str = "orchestrator";

/// A terminally failed order, kept for offline inspection or replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub order_id: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
}

impl DeadLetterRecord {
    pub fn new(order_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            error: error.into(),
            timestamp: Utc::now(),
            retry_count: 0,
        }
    }
}

/// Destination of dead-letter records.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn emit(&self, record: DeadLetterRecord);
}

/// Writes dead letters to the log as structured events.
#[derive(Debug, Default)]
pub struct LogDeadLetterSink;

#[async_trait]
impl DeadLetterSink for LogDeadLetterSink {
    async fn emit(&self, record: DeadLetterRecord) {
        match serde_json::to_string(&record) {
            Ok(json) => error!(order_id = %record.order_id, record = %json, "Dead letter"),
            Err(e) => error!(
                order_id = %record.order_id,
                error = %e,
                "Dead letter (unserializable)"
            ),
        }
    }
}

pub struct FailurePipeline {
    notifier: Arc<dyn AlertNotifier>,
    audio: Arc<dyn AudioPlayer>,
    active: ActiveOrders,
    /// `None` when dead-lettering is disabled.
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
}

impl FailurePipeline {
    pub fn new(
        notifier: Arc<dyn AlertNotifier>,
        audio: Arc<dyn AudioPlayer>,
        active: ActiveOrders,
        dead_letters: Option<Arc<dyn DeadLetterSink>>,
    ) -> Self {
        Self {
            notifier,
            audio,
            active,
            dead_letters,
        }
    }

    pub async fn handle(&self, order_id: &str, error: &str) {
        warn!(order_id, error, "Handling order failure");

        match self
            .notifier
            .send_failure_alert(ALERT_SOURCE, error, Some(order_id))
            .await
        {
            Ok(report) if report.all_delivered() => {
                info!(order_id, delivered = report.delivered, "Failure alert sent")
            }
            Ok(report) => warn!(
                order_id,
                delivered = report.delivered,
                failed = ?report.failed,
                "Failure alert partially delivered"
            ),
            Err(e) => warn!(order_id, error = %e, "Failure alert could not be sent"),
        }

        if let Err(e) = self.audio.play(SoundCue::ErrorAlert).await {
            warn!(order_id, error = %e, "Error cue could not be played");
        }

        self.active.remove(order_id);

        if let Some(sink) = &self.dead_letters {
            sink.emit(DeadLetterRecord::new(order_id, error)).await;
        }
    }
}
