use serde::{Deserialize, Serialize};

/// Priority attached to an outbound SMS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Normal,
    High,
}

/// A single SMS to a single recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmsMessage {
    pub recipient: String,
    pub message: String,
    pub priority: Priority,
}

/// Per-recipient outcome of one notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeliveryReport {
    pub delivered: usize,
    /// Recipients whose send failed.
    pub failed: Vec<String>,
}

impl DeliveryReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}
