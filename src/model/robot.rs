//! Payloads exchanged with the robot arm.

use crate::model::OrderItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Reported state of the robot arm. Only [`ArmState::Up`] accepts work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ArmState {
    Up,
    Down,
    Failure,
}

impl ArmState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ArmState::Up)
    }
}

impl fmt::Display for ArmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArmState::Up => "UP",
            ArmState::Down => "DOWN",
            ArmState::Failure => "FAILURE",
        })
    }
}

/// Work payload sent to the arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkRequest {
    pub order_id: String,
    pub items: Vec<OrderItem>,
    pub priority: u8,
}

/// Outcome of completed work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkResult {
    pub order_id: String,
    pub success: bool,
    pub completed_at: DateTime<Utc>,
    /// Opaque details reported by the arm.
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Deadlines for the two milestones of a work dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkDeadlines {
    pub ack: Duration,
    pub completion: Duration,
}

/// Severity of a component alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Critical,
    /// The component has run out.
    Empty,
}

impl AlertLevel {
    /// Whether notifications for this level go out with high priority.
    pub fn is_urgent(&self) -> bool {
        matches!(self, AlertLevel::Critical | AlertLevel::Empty)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
            AlertLevel::Empty => "empty",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "warning" => Ok(AlertLevel::Warning),
            "critical" => Ok(AlertLevel::Critical),
            "empty" => Ok(AlertLevel::Empty),
            other => Err(format!("unknown alert level: {other}")),
        }
    }
}

/// Inventory alert raised by the arm (e.g. "milk empty").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentAlert {
    pub component: String,
    pub level: AlertLevel,
    pub message: String,
}

impl ComponentAlert {
    pub fn new(
        component: impl Into<String>,
        level: AlertLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            level,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm_state_wire_format() {
        let state: ArmState = serde_json::from_str("\"DOWN\"").unwrap();
        assert_eq!(state, ArmState::Down);
        assert!(!state.is_ready());
        assert!(ArmState::Up.is_ready());
    }

    #[test]
    fn alert_levels_parse_case_insensitively() {
        assert_eq!("EMPTY".parse::<AlertLevel>(), Ok(AlertLevel::Empty));
        assert!("low".parse::<AlertLevel>().is_err());
        assert!(AlertLevel::Critical.is_urgent());
        assert!(!AlertLevel::Warning.is_urgent());
    }
}
