//! Per-transport settings. Every field has a default matching the deployed topology.

use super::seconds;
use crate::model::SoundCue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportsConfig {
    pub database: DatabaseConfig,
    pub robot_arm: RobotArmConfig,
    pub serving_units: ServingUnitsConfig,
    pub screen: ScreenConfig,
    pub sound: SoundConfig,
    pub notifier: NotifierConfig,
}

// -----------------------------------------------------------------------------
// Database (HTTP)
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub base_url: String,
    #[serde(with = "seconds")]
    pub request_timeout: Duration,
    pub endpoints: DatabaseEndpoints,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            base_url: "http://database-service:8080".into(),
            request_timeout: Duration::from_secs(5),
            endpoints: DatabaseEndpoints::default(),
        }
    }
}

/// Endpoint paths. `{order_id}` is substituted in the customer lookup path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseEndpoints {
    pub customer_lookup: String,
    pub menu_disable: String,
    pub health: String,
}

impl Default for DatabaseEndpoints {
    fn default() -> Self {
        Self {
            customer_lookup: "/customer/{order_id}".into(),
            menu_disable: "/menu/disable".into(),
            health: "/health".into(),
        }
    }
}

// -----------------------------------------------------------------------------
// Robot arm (pub/sub)
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RobotArmConfig {
    /// How long a state query waits for its response.
    #[serde(with = "seconds")]
    pub state_timeout: Duration,
    pub topics: RobotArmTopics,
}

impl Default for RobotArmConfig {
    fn default() -> Self {
        Self {
            state_timeout: Duration::from_secs(10),
            topics: RobotArmTopics::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RobotArmTopics {
    pub state_request: String,
    pub state_response: String,
    pub work_request: String,
    pub work_ack: String,
    pub work_complete: String,
    pub component_alert: String,
}

impl Default for RobotArmTopics {
    fn default() -> Self {
        Self {
            state_request: "/robot_arm/state".into(),
            state_response: "/robot_arm/state_response".into(),
            work_request: "/robot_arm/work".into(),
            work_ack: "/robot_arm/work_ack".into(),
            work_complete: "/robot_arm/work_complete".into(),
            component_alert: "/robot_arm/component_alert".into(),
        }
    }
}

// -----------------------------------------------------------------------------
// Serving units (service call)
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServingUnitsConfig {
    #[serde(with = "seconds")]
    pub call_timeout: Duration,
    pub services: ServingUnitServices,
}

impl Default for ServingUnitsConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
            services: ServingUnitServices::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServingUnitServices {
    pub open_unit: String,
}

impl Default for ServingUnitServices {
    fn default() -> Self {
        Self {
            open_unit: "/serving_unit/open".into(),
        }
    }
}

// -----------------------------------------------------------------------------
// Screen (fire-and-forget publish)
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScreenConfig {
    pub topics: ScreenTopics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScreenTopics {
    pub customer_info: String,
    pub serving_units: String,
}

impl Default for ScreenTopics {
    fn default() -> Self {
        Self {
            customer_info: "/android_screen/customer_info".into(),
            serving_units: "/android_screen/serving_units".into(),
        }
    }
}

// -----------------------------------------------------------------------------
// Sound (local subprocess)
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SoundConfig {
    pub player_command: String,
    /// Arguments placed before the audio file.
    pub player_args: Vec<String>,
    pub audio_files: BTreeMap<SoundCue, PathBuf>,
    /// Grace period for a stopped playback to exit.
    #[serde(with = "seconds")]
    pub stop_timeout: Duration,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            player_command: "mpv".into(),
            player_args: vec!["--no-video".into(), "--really-quiet".into()],
            audio_files: BTreeMap::from([
                (SoundCue::OrderComplete, PathBuf::from("/sounds/order_complete.wav")),
                (SoundCue::ErrorAlert, PathBuf::from("/sounds/error_alert.wav")),
            ]),
            stop_timeout: Duration::from_secs(2),
        }
    }
}

// -----------------------------------------------------------------------------
// Notifier (SMS)
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmsProviderKind {
    /// Writes messages to the log instead of sending them.
    #[default]
    #[serde(alias = "abstract")]
    Log,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifierConfig {
    pub provider: SmsProviderKind,
    pub recipients: Vec<String>,
}
