//! # Configuration
//!
//! The whole process is configured from one YAML document, read once at startup.
//! Every section has defaults, so an empty document is a valid configuration.
//!
//! Durations are written as seconds (floating point):
//!
//! ```yaml
//! performance: { max_concurrent_orders: 10, order_timeout: 30.0 }
//! orchestrator:
//!   unit_failure_threshold: all
//!   steps:
//!     check_arm_state: { max_attempts: 5, backoff_factor: 1.5, initial_delay: 0.5, timeout: 10.0 }
//! ```

pub mod transports;

pub use transports::*;

use crate::framework::RetryPolicy;
use crate::orchestrator::StepKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub orchestrator: OrchestratorConfig,
    pub transports: TransportsConfig,
}

impl AppConfig {
    /// Reads and validates the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: AppConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks serde cannot express. Retry policies validate themselves.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.performance.max_concurrent_orders == 0 {
            return Err(ConfigError::Invalid(
                "performance.max_concurrent_orders must be at least 1".into(),
            ));
        }
        let positive = [
            ("performance.order_timeout", self.performance.order_timeout),
            ("orchestrator.completion_timeout", self.orchestrator.completion_timeout),
            ("orchestrator.health_check_timeout", self.orchestrator.health_check_timeout),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Logging
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Compact,
        }
    }
}

// -----------------------------------------------------------------------------
// Performance
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PerformanceConfig {
    /// Size of the admission gate.
    pub max_concurrent_orders: usize,
    /// Longest an order waits for admission.
    #[serde(with = "seconds")]
    pub order_timeout: Duration,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_concurrent_orders: 10,
            order_timeout: Duration::from_secs(30),
        }
    }
}

// -----------------------------------------------------------------------------
// Orchestrator
// -----------------------------------------------------------------------------

/// When the serving-unit step as a whole counts as failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitFailureThreshold {
    /// Only when every requested unit failed.
    #[default]
    All,
    /// As soon as one unit failed.
    Any,
}

impl UnitFailureThreshold {
    /// Whether the step failed, given how many units failed out of `requested`.
    pub fn is_breached(&self, failed: usize, requested: usize) -> bool {
        match self {
            UnitFailureThreshold::All => requested > 0 && failed == requested,
            UnitFailureThreshold::Any => failed > 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeadLetterConfig {
    pub enabled: bool,
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Deadline for the work-completion milestone of a dispatch.
    #[serde(with = "seconds")]
    pub completion_timeout: Duration,
    pub unit_failure_threshold: UnitFailureThreshold,
    /// When false, a failed completion sound is logged and the order still completes.
    pub completion_sound_fatal: bool,
    #[serde(with = "seconds")]
    pub health_check_timeout: Duration,
    pub dead_letter: DeadLetterConfig,
    pub steps: StepPolicies,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            completion_timeout: Duration::from_secs(30),
            unit_failure_threshold: UnitFailureThreshold::All,
            completion_sound_fatal: true,
            health_check_timeout: Duration::from_secs(2),
            dead_letter: DeadLetterConfig::default(),
            steps: StepPolicies::default(),
        }
    }
}

/// Retry policy per step kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StepPolicies {
    pub resolve_customer: RetryPolicy,
    pub check_arm_state: RetryPolicy,
    pub dispatch_work: RetryPolicy,
    pub open_unit: RetryPolicy,
    pub update_screen: RetryPolicy,
    pub play_sound: RetryPolicy,
    pub disable_menu: RetryPolicy,
}

impl StepPolicies {
    pub fn for_step(&self, step: StepKind) -> &RetryPolicy {
        match step {
            StepKind::ResolveCustomer => &self.resolve_customer,
            StepKind::CheckArmState => &self.check_arm_state,
            StepKind::DispatchWork => &self.dispatch_work,
            StepKind::OpenUnits => &self.open_unit,
            StepKind::UpdateScreen => &self.update_screen,
            StepKind::PlaySound => &self.play_sound,
            StepKind::DisableMenu => &self.disable_menu,
        }
    }
}

impl Default for StepPolicies {
    fn default() -> Self {
        Self {
            resolve_customer: RetryPolicy::preset(3, 2.0, 1_000, Some(5_000)),
            check_arm_state: RetryPolicy::preset(5, 1.5, 500, Some(10_000)),
            dispatch_work: RetryPolicy::preset(5, 1.5, 500, Some(10_000)),
            open_unit: RetryPolicy::preset(3, 1.5, 500, Some(5_000)),
            update_screen: RetryPolicy::preset(3, 1.5, 500, Some(3_000)),
            play_sound: RetryPolicy::preset(2, 1.0, 500, None),
            disable_menu: RetryPolicy::preset(3, 2.0, 1_000, Some(5_000)),
        }
    }
}

/// Serde adapter for durations written as (fractional) seconds.
pub(crate) mod seconds {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            de::Error::custom(format!("expected a non-negative number of seconds, got {secs}"))
        })
    }
}
