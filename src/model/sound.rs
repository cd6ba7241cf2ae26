use serde::{Deserialize, Serialize};
use std::fmt;

/// Audio cues the orchestrator plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundCue {
    OrderComplete,
    ErrorAlert,
}

impl SoundCue {
    pub fn as_str(&self) -> &'static str {
        match self {
            SoundCue::OrderComplete => "order_complete",
            SoundCue::ErrorAlert => "error_alert",
        }
    }
}

impl fmt::Display for SoundCue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
