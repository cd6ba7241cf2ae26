//! # Lifecycle
//!
//! Startup and shutdown of the communication layer.
//!
//! | Item | Role |
//! |------|------|
//! | [`build_transports`] | constructs every transport from configuration |
//! | [`TransportRegistry`] | initializes transports in order, shuts them down in reverse |
//! | [`CommLayer`] | the running system: orchestrator, health, alert forwarding |
//! | [`setup_tracing`] | installs the global `tracing` subscriber |
//!
//! ```text
//! AppConfig ──▶ build_transports ──▶ TransportRegistry::initialize_all
//!                                          │
//!                                          ▼
//!                                      CommLayer ──▶ shutdown()
//! ```

pub mod registry;
pub mod system;
pub mod tracing;

pub use registry::{build_transports, BuiltTransports, TransportRegistry};
pub use system::CommLayer;
pub use tracing::setup_tracing;

use crate::config::ConfigError;
use crate::framework::TransportError;
use thiserror::Error;

/// Errors that prevent the communication layer from starting.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("transport {transport} failed to initialize: {source}")]
    TransportInit {
        transport: String,
        #[source]
        source: TransportError,
    },
}
