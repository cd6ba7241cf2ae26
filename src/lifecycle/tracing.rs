//! # Logging
//!
//! [`setup_tracing`] installs the global subscriber once, at startup.
//!
//! The filter comes from `RUST_LOG` when it is set, otherwise from `logging.level`
//! in the configuration file. Two output formats are available:
//!
//! | `logging.format` | Output |
//! |------------------|--------|
//! | `compact` | one short line per event, spans inline, no module paths |
//! | `json` | one JSON object per event, for log shippers |
//!
//! ```bash
//! # Everything the orchestrator does, transports at info
//! RUST_LOG=info,comm_layer::orchestrator=debug cargo run
//! ```
//!
//! Every order runs inside a `process_order` span carrying `order_id`, so a compact
//! line reads like:
//!
//! ```text
//! INFO process_order{order_id="order_123"}: Order completed estimated_time=40 serving_units=1
//! ```

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::EnvFilter;

pub fn setup_tracing(config: &LoggingConfig) -> Result<(), TryInitError> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().with_target(false).compact())
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    }
}
