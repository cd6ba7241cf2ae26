//! # comm-layer
//!
//! Runs the communication layer until Ctrl-C.
//!
//! The configuration file is taken from `COMM_LAYER_CONFIG`, then from the first
//! argument, then from `config.yaml` in the working directory. When none of those
//! name a file that exists, built-in defaults are used.

use comm_layer::clients::LocalBus;
use comm_layer::config::AppConfig;
use comm_layer::lifecycle::{setup_tracing, CommLayer};
use comm_layer::orchestrator::LogDeadLetterSink;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[tokio::main]
async fn main() -> Result<(), String> {
    let explicit = std::env::var_os("COMM_LAYER_CONFIG")
        .map(PathBuf::from)
        .or_else(|| std::env::args_os().nth(1).map(PathBuf::from));

    let (config, source) = match explicit {
        Some(path) => (AppConfig::load(&path).map_err(|e| e.to_string())?, Some(path)),
        None if PathBuf::from(DEFAULT_CONFIG_PATH).exists() => (
            AppConfig::load(DEFAULT_CONFIG_PATH).map_err(|e| e.to_string())?,
            Some(PathBuf::from(DEFAULT_CONFIG_PATH)),
        ),
        None => (AppConfig::default(), None),
    };

    // Setup tracing once for the entire application
    setup_tracing(&config.logging).map_err(|e| e.to_string())?;
    match &source {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => warn!("No configuration file found, using defaults"),
    }

    let system = CommLayer::start(config, Arc::new(LocalBus::new()), Arc::new(LogDeadLetterSink))
        .await
        .map_err(|e| e.to_string())?;

    info!("Comm layer running, press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
    }

    system.shutdown().await;
    Ok(())
}
