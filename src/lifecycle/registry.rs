//! # Transport Registry
//!
//! Transports are constructed explicitly, in one place, by [`build_transports`].
//! The registry maps names to the constructed instances; it is filled once at
//! startup and only read afterwards.

use crate::clients::{
    DatabaseClient, LogSmsProvider, MessageBus, RobotArmClient, ScreenClient, ServingUnitClient,
    SmsNotifier, SmsProvider, SoundPlayer,
};
use crate::config::{SmsProviderKind, TransportsConfig};
use crate::framework::{Backends, Transport};
use crate::lifecycle::LifecycleError;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

/// Named transports, kept in registration order.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    transports: Vec<Arc<dyn Transport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `transport`, replacing any transport with the same name.
    pub fn register(&mut self, transport: Arc<dyn Transport>) {
        if let Some(slot) = self
            .transports
            .iter_mut()
            .find(|t| t.name() == transport.name())
        {
            warn!(transport = transport.name(), "Transport registered twice, replacing");
            *slot = transport;
        } else {
            self.transports.push(transport);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Transport>> {
        self.transports.iter().find(|t| t.name() == name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Transport>> {
        self.transports.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.transports.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.transports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }

    /// Initializes every transport in registration order.
    ///
    /// On the first failure the transports already initialized are shut down again
    /// and the failure is returned.
    pub async fn initialize_all(&self) -> Result<(), LifecycleError> {
        for (index, transport) in self.transports.iter().enumerate() {
            if let Err(source) = transport.initialize().await {
                warn!(
                    transport = transport.name(),
                    error = %source,
                    "Transport failed to initialize"
                );
                for started in self.transports[..index].iter().rev() {
                    started.shutdown().await;
                }
                return Err(LifecycleError::TransportInit {
                    transport: transport.name().to_string(),
                    source,
                });
            }
            info!(transport = transport.name(), kind = %transport.kind(), "Transport ready");
        }
        Ok(())
    }

    /// Shuts every transport down concurrently.
    pub async fn shutdown_all(&self) {
        join_all(self.transports.iter().map(|t| t.shutdown())).await;
    }
}

/// Everything [`build_transports`] constructs.
pub struct BuiltTransports {
    pub backends: Backends,
    pub registry: TransportRegistry,
    /// Kept typed for its component-alert stream.
    pub robot_arm: Arc<RobotArmClient>,
}

/// Constructs every adapter once. Nothing is initialized yet.
pub fn build_transports(config: &TransportsConfig, bus: Arc<dyn MessageBus>) -> BuiltTransports {
    let database = Arc::new(DatabaseClient::new(config.database.clone()));
    let robot_arm = Arc::new(RobotArmClient::new(bus.clone(), config.robot_arm.clone()));
    let units = Arc::new(ServingUnitClient::new(bus.clone(), config.serving_units.clone()));
    let screen = Arc::new(ScreenClient::new(bus, config.screen.clone()));
    let sound = Arc::new(SoundPlayer::new(config.sound.clone()));
    let provider: Arc<dyn SmsProvider> = match config.notifier.provider {
        SmsProviderKind::Log => Arc::new(LogSmsProvider),
    };
    let notifier = Arc::new(SmsNotifier::new(provider, config.notifier.recipients.clone()));

    let mut registry = TransportRegistry::new();
    registry.register(database.clone());
    registry.register(robot_arm.clone());
    registry.register(units.clone());
    registry.register(screen.clone());
    registry.register(sound.clone());
    registry.register(notifier.clone());

    let backends = Backends {
        customers: database.clone(),
        menu: database,
        arm: robot_arm.clone(),
        units,
        screen,
        audio: sound,
        notifier,
    };

    BuiltTransports {
        backends,
        registry,
        robot_arm,
    }
}
