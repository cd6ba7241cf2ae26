//! Concrete adapters for every backend the orchestrator talks to.
//!
//! | Adapter | Transport kind | Capabilities |
//! |---------|----------------|--------------|
//! | [`DatabaseClient`] | HTTP | customer lookup, menu disable |
//! | [`RobotArmClient`] | pub/sub with callbacks | state query, work dispatch |
//! | [`ServingUnitClient`] | service call | unit open |
//! | [`ScreenClient`] | pub/sub, fire-and-forget | display publish |
//! | [`SoundPlayer`] | local subprocess | audio cue |
//! | [`SmsNotifier`] | SMS provider | operator alerts |

pub mod bus;
pub mod database;
pub mod notifier;
pub mod robot_arm;
pub mod screen;
pub mod serving_unit;
pub mod sound;

pub use bus::{LocalBus, MessageBus, Payload, ServiceRequest};
pub use database::DatabaseClient;
pub use notifier::{LogSmsProvider, SmsNotifier, SmsProvider};
pub use robot_arm::RobotArmClient;
pub use screen::ScreenClient;
pub use serving_unit::ServingUnitClient;
pub use sound::SoundPlayer;
