//! Plain data types shared by the orchestrator and the adapters.

pub mod customer;
pub mod display;
pub mod notification;
pub mod order;
pub mod robot;
pub mod sound;

pub use customer::*;
pub use display::*;
pub use notification::*;
pub use order::*;
pub use robot::*;
pub use sound::*;
