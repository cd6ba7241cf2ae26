//! # Comm Layer
//!
//! > **An order orchestration engine for an automated food-serving station.**
//!
//! An order enters as an [`OrderRequest`](model::OrderRequest) and leaves as an
//! [`OrderResponse`](model::OrderResponse) or a typed
//! [`OrderProcessingError`](orchestrator::OrderProcessingError). In between, the
//! orchestrator drives it through a fixed sequence of steps against six external
//! backends, each reached over its own transport.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### Capabilities, not transports
//! The orchestrator never sees HTTP, bus topics or child processes. It depends on
//! narrow capability traits ([`CustomerDirectory`](framework::CustomerDirectory),
//! [`RobotArm`](framework::RobotArm), [`ServingUnits`](framework::ServingUnits), ...)
//! bundled in [`Backends`](framework::Backends). Each concrete client in [`clients`]
//! implements one or two of them plus the common [`Transport`](framework::Transport)
//! lifecycle.
//!
//! ### One retry primitive
//! Every remote call goes through [`retry`](framework::retry()) with a per-step
//! [`RetryPolicy`](framework::RetryPolicy): bounded attempts, exponential backoff,
//! an optional per-attempt timeout. Only transient failures are retried.
//!
//! ### Failures end in one place
//! Whatever step fails, the [`FailurePipeline`](orchestrator::FailurePipeline) runs
//! once: operator alert, error sound, removal from the active set, dead letter.
//!
//! ## 🗺️ Module Tour
//!
//! | Module | Role |
//! |--------|------|
//! | [`model`] | plain data: orders, arm messages, screen payloads, alerts |
//! | [`framework`] | errors, retry, transport and capability traits, mocks |
//! | [`clients`] | the six concrete transports and the in-process message bus |
//! | [`orchestrator`] | the saga, admission, failure handling, health |
//! | [`config`] | YAML configuration with defaults for every key |
//! | [`lifecycle`] | building, starting and stopping the whole system |
//!
//! ## Order Steps
//!
//! ```text
//! RECEIVED ─▶ CUSTOMER_RESOLVED ─▶ ARM_READY ─▶ WORK_DISPATCHED
//!     ─▶ UNITS_OPENED ─▶ SCREEN_UPDATED ─▶ COMPLETED
//!
//! any step ──(retries exhausted)──▶ FAILED ─▶ failure pipeline
//! ```
//!
//! ## 🚀 Quick Start
//!
//! ```bash
//! # Run with defaults (or config.yaml in the working directory)
//! RUST_LOG=info cargo run
//!
//! # Explicit configuration file
//! cargo run -- config.example.yaml
//! ```
//!
//! ### Running Tests
//!
//! ```bash
//! cargo test
//! ```

pub mod clients;
pub mod config;
pub mod framework;
pub mod lifecycle;
pub mod model;
pub mod orchestrator;
