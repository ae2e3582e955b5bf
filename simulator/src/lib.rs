//! # Parking Simulator
//!
//! Production wiring for the two simulator services:
//!
//! - `parking-generator` publishes entry or exit events and keeps the
//!   parked-vehicle set in Redis up to date
//! - `parking-record-keeper` consumes both topics, stores timestamps per
//!   vehicle and reports each completed stay to the summary collector
//!
//! The domain logic lives in `parking-sim-runtime`; this crate supplies
//! configuration, the HTTP collector client, startup retries, logging,
//! metrics and signal handling.

pub mod bootstrap;
pub mod collector;
pub mod config;
pub mod shutdown;
pub mod telemetry;

pub use collector::HttpSummarySink;
pub use config::{Config, ConfigError};
