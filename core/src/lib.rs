//! # Parking Simulator Core
//!
//! Core types and capability traits shared by the parking simulator services.
//!
//! The simulator is made of two processes connected by an event transport:
//!
//! ```text
//! ┌───────────┐  entry/exit JSON  ┌───────────────┐  POST summary  ┌───────────┐
//! │ Generator │ ────────────────► │ Record Keeper │ ─────────────► │ Collector │
//! └─────┬─────┘                   └───────┬───────┘                └───────────┘
//!       │ SADD / SREM                     │ HSET / HGET
//!       ▼                                 ▼
//! ┌────────────────┐              ┌──────────────┐
//! │ Membership Set │              │ Record Store │
//! └────────────────┘              └──────────────┘
//! ```
//!
//! This crate holds everything both sides agree on:
//!
//! - [`event`]: entry/exit events and the per-vehicle record
//! - [`duration`]: the signed elapsed-time format used in summaries
//! - [`summary`]: parking summary generation
//! - [`stores`]: the membership, record and summary capability traits
//! - [`event_bus`]: the transport abstraction
//! - [`environment`]: injected time source
//!
//! No module here performs I/O; concrete stores and transports live in the
//! `parking-sim-redis` and `parking-sim-redpanda` crates, and in-memory fakes
//! live in `parking-sim-testing`.

pub mod duration;
pub mod event;
pub mod event_bus;
pub mod stores;
pub mod summary;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use duration::{DurationParseError, ParkingDuration};
pub use event::{
    EntryEvent, EventType, ExitEvent, InvalidPlateError, ParkingEvent, RecordField, VehiclePlate,
    VehicleRecord,
};
pub use event_bus::{EventBus, EventBusError, EventStream, Message};
pub use stores::{MembershipStore, RecordStore, SinkError, StoreError, SummarySink};
pub use summary::{ParkingSummary, SummaryError};

/// Injected dependencies that are not stores.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use parking_sim_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = chrono::Utc::now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time source used in production.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
