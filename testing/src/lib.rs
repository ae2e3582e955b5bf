//! # Parking Simulator Testing
//!
//! In-memory stand-ins for everything the simulator talks to:
//! - [`InMemoryEventBus`]: topics and subscriptions without a broker
//! - [`MockMembershipStore`] and [`MockRecordStore`]: Redis-free state
//! - [`MockSummarySink`]: captures summaries instead of POSTing them
//! - [`FixedClock`]: deterministic time
//!
//! ## Example
//!
//! ```ignore
//! use parking_sim_testing::{InMemoryEventBus, MockRecordStore, MockSummarySink};
//! use parking_sim_runtime::record_keeper::{RecordKeeper, RecordKeeperSettings};
//!
//! #[tokio::test]
//! async fn exit_posts_summary() {
//!     let bus = InMemoryEventBus::new();
//!     let records = MockRecordStore::new();
//!     let sink = MockSummarySink::new();
//!     let (keeper, _shutdown) =
//!         RecordKeeper::new(Arc::new(bus.clone()), records, sink.clone(), settings());
//!
//!     // publish entry + exit, then close the bus so the keeper drains and stops
//!     bus.close();
//!     keeper.run().await.unwrap();
//!
//!     assert_eq!(sink.summaries().unwrap().len(), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use parking_sim_core::environment::Clock;

pub mod event_bus;
pub mod stores;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use parking_sim_testing::mocks::FixedClock;
    /// use parking_sim_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2024-09-11 10:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::from_timestamp(1_726_048_800, 0).unwrap_or_default())
    }
}

// Re-export commonly used items
pub use event_bus::InMemoryEventBus;
pub use mocks::{FixedClock, test_clock};
pub use stores::{MembershipOp, MockMembershipStore, MockRecordStore, MockSummarySink};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_fixed() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().to_rfc3339(), "2024-09-11T10:00:00+00:00");
    }
}
