//! # Parking Simulator Runtime
//!
//! The moving parts of the simulator, written against the capability traits
//! in `parking-sim-core`:
//!
//! - **Generator**: publishes entry or exit events and keeps the membership
//!   set in step with what was published
//! - **Processors**: decode one message, update the record store and, for
//!   exits, report the stay to the summary sink
//! - **Record Keeper**: two subscription loops driving the processors
//! - **Retry**: connect-with-backoff for every external dependency
//! - **Metrics**: Prometheus counters and histograms for all of the above
//!
//! ## Example
//!
//! ```ignore
//! use parking_sim_runtime::record_keeper::{RecordKeeper, RecordKeeperSettings};
//!
//! let (keeper, shutdown) = RecordKeeper::new(
//!     event_bus,
//!     record_store,
//!     summary_sink,
//!     RecordKeeperSettings {
//!         entry_topic: "entry_events_queue".into(),
//!         exit_topic: "exit_events_queue".into(),
//!     },
//! );
//!
//! let report = keeper.run().await?;
//! ```

/// Event generator
pub mod generator;

/// Prometheus metrics for observability
pub mod metrics;

/// Entry and exit message processors
pub mod processor;

/// Subscription loops for the record keeper
pub mod record_keeper;

/// Retry logic with exponential backoff
pub mod retry;

pub use generator::{Generator, GeneratorError, GeneratorMode, GeneratorSettings, StepOutcome};
pub use processor::{EntryProcessor, ExitProcessor, FailureStage, MessageProcessor, ProcessingError};
pub use record_keeper::{RecordKeeper, RecordKeeperReport, RecordKeeperSettings, StreamStats};
pub use retry::{BootstrapError, RetryPolicy, connect_with_retry, retry_with_backoff};
