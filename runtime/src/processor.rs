//! Per-message handling for the record keeper.
//!
//! Each message goes through a fixed sequence of stages. The first stage that
//! fails aborts the message; nothing is retried and earlier writes are kept.
//!
//! | stage                | entry | exit |
//! |----------------------|:-----:|:----:|
//! | `decode`             |   ✓   |  ✓   |
//! | `store_write`        |   ✓   |  ✓   |
//! | `store_read`         |       |  ✓   |
//! | `summary_generation` |       |  ✓   |
//! | `summary_post`       |       |  ✓   |

use crate::metrics::ProcessingMetrics;
use parking_sim_core::stores::{RecordStore, SinkError, StoreError, SummarySink};
use parking_sim_core::summary::{ParkingSummary, SummaryError};
use parking_sim_core::{EntryEvent, EventType, ExitEvent, ParkingEvent, RecordField, VehiclePlate};
use std::fmt;
use std::future::Future;
use std::time::Instant;
use thiserror::Error;

/// Where in the pipeline a message was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureStage {
    /// Payload is not a valid event.
    Decode,
    /// Timestamp could not be written.
    StoreWrite,
    /// Entry timestamp missing or unreadable.
    StoreRead,
    /// Summary could not be computed.
    SummaryGeneration,
    /// Collector did not accept the summary.
    SummaryPost,
}

impl FailureStage {
    /// Value of the `error_stage` metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Decode => "decode",
            Self::StoreWrite => "store_write",
            Self::StoreRead => "store_read",
            Self::SummaryGeneration => "summary_generation",
            Self::SummaryPost => "summary_post",
        }
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message that could not be fully processed.
#[derive(Error, Debug)]
pub enum ProcessingError {
    /// Malformed JSON, missing field, or bad timestamp.
    #[error("failed to decode event: {0}")]
    Decode(#[source] serde_json::Error),

    /// Record store write failed.
    #[error("failed to write {field} for {plate}: {source}")]
    StoreWrite {
        /// Vehicle being written
        plate: VehiclePlate,
        /// Field being written
        field: RecordField,
        /// Store error
        #[source]
        source: StoreError,
    },

    /// Record store read failed.
    #[error("failed to read entry time for {plate}: {source}")]
    StoreRead {
        /// Vehicle being read
        plate: VehiclePlate,
        /// Store error
        #[source]
        source: StoreError,
    },

    /// Exit for a vehicle that has no recorded entry.
    #[error("no entry recorded for {plate}")]
    MissingEntry {
        /// Vehicle that exited
        plate: VehiclePlate,
    },

    /// Summary could not be computed from the recorded times.
    #[error("invalid stay for {plate}: {source}")]
    Summary {
        /// Vehicle that exited
        plate: VehiclePlate,
        /// Why the stay is invalid
        #[source]
        source: SummaryError,
    },

    /// Collector did not accept the summary.
    #[error("failed to post summary for {plate}: {source}")]
    SummaryPost {
        /// Vehicle that exited
        plate: VehiclePlate,
        /// Sink error
        #[source]
        source: SinkError,
    },
}

impl ProcessingError {
    /// Stage label for metrics.
    #[must_use]
    pub const fn stage(&self) -> FailureStage {
        match self {
            Self::Decode(_) => FailureStage::Decode,
            Self::StoreWrite { .. } => FailureStage::StoreWrite,
            Self::StoreRead { .. } | Self::MissingEntry { .. } => FailureStage::StoreRead,
            Self::Summary { .. } => FailureStage::SummaryGeneration,
            Self::SummaryPost { .. } => FailureStage::SummaryPost,
        }
    }

    /// Whether the simulation produced an impossible event, as opposed to
    /// infrastructure failing.
    #[must_use]
    pub const fn is_data_integrity(&self) -> bool {
        matches!(self, Self::MissingEntry { .. } | Self::Summary { .. })
    }

    /// Coarse failure class used as a log field.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::MissingEntry { .. } | Self::Summary { .. } => "data_integrity",
            Self::StoreWrite { .. } | Self::StoreRead { .. } => "store_io",
            Self::SummaryPost { .. } => "downstream",
        }
    }
}

/// Handles one kind of message.
///
/// Implementors provide [`MessageProcessor::handle`]; callers use
/// [`MessageProcessor::process_message`], which adds timing, metrics and
/// logging around it.
pub trait MessageProcessor: Send + Sync {
    /// Event type this processor consumes.
    const EVENT_TYPE: EventType;

    /// Run the processing stages for one payload.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure as a [`ProcessingError`].
    fn handle(&self, payload: &[u8]) -> impl Future<Output = Result<(), ProcessingError>> + Send;

    /// Process one payload and record the outcome.
    ///
    /// # Errors
    ///
    /// Same as [`MessageProcessor::handle`]. The failure has already been
    /// counted and logged when it is returned.
    fn process_message(
        &self,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), ProcessingError>> + Send {
        async move {
            let start = Instant::now();
            let result = self.handle(payload).await;

            match &result {
                Ok(()) => {
                    ProcessingMetrics::record_success(Self::EVENT_TYPE, start.elapsed());
                }
                Err(e) => {
                    ProcessingMetrics::record_failure(Self::EVENT_TYPE, e.stage());
                    if e.is_data_integrity() {
                        tracing::warn!(
                            event_type = %Self::EVENT_TYPE,
                            stage = %e.stage(),
                            kind = e.kind(),
                            error = %e,
                            "Rejected impossible event"
                        );
                    } else {
                        tracing::error!(
                            event_type = %Self::EVENT_TYPE,
                            stage = %e.stage(),
                            kind = e.kind(),
                            error = %e,
                            "Failed to process message"
                        );
                    }
                }
            }

            result
        }
    }
}

/// Records entry times.
#[derive(Debug, Clone)]
pub struct EntryProcessor<R> {
    records: R,
}

impl<R: RecordStore> EntryProcessor<R> {
    /// Create a processor writing to `records`.
    #[must_use]
    pub const fn new(records: R) -> Self {
        Self { records }
    }
}

impl<R: RecordStore> MessageProcessor for EntryProcessor<R> {
    const EVENT_TYPE: EventType = EventType::Entry;

    async fn handle(&self, payload: &[u8]) -> Result<(), ProcessingError> {
        let event = EntryEvent::from_json(payload).map_err(ProcessingError::Decode)?;
        let field = RecordField::EntryDateTime;

        tracing::debug!(
            vehicle_plate = %event.vehicle_plate,
            event_id = %event.id,
            at = %event.entry_date_time,
            "Storing entry"
        );

        self.records
            .write_timestamp(&event.vehicle_plate, field, event.entry_date_time)
            .await
            .map_err(|source| ProcessingError::StoreWrite {
                plate: event.vehicle_plate.clone(),
                field,
                source,
            })?;

        tracing::info!(vehicle_plate = %event.vehicle_plate, "Entry recorded");
        Ok(())
    }
}

/// Records exit times and reports completed stays.
#[derive(Debug, Clone)]
pub struct ExitProcessor<R, S> {
    records: R,
    sink: S,
}

impl<R: RecordStore, S: SummarySink> ExitProcessor<R, S> {
    /// Create a processor writing to `records` and reporting to `sink`.
    #[must_use]
    pub const fn new(records: R, sink: S) -> Self {
        Self { records, sink }
    }
}

impl<R: RecordStore, S: SummarySink> MessageProcessor for ExitProcessor<R, S> {
    const EVENT_TYPE: EventType = EventType::Exit;

    async fn handle(&self, payload: &[u8]) -> Result<(), ProcessingError> {
        let event = ExitEvent::from_json(payload).map_err(ProcessingError::Decode)?;
        let plate = event.vehicle_plate;
        let field = RecordField::ExitDateTime;

        tracing::debug!(
            vehicle_plate = %plate,
            event_id = %event.id,
            at = %event.exit_date_time,
            "Storing exit"
        );

        if let Err(source) = self
            .records
            .write_timestamp(&plate, field, event.exit_date_time)
            .await
        {
            return Err(ProcessingError::StoreWrite { plate, field, source });
        }

        let entry = match self.records.read_timestamp(&plate, RecordField::EntryDateTime).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return Err(ProcessingError::MissingEntry { plate }),
            Err(source) => return Err(ProcessingError::StoreRead { plate, source }),
        };

        let summary = match ParkingSummary::generate(plate.clone(), entry, event.exit_date_time) {
            Ok(summary) => summary,
            Err(source) => return Err(ProcessingError::Summary { plate, source }),
        };

        if let Err(source) = self.sink.submit(&summary).await {
            return Err(ProcessingError::SummaryPost { plate, source });
        }

        tracing::info!(
            vehicle_plate = %summary.vehicle_plate,
            duration = %summary.duration,
            "Parking summary posted"
        );
        Ok(())
    }
}
