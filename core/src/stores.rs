//! Capability traits for the shared state and the summary collector.
//!
//! Each trait is one narrow role so that production clients (Redis, HTTP)
//! and in-memory fakes are interchangeable:
//!
//! - [`MembershipStore`]: which vehicles are parked right now
//! - [`RecordStore`]: entry/exit timestamps per vehicle
//! - [`SummarySink`]: where completed stays are reported
//!
//! All mutations are single-member or single-field operations. Atomicity is
//! whatever the backing store provides; callers take no locks.

use crate::event::{RecordField, VehiclePlate, VehicleRecord};
use crate::summary::ParkingSummary;
use chrono::{DateTime, Utc};
use std::future::Future;
use thiserror::Error;

/// Errors from the membership and record stores.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Could not reach the store.
    #[error("store connection error: {0}")]
    Connection(String),

    /// The store rejected or failed a command.
    #[error("store command failed: {0}")]
    Command(String),

    /// A stored value could not be interpreted.
    #[error("corrupt value {value:?} in {key}.{field}: {reason}")]
    Corrupt {
        /// Record key (vehicle plate)
        key: String,
        /// Field name
        field: String,
        /// Raw stored value
        value: String,
        /// Why it was rejected
        reason: String,
    },
}

/// Errors from submitting a summary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The collector answered with something other than `201 Created`.
    #[error("collector rejected summary with status {status}")]
    Rejected {
        /// HTTP status code received
        status: u16,
    },

    /// The request never got a response.
    #[error("collector unreachable: {0}")]
    Transport(String),

    /// The summary could not be encoded.
    #[error("failed to encode summary: {0}")]
    Encode(String),
}

/// Set of currently parked vehicles.
///
/// # Example
///
/// ```no_run
/// use parking_sim_core::stores::MembershipStore;
/// use parking_sim_core::VehiclePlate;
///
/// # async fn example(set: impl MembershipStore) -> Result<(), parking_sim_core::StoreError> {
/// let plate = VehiclePlate::new("plate-7");
/// set.add(&plate).await?;
/// assert!(set.contains(&plate).await?);
///
/// if let Some(parked) = set.random_member().await? {
///     set.remove(&parked).await?;
/// }
/// # Ok(())
/// # }
/// ```
pub trait MembershipStore: Send + Sync {
    /// Mark a vehicle as parked. Adding an existing member is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be reached.
    fn add(&self, plate: &VehiclePlate) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Mark a vehicle as gone. Removing a non-member is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be reached.
    fn remove(&self, plate: &VehiclePlate) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Whether a vehicle is currently parked.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be reached.
    fn contains(
        &self,
        plate: &VehiclePlate,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Pick a parked vehicle uniformly at random, without removing it.
    ///
    /// Returns `None` when nothing is parked.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be reached.
    fn random_member(&self) -> impl Future<Output = Result<Option<VehiclePlate>, StoreError>> + Send;

    /// Number of parked vehicles.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be reached.
    fn count(&self) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Whether nothing is parked.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be reached.
    fn is_empty(&self) -> impl Future<Output = Result<bool, StoreError>> + Send {
        async move { Ok(self.count().await? == 0) }
    }
}

/// Per-vehicle timestamp hash.
///
/// Records are never deleted; each field is overwritten by the latest event.
pub trait RecordStore: Send + Sync {
    /// Overwrite one timestamp field of a vehicle's record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    fn write_timestamp(
        &self,
        plate: &VehiclePlate,
        field: RecordField,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Read one timestamp field. `None` if the field was never written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if the stored value is not a valid
    /// timestamp, or another [`StoreError`] if the read fails.
    fn read_timestamp(
        &self,
        plate: &VehiclePlate,
        field: RecordField,
    ) -> impl Future<Output = Result<Option<DateTime<Utc>>, StoreError>> + Send;

    /// Read the whole record. Missing fields are `None`.
    ///
    /// # Errors
    ///
    /// Same as [`RecordStore::read_timestamp`].
    fn read_record(
        &self,
        plate: &VehiclePlate,
    ) -> impl Future<Output = Result<VehicleRecord, StoreError>> + Send;
}

/// Destination for completed stays.
pub trait SummarySink: Send + Sync {
    /// Deliver one summary. Only an explicit "created" acknowledgement
    /// counts as success.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] on any non-created response or transport error.
    fn submit(
        &self,
        summary: &ParkingSummary,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;
}
