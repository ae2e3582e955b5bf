//! In-memory membership set, record store and summary sink.
//!
//! Each fake can be told to fail so that error paths can be exercised
//! without a Redis server or an HTTP collector.

use chrono::{DateTime, Utc};
use parking_sim_core::stores::{
    MembershipStore, RecordStore, SinkError, StoreError, SummarySink,
};
use parking_sim_core::summary::ParkingSummary;
use parking_sim_core::{RecordField, VehiclePlate, VehicleRecord};
use rand::seq::IteratorRandom;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};

fn poisoned() -> StoreError {
    StoreError::Connection("Mutex lock failed".to_string())
}

/// Membership set operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MembershipOp {
    /// `add`
    Add,
    /// `remove`
    Remove,
    /// `contains`
    Contains,
    /// `random_member`
    RandomMember,
    /// `count`
    Count,
}

#[derive(Debug, Default)]
struct MembershipState {
    members: BTreeSet<VehiclePlate>,
    failing: HashSet<MembershipOp>,
}

/// Mock membership set.
///
/// # Example
///
/// ```
/// use parking_sim_testing::MockMembershipStore;
/// use parking_sim_core::stores::MembershipStore;
/// use parking_sim_core::VehiclePlate;
///
/// # tokio_test::block_on(async {
/// let set = MockMembershipStore::new();
/// set.add(&VehiclePlate::new("plate-1")).await.unwrap();
/// assert_eq!(set.count().await.unwrap(), 1);
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockMembershipStore {
    state: Arc<Mutex<MembershipState>>,
}

impl MockMembershipStore {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set with the given members.
    #[must_use]
    pub fn with_members<I, P>(members: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<VehiclePlate>,
    {
        let store = Self::new();
        if let Ok(mut state) = store.state.lock() {
            state.members.extend(members.into_iter().map(Into::into));
        }
        store
    }

    /// Make `op` fail (or succeed again) from now on.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn set_failing(&self, op: MembershipOp, failing: bool) -> Result<(), StoreError> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        if failing {
            state.failing.insert(op);
        } else {
            state.failing.remove(&op);
        }
        Ok(())
    }

    /// Current members, sorted.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn members(&self) -> Result<Vec<VehiclePlate>, StoreError> {
        Ok(self
            .state
            .lock()
            .map_err(|_| poisoned())?
            .members
            .iter()
            .cloned()
            .collect())
    }

    fn with_state<T>(
        &self,
        op: MembershipOp,
        f: impl FnOnce(&mut MembershipState) -> T,
    ) -> Result<T, StoreError> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        if state.failing.contains(&op) {
            return Err(StoreError::Command(format!("injected {op:?} failure")));
        }
        Ok(f(&mut state))
    }
}

impl MembershipStore for MockMembershipStore {
    fn add(&self, plate: &VehiclePlate) -> impl Future<Output = Result<(), StoreError>> + Send {
        let result = self.with_state(MembershipOp::Add, |state| {
            state.members.insert(plate.clone());
        });
        async move { result }
    }

    fn remove(&self, plate: &VehiclePlate) -> impl Future<Output = Result<(), StoreError>> + Send {
        let result = self.with_state(MembershipOp::Remove, |state| {
            state.members.remove(plate);
        });
        async move { result }
    }

    fn contains(
        &self,
        plate: &VehiclePlate,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send {
        let result = self.with_state(MembershipOp::Contains, |state| state.members.contains(plate));
        async move { result }
    }

    fn random_member(&self) -> impl Future<Output = Result<Option<VehiclePlate>, StoreError>> + Send {
        let result = self.with_state(MembershipOp::RandomMember, |state| {
            state.members.iter().choose(&mut rand::thread_rng()).cloned()
        });
        async move { result }
    }

    fn count(&self) -> impl Future<Output = Result<u64, StoreError>> + Send {
        let result = self.with_state(MembershipOp::Count, |state| state.members.len() as u64);
        async move { result }
    }
}

#[derive(Debug, Default)]
struct RecordState {
    records: HashMap<VehiclePlate, VehicleRecord>,
    writes: usize,
    fail_writes: bool,
    fail_reads: bool,
}

/// Mock record store.
#[derive(Debug, Clone, Default)]
pub struct MockRecordStore {
    state: Arc<Mutex<RecordState>>,
}

impl MockRecordStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a timestamp without counting it as a write.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn seed(
        &self,
        plate: &VehiclePlate,
        field: RecordField,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        state.records.entry(plate.clone()).or_default().set(field, at);
        Ok(())
    }

    /// Make every write fail.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn fail_writes(&self, failing: bool) -> Result<(), StoreError> {
        self.state.lock().map_err(|_| poisoned())?.fail_writes = failing;
        Ok(())
    }

    /// Make every read fail.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn fail_reads(&self, failing: bool) -> Result<(), StoreError> {
        self.state.lock().map_err(|_| poisoned())?.fail_reads = failing;
        Ok(())
    }

    /// Snapshot of one record.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn record(&self, plate: &VehiclePlate) -> Result<Option<VehicleRecord>, StoreError> {
        Ok(self
            .state
            .lock()
            .map_err(|_| poisoned())?
            .records
            .get(plate)
            .copied())
    }

    /// Number of vehicles with a record.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn record_count(&self) -> Result<usize, StoreError> {
        Ok(self.state.lock().map_err(|_| poisoned())?.records.len())
    }

    /// Number of successful `write_timestamp` calls.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn write_count(&self) -> Result<usize, StoreError> {
        Ok(self.state.lock().map_err(|_| poisoned())?.writes)
    }

    fn read_field(
        &self,
        plate: &VehiclePlate,
        field: RecordField,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let state = self.state.lock().map_err(|_| poisoned())?;
        if state.fail_reads {
            return Err(StoreError::Command("injected read failure".to_string()));
        }
        Ok(state.records.get(plate).and_then(|record| record.get(field)))
    }
}

impl RecordStore for MockRecordStore {
    fn write_timestamp(
        &self,
        plate: &VehiclePlate,
        field: RecordField,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        let state = Arc::clone(&self.state);
        let plate = plate.clone();

        async move {
            let mut state = state.lock().map_err(|_| poisoned())?;
            if state.fail_writes {
                return Err(StoreError::Command("injected write failure".to_string()));
            }
            state.records.entry(plate).or_default().set(field, at);
            state.writes += 1;
            Ok(())
        }
    }

    fn read_timestamp(
        &self,
        plate: &VehiclePlate,
        field: RecordField,
    ) -> impl Future<Output = Result<Option<DateTime<Utc>>, StoreError>> + Send {
        let result = self.read_field(plate, field);
        async move { result }
    }

    fn read_record(
        &self,
        plate: &VehiclePlate,
    ) -> impl Future<Output = Result<VehicleRecord, StoreError>> + Send {
        let result = self
            .read_field(plate, RecordField::EntryDateTime)
            .and_then(|entry| {
                Ok(VehicleRecord {
                    entry_date_time: entry,
                    exit_date_time: self.read_field(plate, RecordField::ExitDateTime)?,
                })
            });
        async move { result }
    }
}

#[derive(Debug, Default)]
struct SinkState {
    accepted: Vec<ParkingSummary>,
    attempts: usize,
    failure: Option<SinkError>,
}

/// Mock summary collector that keeps every accepted summary.
#[derive(Debug, Clone, Default)]
pub struct MockSummarySink {
    state: Arc<Mutex<SinkState>>,
}

impl MockSummarySink {
    /// Create a sink that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every submission with `error`, or accept again with `None`.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn fail_with(&self, error: Option<SinkError>) -> Result<(), SinkError> {
        self.state.lock().map_err(|_| sink_poisoned())?.failure = error;
        Ok(())
    }

    /// Summaries accepted so far.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn summaries(&self) -> Result<Vec<ParkingSummary>, SinkError> {
        Ok(self.state.lock().map_err(|_| sink_poisoned())?.accepted.clone())
    }

    /// Submissions attempted, accepted or not.
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn attempts(&self) -> Result<usize, SinkError> {
        Ok(self.state.lock().map_err(|_| sink_poisoned())?.attempts)
    }
}

fn sink_poisoned() -> SinkError {
    SinkError::Transport("Mutex lock failed".to_string())
}

impl SummarySink for MockSummarySink {
    fn submit(&self, summary: &ParkingSummary) -> impl Future<Output = Result<(), SinkError>> + Send {
        let state = Arc::clone(&self.state);
        let summary = summary.clone();

        async move {
            let mut state = state.lock().map_err(|_| sink_poisoned())?;
            state.attempts += 1;
            if let Some(error) = state.failure.clone() {
                return Err(error);
            }
            state.accepted.push(summary);
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn membership_roundtrip() {
        let set = MockMembershipStore::new();
        let plate = VehiclePlate::new("plate-1");

        assert!(set.is_empty().await.unwrap());
        assert_eq!(set.random_member().await.unwrap(), None);

        set.add(&plate).await.unwrap();
        set.add(&plate).await.unwrap();
        assert_eq!(set.count().await.unwrap(), 1);
        assert!(set.contains(&plate).await.unwrap());
        assert_eq!(set.random_member().await.unwrap(), Some(plate.clone()));

        set.remove(&plate).await.unwrap();
        set.remove(&plate).await.unwrap();
        assert!(set.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn injected_membership_failure() {
        let set = MockMembershipStore::with_members(["plate-1"]);
        set.set_failing(MembershipOp::RandomMember, true).unwrap();
        assert!(set.random_member().await.is_err());
        assert_eq!(set.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn record_fields_overwrite_independently() {
        let store = MockRecordStore::new();
        let plate = VehiclePlate::new("plate-1");
        let t1 = DateTime::from_timestamp(1_000, 0).unwrap();
        let t2 = DateTime::from_timestamp(2_000, 0).unwrap();

        store.write_timestamp(&plate, RecordField::EntryDateTime, t1).await.unwrap();
        store.write_timestamp(&plate, RecordField::EntryDateTime, t2).await.unwrap();

        let record = store.read_record(&plate).await.unwrap();
        assert_eq!(record.entry_date_time, Some(t2));
        assert_eq!(record.exit_date_time, None);
        assert_eq!(store.write_count().unwrap(), 2);
        assert_eq!(store.record_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn sink_keeps_only_accepted_summaries() {
        let sink = MockSummarySink::new();
        let t = DateTime::from_timestamp(1_000, 0).unwrap();
        let summary = ParkingSummary::generate(VehiclePlate::new("p"), t, t).unwrap();

        sink.fail_with(Some(SinkError::Rejected { status: 500 })).unwrap();
        assert_eq!(
            sink.submit(&summary).await,
            Err(SinkError::Rejected { status: 500 })
        );

        sink.fail_with(None).unwrap();
        sink.submit(&summary).await.unwrap();

        assert_eq!(sink.attempts().unwrap(), 2);
        assert_eq!(sink.summaries().unwrap(), vec![summary]);
    }
}
