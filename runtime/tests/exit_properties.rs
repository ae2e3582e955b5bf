//! Property tests for the entry then exit pipeline.

#![allow(clippy::unwrap_used)]

use chrono::{DateTime, TimeDelta, Utc};
use parking_sim_core::{EntryEvent, ExitEvent, ParkingEvent, ParkingDuration, VehiclePlate};
use parking_sim_runtime::processor::{EntryProcessor, ExitProcessor, FailureStage, MessageProcessor};
use parking_sim_testing::{MockRecordStore, MockSummarySink};
use proptest::prelude::*;

fn base() -> DateTime<Utc> {
    DateTime::from_timestamp(1_726_048_800, 0).unwrap()
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #[test]
    fn stay_duration_round_trips(
        entry_nanos in 0i64..86_400_000_000_000,
        offset_nanos in -86_400_000_000_000i64..86_400_000_000_000,
    ) {
        let entry_at = base() + TimeDelta::nanoseconds(entry_nanos);
        let exit_at = entry_at + TimeDelta::nanoseconds(offset_nanos);
        let plate = VehiclePlate::new("plate-1");

        let records = MockRecordStore::new();
        let sink = MockSummarySink::new();
        let entry = EntryEvent::new(plate.clone(), entry_at).to_json().unwrap();
        let exit = ExitEvent::new(plate.clone(), exit_at).to_json().unwrap();

        let result = block_on(async {
            EntryProcessor::new(records.clone()).process_message(&entry).await.unwrap();
            ExitProcessor::new(records.clone(), sink.clone()).process_message(&exit).await
        });

        // both timestamps are stored exactly either way
        let record = records.record(&plate).unwrap().unwrap();
        prop_assert_eq!(record.entry_date_time, Some(entry_at));
        prop_assert_eq!(record.exit_date_time, Some(exit_at));

        if offset_nanos >= 0 {
            prop_assert!(result.is_ok());
            let summaries = sink.summaries().unwrap();
            prop_assert_eq!(summaries.len(), 1);
            prop_assert_eq!(
                summaries[0].parsed_duration().unwrap(),
                ParkingDuration::from_nanos(offset_nanos)
            );
        } else {
            let err = result.unwrap_err();
            prop_assert_eq!(err.stage(), FailureStage::SummaryGeneration);
            prop_assert!(err.is_data_integrity());
            prop_assert_eq!(sink.attempts().unwrap(), 0);
        }
    }
}
