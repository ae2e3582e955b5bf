//! Parking summaries sent to the collector when a vehicle exits.

use crate::duration::ParkingDuration;
use crate::event::VehiclePlate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a summary cannot be produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SummaryError {
    /// The exit time precedes the recorded entry time.
    #[error("exit {exit} is before entry {entry}")]
    ExitBeforeEntry {
        /// Recorded entry time
        entry: DateTime<Utc>,
        /// Exit time from the event
        exit: DateTime<Utc>,
    },

    /// The stay is too long to express in nanoseconds.
    #[error("duration between {entry} and {exit} is out of range")]
    DurationOverflow {
        /// Recorded entry time
        entry: DateTime<Utc>,
        /// Exit time from the event
        exit: DateTime<Utc>,
    },
}

/// What the collector receives for a completed stay.
///
/// Field order matches the collector's JSON contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParkingSummary {
    /// Vehicle that left.
    pub vehicle_plate: VehiclePlate,
    /// When it left.
    pub exit_date_time: DateTime<Utc>,
    /// When it arrived.
    pub entry_date_time: DateTime<Utc>,
    /// `exit - entry` as an elapsed-time string, e.g. `"1h30m0s"`.
    pub duration: String,
}

impl ParkingSummary {
    /// Compute the summary for one stay.
    ///
    /// # Errors
    ///
    /// - [`SummaryError::ExitBeforeEntry`] if `exit < entry`. Negative stays
    ///   are never clamped.
    /// - [`SummaryError::DurationOverflow`] if the difference does not fit.
    pub fn generate(
        vehicle_plate: VehiclePlate,
        entry: DateTime<Utc>,
        exit: DateTime<Utc>,
    ) -> Result<Self, SummaryError> {
        if exit < entry {
            return Err(SummaryError::ExitBeforeEntry { entry, exit });
        }
        let duration = ParkingDuration::from_time_delta(exit - entry)
            .ok_or(SummaryError::DurationOverflow { entry, exit })?;

        Ok(Self {
            vehicle_plate,
            exit_date_time: exit,
            entry_date_time: entry,
            duration: duration.to_string(),
        })
    }

    /// Parse [`ParkingSummary::duration`] back into a value.
    ///
    /// # Errors
    ///
    /// Returns the parse error if the string was not produced by
    /// [`ParkingSummary::generate`].
    pub fn parsed_duration(&self) -> Result<ParkingDuration, crate::DurationParseError> {
        self.duration.parse()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use proptest::prelude::*;

    fn at(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn ninety_minute_stay() {
        let summary = ParkingSummary::generate(
            VehiclePlate::new("ABC123"),
            at("2024-09-11T10:00:00Z"),
            at("2024-09-11T11:30:00Z"),
        )
        .unwrap();

        assert_eq!(summary.duration, "1h30m0s");
        assert_eq!(summary.vehicle_plate.as_str(), "ABC123");
    }

    #[test]
    fn zero_length_stay_is_allowed() {
        let t = at("2024-09-11T10:00:00Z");
        let summary = ParkingSummary::generate(VehiclePlate::new("p"), t, t).unwrap();
        assert_eq!(summary.duration, "0s");
    }

    #[test]
    fn exit_before_entry_is_surfaced() {
        let entry = at("2024-09-11T11:30:00Z");
        let exit = at("2024-09-11T10:00:00Z");
        let err = ParkingSummary::generate(VehiclePlate::new("p"), entry, exit).unwrap_err();
        assert_eq!(err, SummaryError::ExitBeforeEntry { entry, exit });
    }

    #[test]
    fn json_field_order_matches_collector() {
        let summary = ParkingSummary::generate(
            VehiclePlate::new("ABC123"),
            at("2024-09-11T10:00:00Z"),
            at("2024-09-11T11:30:00Z"),
        )
        .unwrap();

        let json = serde_json::to_string(&summary).unwrap();
        assert_eq!(
            json,
            r#"{"vehicle_plate":"ABC123","exit_date_time":"2024-09-11T11:30:00Z","entry_date_time":"2024-09-11T10:00:00Z","duration":"1h30m0s"}"#
        );
    }

    proptest! {
        #[test]
        fn duration_string_matches_difference(
            entry_secs in 0i64..4_000_000_000,
            entry_nanos in 0u32..1_000_000_000,
            stay_nanos in 0i64..(400 * 24 * 3_600 * 1_000_000_000),
        ) {
            let entry = DateTime::from_timestamp(entry_secs, entry_nanos).unwrap();
            let exit = entry + TimeDelta::nanoseconds(stay_nanos);

            let summary = ParkingSummary::generate(VehiclePlate::new("p"), entry, exit).unwrap();
            let parsed = summary.parsed_duration().unwrap();
            prop_assert_eq!(parsed.to_time_delta(), exit - entry);
        }

        #[test]
        fn negative_stays_never_produce_a_summary(
            entry_secs in 0i64..4_000_000_000,
            back_nanos in 1i64..(400 * 24 * 3_600 * 1_000_000_000),
        ) {
            let entry = DateTime::from_timestamp(entry_secs, 0).unwrap();
            let exit = entry - TimeDelta::nanoseconds(back_nanos);
            let is_exit_before_entry = matches!(
                ParkingSummary::generate(VehiclePlate::new("p"), entry, exit),
                Err(SummaryError::ExitBeforeEntry { .. })
            );
            prop_assert!(is_exit_before_entry);
        }
    }
}
