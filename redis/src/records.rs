//! Per-vehicle timestamp hashes.

use crate::store_error;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_sim_core::{RecordField, RecordStore, StoreError, VehiclePlate, VehicleRecord};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::collections::HashMap;

/// Prefix of every record hash key.
pub const RECORD_KEY_PREFIX: &str = "vehicle:";

/// Record store backed by one Redis hash per plate, keyed `vehicle:<plate>`.
///
/// The prefix keeps plates out of the keyspace used by the membership set,
/// so a plate spelled like `parked_vehicles` cannot collide with it.
///
/// Timestamps are written as RFC3339 with as many fractional digits as
/// needed, so nanosecond precision survives a write/read cycle.
#[derive(Clone)]
pub struct RedisRecordStore {
    conn_manager: ConnectionManager,
}

impl RedisRecordStore {
    /// Wrap a managed connection.
    #[must_use]
    pub const fn new(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }
}

/// Redis key of the hash holding `plate`'s timestamps.
#[must_use]
pub fn record_key(plate: &VehiclePlate) -> String {
    format!("{RECORD_KEY_PREFIX}{plate}")
}

fn encode(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn decode(key: &str, field: RecordField, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            field: field.to_string(),
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

impl RecordStore for RedisRecordStore {
    async fn write_timestamp(
        &self,
        plate: &VehiclePlate,
        field: RecordField,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn_manager.clone();
        let value = encode(at);
        tracing::debug!(vehicle_plate = %plate, field = %field, value = %value, "HSET");

        let _: u64 = conn
            .hset(record_key(plate), field.as_str(), value)
            .await
            .map_err(|e| store_error(&e))?;
        Ok(())
    }

    async fn read_timestamp(
        &self,
        plate: &VehiclePlate,
        field: RecordField,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let mut conn = self.conn_manager.clone();
        let key = record_key(plate);
        let raw: Option<String> = conn
            .hget(&key, field.as_str())
            .await
            .map_err(|e| store_error(&e))?;

        raw.map(|raw| decode(&key, field, &raw)).transpose()
    }

    async fn read_record(&self, plate: &VehiclePlate) -> Result<VehicleRecord, StoreError> {
        let mut conn = self.conn_manager.clone();
        let key = record_key(plate);
        let fields: HashMap<String, String> = conn
            .hgetall(&key)
            .await
            .map_err(|e| store_error(&e))?;

        let mut record = VehicleRecord::default();
        for field in [RecordField::EntryDateTime, RecordField::ExitDateTime] {
            if let Some(raw) = fields.get(field.as_str()) {
                record.set(field, decode(&key, field, raw)?);
            }
        }
        Ok(record)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn record_keys_are_prefixed() {
        assert_eq!(record_key(&VehiclePlate::new("plate-42")), "vehicle:plate-42");
        assert_ne!(
            record_key(&VehiclePlate::new(crate::PARKED_VEHICLES_KEY)),
            crate::PARKED_VEHICLES_KEY
        );
    }

    #[test]
    fn timestamps_keep_nanoseconds() {
        let at = Utc.timestamp_opt(1_726_048_800, 123_456_789).unwrap();
        let raw = encode(at);
        assert_eq!(raw, "2024-09-11T10:00:00.123456789Z");
        assert_eq!(decode("vehicle:p", RecordField::EntryDateTime, &raw).unwrap(), at);
    }

    #[test]
    fn whole_seconds_have_no_fraction() {
        let at = Utc.timestamp_opt(1_726_048_800, 0).unwrap();
        assert_eq!(encode(at), "2024-09-11T10:00:00Z");
    }

    #[test]
    fn offsets_are_normalised_to_utc() {
        let at = decode(
            "vehicle:p",
            RecordField::ExitDateTime,
            "2024-09-11T12:30:00+02:00",
        )
        .unwrap();
        assert_eq!(encode(at), "2024-09-11T10:30:00Z");
    }

    #[test]
    fn garbage_is_reported_as_corrupt() {
        let err = decode("vehicle:ABC123", RecordField::EntryDateTime, "yesterday")
            .unwrap_err();
        let StoreError::Corrupt { key, field, value, .. } = err else {
            unreachable!("decode only produces corrupt-value errors");
        };
        assert_eq!(key, "vehicle:ABC123");
        assert_eq!(field, "entry_date_time");
        assert_eq!(value, "yesterday");
    }
}
