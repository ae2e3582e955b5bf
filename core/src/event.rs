//! Entry and exit events and the per-vehicle record they build up.
//!
//! Events travel over the transport as JSON:
//!
//! ```json
//! {"id": "6f1c…", "vehicle_plate": "plate-42", "entry_date_time": "2024-09-11T10:00:00Z"}
//! {"id": "9a0d…", "vehicle_plate": "plate-42", "exit_date_time": "2024-09-11T11:30:00Z"}
//! ```
//!
//! Timestamps are RFC3339 in UTC. Sub-second precision is preserved down to
//! nanoseconds in both directions.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

/// Upper bound (exclusive) of the numeric suffix of generated plates.
///
/// Keeping the space small means identifiers get reused during a run, so the
/// record keeper regularly sees vehicles that come back after exiting.
pub const PLATE_RANGE: u32 = 1000;

/// Opaque vehicle identifier, used as the record key and set member.
///
/// Decoding rejects empty and whitespace-only plates, so a payload without a
/// usable identifier never reaches a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct VehiclePlate(String);

/// A plate string that cannot identify a vehicle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("vehicle plate must not be empty or whitespace: {0:?}")]
pub struct InvalidPlateError(pub String);

impl VehiclePlate {
    /// Wrap a plate string from a trusted source without validation.
    #[must_use]
    pub fn new(plate: impl Into<String>) -> Self {
        Self(plate.into())
    }

    /// Validate and wrap an untrusted plate string.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPlateError`] if the plate is empty or whitespace.
    pub fn parse(plate: impl Into<String>) -> Result<Self, InvalidPlateError> {
        let plate = plate.into();
        if plate.trim().is_empty() {
            return Err(InvalidPlateError(plate));
        }
        Ok(Self(plate))
    }

    /// Generate a random `plate-<n>` identifier.
    #[must_use]
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(format!("plate-{}", rng.gen_range(0..PLATE_RANGE)))
    }

    /// Borrow the plate as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VehiclePlate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for VehiclePlate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let plate = String::deserialize(deserializer)?;
        Self::parse(plate).map_err(de::Error::custom)
    }
}

impl From<&str> for VehiclePlate {
    fn from(plate: &str) -> Self {
        Self::new(plate)
    }
}

impl From<String> for VehiclePlate {
    fn from(plate: String) -> Self {
        Self(plate)
    }
}

/// The two kinds of lifecycle events.
///
/// The lowercase name is used as the `event_type` metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Vehicle entered the lot.
    Entry,
    /// Vehicle left the lot.
    Exit,
}

impl EventType {
    /// Metric/log label for this event type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
        }
    }

    /// The record field an event of this type writes.
    #[must_use]
    pub const fn record_field(self) -> RecordField {
        match self {
            Self::Entry => RecordField::EntryDateTime,
            Self::Exit => RecordField::ExitDateTime,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timestamp fields of a [`VehicleRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordField {
    /// `entry_date_time`
    EntryDateTime,
    /// `exit_date_time`
    ExitDateTime,
}

impl RecordField {
    /// Hash field name in the record store.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EntryDateTime => "entry_date_time",
            Self::ExitDateTime => "exit_date_time",
        }
    }
}

impl fmt::Display for RecordField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common behaviour of entry and exit events.
///
/// Implementors are plain JSON documents; [`ParkingEvent::to_json`] and
/// [`ParkingEvent::from_json`] are the only codec used on the transport.
pub trait ParkingEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Which lifecycle event this is.
    const EVENT_TYPE: EventType;

    /// Correlation id assigned at generation time.
    fn id(&self) -> &str;

    /// Vehicle the event is about.
    fn vehicle_plate(&self) -> &VehiclePlate;

    /// Entry or exit time, depending on the event type.
    fn timestamp(&self) -> DateTime<Utc>;

    /// Encode the event as a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if encoding fails.
    fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode an event from a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns the deserializer error for malformed JSON, missing fields or
    /// timestamps that are not RFC3339.
    fn from_json(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// A vehicle entered the lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryEvent {
    /// Correlation id.
    pub id: String,
    /// Vehicle that entered.
    pub vehicle_plate: VehiclePlate,
    /// When it entered (UTC).
    pub entry_date_time: DateTime<Utc>,
}

impl EntryEvent {
    /// Create an entry event with a fresh random id.
    #[must_use]
    pub fn new(vehicle_plate: VehiclePlate, entry_date_time: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            vehicle_plate,
            entry_date_time,
        }
    }
}

impl ParkingEvent for EntryEvent {
    const EVENT_TYPE: EventType = EventType::Entry;

    fn id(&self) -> &str {
        &self.id
    }

    fn vehicle_plate(&self) -> &VehiclePlate {
        &self.vehicle_plate
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.entry_date_time
    }
}

/// A vehicle left the lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitEvent {
    /// Correlation id.
    pub id: String,
    /// Vehicle that exited.
    pub vehicle_plate: VehiclePlate,
    /// When it exited (UTC).
    pub exit_date_time: DateTime<Utc>,
}

impl ExitEvent {
    /// Create an exit event with a fresh random id.
    #[must_use]
    pub fn new(vehicle_plate: VehiclePlate, exit_date_time: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            vehicle_plate,
            exit_date_time,
        }
    }

    /// Retarget an unpublished exit event at another vehicle.
    #[must_use]
    pub fn for_vehicle(mut self, vehicle_plate: VehiclePlate) -> Self {
        self.vehicle_plate = vehicle_plate;
        self
    }
}

impl ParkingEvent for ExitEvent {
    const EVENT_TYPE: EventType = EventType::Exit;

    fn id(&self) -> &str {
        &self.id
    }

    fn vehicle_plate(&self) -> &VehiclePlate {
        &self.vehicle_plate
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.exit_date_time
    }
}

/// Per-vehicle timestamps as held by the record store.
///
/// Both fields are filled in independently; either may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VehicleRecord {
    /// Last recorded entry time.
    pub entry_date_time: Option<DateTime<Utc>>,
    /// Last recorded exit time.
    pub exit_date_time: Option<DateTime<Utc>>,
}

impl VehicleRecord {
    /// Read one field.
    #[must_use]
    pub const fn get(&self, field: RecordField) -> Option<DateTime<Utc>> {
        match field {
            RecordField::EntryDateTime => self.entry_date_time,
            RecordField::ExitDateTime => self.exit_date_time,
        }
    }

    /// Overwrite one field.
    pub fn set(&mut self, field: RecordField, at: DateTime<Utc>) {
        match field {
            RecordField::EntryDateTime => self.entry_date_time = Some(at),
            RecordField::ExitDateTime => self.exit_date_time = Some(at),
        }
    }
}
