//! Synthetic arrivals and departures.
//!
//! A generator runs in one of two modes for its whole life:
//!
//! - **entry**: publish an [`EntryEvent`] for a random plate that is not
//!   already parked, then mark the plate as parked.
//! - **exit**: usually pick a parked plate, publish an [`ExitEvent`] for it
//!   and mark it gone; otherwise publish an exit for a plate that never
//!   entered.
//!
//! The membership set is only touched after a publish succeeds, so a vehicle
//! whose exit could not be published stays parked.

use crate::metrics::GeneratorMetrics;
use parking_sim_core::environment::Clock;
use parking_sim_core::event_bus::{EventBus, EventBusError, Message};
use parking_sim_core::stores::{MembershipStore, StoreError};
use parking_sim_core::{EntryEvent, ExitEvent, ParkingEvent, VehiclePlate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// Probability that an exit iteration targets a parked vehicle.
pub const DEFAULT_EXIT_BIAS: f64 = 0.8;

/// Plate draws per entry iteration before giving up on finding one that is
/// not already parked.
pub const MAX_ENTRY_DRAWS: usize = 32;

/// Fatal generator failures.
#[derive(Error, Debug)]
pub enum GeneratorError {
    /// Event could not be published.
    #[error("failed to publish event: {0}")]
    Publish(#[from] EventBusError),

    /// Membership set could not be read or updated.
    #[error("membership set operation failed: {0}")]
    Membership(#[from] StoreError),

    /// Event could not be encoded.
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Which half of the traffic a generator produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorMode {
    /// Arrivals.
    Entry,
    /// Departures.
    Exit,
}

impl GeneratorMode {
    /// Configuration value for this mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
        }
    }
}

impl fmt::Display for GeneratorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unknown generator mode string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown generator mode {0:?} (expected \"entry\" or \"exit\")")]
pub struct UnknownModeError(pub String);

impl FromStr for GeneratorMode {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entry" => Ok(Self::Entry),
            "exit" => Ok(Self::Exit),
            _ => Err(UnknownModeError(s.to_string())),
        }
    }
}

/// Generator settings.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    /// Mode for this process.
    pub mode: GeneratorMode,
    /// Topic events are published to.
    pub topic: String,
    /// Probability in `[0, 1]` that an exit targets a parked vehicle.
    pub exit_bias: f64,
    /// Pauses are a whole number of seconds in `[0, max_sleep_secs)`.
    pub max_sleep_secs: u64,
}

impl GeneratorSettings {
    /// Settings with the default bias and pause range.
    #[must_use]
    pub fn new(mode: GeneratorMode, topic: impl Into<String>) -> Self {
        Self {
            mode,
            topic: topic.into(),
            exit_bias: DEFAULT_EXIT_BIAS,
            max_sleep_secs: 5,
        }
    }
}

/// Result of one generator iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// An entry was published and the plate marked as parked.
    Entered(VehiclePlate),
    /// A parked vehicle's exit was published and the plate removed.
    Exited(VehiclePlate),
    /// An exit was published for a plate that never entered.
    UnregisteredExit(VehiclePlate),
    /// Nothing was published this iteration.
    ///
    /// Happens when no unparked plate turned up within [`MAX_ENTRY_DRAWS`]
    /// draws, or when no parked vehicle could be drawn for an exit.
    Skipped,
}

/// Event generator.
pub struct Generator<M, C> {
    bus: Arc<dyn EventBus>,
    membership: M,
    clock: C,
    rng: StdRng,
    settings: GeneratorSettings,
}

impl<M: MembershipStore, C: Clock> Generator<M, C> {
    /// Create a generator seeded from OS entropy.
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>, membership: M, clock: C, settings: GeneratorSettings) -> Self {
        Self::with_rng(bus, membership, clock, settings, StdRng::from_entropy())
    }

    /// Create a generator with a caller-supplied random source.
    #[must_use]
    pub fn with_rng(
        bus: Arc<dyn EventBus>,
        membership: M,
        clock: C,
        settings: GeneratorSettings,
        rng: StdRng,
    ) -> Self {
        Self {
            bus,
            membership,
            clock,
            rng,
            settings,
        }
    }

    /// Settings in use.
    #[must_use]
    pub const fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// Run one iteration without pausing.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError`] if publishing or a required membership
    /// operation fails. These are fatal to the generator.
    pub async fn step(&mut self) -> Result<StepOutcome, GeneratorError> {
        match self.settings.mode {
            GeneratorMode::Entry => self.step_entry().await,
            GeneratorMode::Exit => self.step_exit().await,
        }
    }

    async fn step_entry(&mut self) -> Result<StepOutcome, GeneratorError> {
        let Some(plate) = self.draw_unparked_plate().await? else {
            tracing::debug!(
                draws = MAX_ENTRY_DRAWS,
                "Every drawn plate is already parked, skipping"
            );
            return Ok(StepOutcome::Skipped);
        };

        let event = EntryEvent::new(plate, self.clock.now());
        self.publish(&event).await?;
        self.membership.add(&event.vehicle_plate).await?;
        tracing::debug!(vehicle_plate = %event.vehicle_plate, "Vehicle marked as parked");
        Ok(StepOutcome::Entered(event.vehicle_plate))
    }

    /// Draw plates until one is not in the membership set.
    async fn draw_unparked_plate(&mut self) -> Result<Option<VehiclePlate>, GeneratorError> {
        for _ in 0..MAX_ENTRY_DRAWS {
            let plate = VehiclePlate::random(&mut self.rng);
            if !self.membership.contains(&plate).await? {
                return Ok(Some(plate));
            }
        }
        Ok(None)
    }

    async fn step_exit(&mut self) -> Result<StepOutcome, GeneratorError> {
        let has_parked = !self.membership.is_empty().await?;
        let event = ExitEvent::new(VehiclePlate::random(&mut self.rng), self.clock.now());
        let draw: f64 = self.rng.r#gen();

        if draw < self.settings.exit_bias && has_parked {
            GeneratorMetrics::record_exit_attempt(true);
            let parked = match self.membership.random_member().await {
                Ok(Some(plate)) => plate,
                Ok(None) => {
                    tracing::debug!("Membership set emptied before a vehicle could be drawn");
                    return Ok(StepOutcome::Skipped);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Could not draw a parked vehicle, skipping");
                    return Ok(StepOutcome::Skipped);
                }
            };

            let event = event.for_vehicle(parked);
            self.publish(&event).await?;
            self.membership.remove(&event.vehicle_plate).await?;
            tracing::debug!(vehicle_plate = %event.vehicle_plate, "Vehicle removed from parked set");
            Ok(StepOutcome::Exited(event.vehicle_plate))
        } else {
            GeneratorMetrics::record_exit_attempt(false);
            self.publish(&event).await?;
            Ok(StepOutcome::UnregisteredExit(event.vehicle_plate))
        }
    }

    async fn publish<E: ParkingEvent>(&self, event: &E) -> Result<(), GeneratorError> {
        let message = Message::new(event.vehicle_plate().as_str(), event.to_json()?);
        self.bus.publish(&self.settings.topic, &message).await?;
        GeneratorMetrics::record_published(E::EVENT_TYPE);
        tracing::info!(
            event_type = %E::EVENT_TYPE,
            vehicle_plate = %event.vehicle_plate(),
            event_id = event.id(),
            topic = %self.settings.topic,
            "Published event"
        );
        Ok(())
    }

    fn random_pause(&mut self) -> Duration {
        if self.settings.max_sleep_secs == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs(self.rng.gen_range(0..self.settings.max_sleep_secs))
    }

    /// Loop until `shutdown` becomes `true`.
    ///
    /// Entry mode pauses after each iteration, exit mode before it.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`GeneratorError`].
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), GeneratorError> {
        tracing::info!(
            mode = %self.settings.mode,
            topic = %self.settings.topic,
            exit_bias = self.settings.exit_bias,
            "Starting generator"
        );

        let pause_first = self.settings.mode == GeneratorMode::Exit;

        while !*shutdown.borrow() {
            if pause_first && !pause(self.random_pause(), &mut shutdown).await {
                break;
            }

            self.step().await?;

            if !pause_first && !pause(self.random_pause(), &mut shutdown).await {
                break;
            }
        }

        tracing::info!(mode = %self.settings.mode, "Generator stopped");
        Ok(())
    }
}

/// Sleep for `duration`; returns `false` if shutdown was signalled first.
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => !*shutdown.borrow(),
        changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_parse_case_insensitively() {
        assert_eq!("entry".parse::<GeneratorMode>(), Ok(GeneratorMode::Entry));
        assert_eq!(" EXIT ".parse::<GeneratorMode>(), Ok(GeneratorMode::Exit));
        assert_eq!(
            "both".parse::<GeneratorMode>(),
            Err(UnknownModeError("both".to_string()))
        );
    }

    #[test]
    fn default_settings() {
        let settings = GeneratorSettings::new(GeneratorMode::Exit, "exit_events_queue");
        assert!((settings.exit_bias - 0.8).abs() < f64::EPSILON);
        assert_eq!(settings.max_sleep_secs, 5);
    }
}
