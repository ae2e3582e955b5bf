//! Parked-vehicle set.

use crate::store_error;
use parking_sim_core::{MembershipStore, StoreError, VehiclePlate};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// Name of the set holding parked plates.
pub const PARKED_VEHICLES_KEY: &str = "parked_vehicles";

/// Membership set backed by a Redis set (`SADD`, `SREM`, `SISMEMBER`,
/// `SRANDMEMBER`, `SCARD`).
#[derive(Clone)]
pub struct RedisMembershipStore {
    conn_manager: ConnectionManager,
    key: String,
}

impl RedisMembershipStore {
    /// Store using [`PARKED_VEHICLES_KEY`].
    #[must_use]
    pub fn new(conn_manager: ConnectionManager) -> Self {
        Self::with_key(conn_manager, PARKED_VEHICLES_KEY)
    }

    /// Store using a custom set name.
    #[must_use]
    pub fn with_key(conn_manager: ConnectionManager, key: impl Into<String>) -> Self {
        Self {
            conn_manager,
            key: key.into(),
        }
    }

    /// Name of the backing set.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl MembershipStore for RedisMembershipStore {
    async fn add(&self, plate: &VehiclePlate) -> Result<(), StoreError> {
        let mut conn = self.conn_manager.clone();
        let added: u64 = conn
            .sadd(&self.key, plate.as_str())
            .await
            .map_err(|e| store_error(&e))?;
        tracing::debug!(vehicle_plate = %plate, added, "SADD");
        Ok(())
    }

    async fn remove(&self, plate: &VehiclePlate) -> Result<(), StoreError> {
        let mut conn = self.conn_manager.clone();
        let removed: u64 = conn
            .srem(&self.key, plate.as_str())
            .await
            .map_err(|e| store_error(&e))?;
        tracing::debug!(vehicle_plate = %plate, removed, "SREM");
        Ok(())
    }

    async fn contains(&self, plate: &VehiclePlate) -> Result<bool, StoreError> {
        let mut conn = self.conn_manager.clone();
        conn.sismember(&self.key, plate.as_str())
            .await
            .map_err(|e| store_error(&e))
    }

    async fn random_member(&self) -> Result<Option<VehiclePlate>, StoreError> {
        let mut conn = self.conn_manager.clone();
        let member: Option<String> = conn
            .srandmember(&self.key)
            .await
            .map_err(|e| store_error(&e))?;
        Ok(member.map(VehiclePlate::new))
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let mut conn = self.conn_manager.clone();
        conn.scard(&self.key).await.map_err(|e| store_error(&e))
    }
}
