//! Redis stores for the parking simulator.
//!
//! - [`RedisMembershipStore`]: the `parked_vehicles` set
//! - [`RedisRecordStore`]: one `vehicle:<plate>` hash per vehicle holding
//!   `entry_date_time` and `exit_date_time` as RFC3339 strings
//!
//! Both wrap a [`ConnectionManager`], which reconnects on its own and is
//! cheap to clone, so one connection from [`RedisSettings::connect`] is
//! shared by every store in the process.
//!
//! # Example
//!
//! ```no_run
//! use parking_sim_redis::{RedisMembershipStore, RedisRecordStore, RedisSettings};
//!
//! # async fn example() -> Result<(), parking_sim_core::StoreError> {
//! let settings = RedisSettings::new("localhost:6379");
//! let conn = settings.connect().await?;
//!
//! let parked = RedisMembershipStore::new(conn.clone());
//! let records = RedisRecordStore::new(conn);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod connection;
mod membership;
mod records;

pub use connection::RedisSettings;
pub use membership::{PARKED_VEHICLES_KEY, RedisMembershipStore};
pub use records::{RECORD_KEY_PREFIX, RedisRecordStore, record_key};

pub use redis::aio::ConnectionManager;

use parking_sim_core::StoreError;

/// Classify a client error as a connectivity or a command failure.
pub(crate) fn store_error(err: &redis::RedisError) -> StoreError {
    if err.is_io_error() || err.is_connection_refusal() || err.is_timeout() {
        StoreError::Connection(err.to_string())
    } else {
        StoreError::Command(err.to_string())
    }
}
