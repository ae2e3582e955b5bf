//! Connection settings and bootstrap.

use crate::store_error;
use parking_sim_core::StoreError;
use redis::Client;
use redis::aio::ConnectionManager;
use std::fmt;

/// Where and how to reach Redis.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RedisSettings {
    /// `host:port`
    pub addr: String,
    /// Empty when the server has no auth.
    pub password: String,
    /// Logical database index.
    pub db: i64,
}

impl RedisSettings {
    /// Settings for an unauthenticated server, database 0.
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            password: String::new(),
            db: 0,
        }
    }

    /// Set the password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the database index.
    #[must_use]
    pub const fn db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    /// Client URL, `redis://[:password@]addr/db`.
    ///
    /// The password is percent-encoded so that `@`, `/` and `:` survive.
    #[must_use]
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}/{}", self.addr, self.db)
        } else {
            format!(
                "redis://:{}@{}/{}",
                urlencoding::encode(&self.password),
                self.addr,
                self.db
            )
        }
    }

    /// Open a managed connection and check it with `PING`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the URL is invalid or the
    /// server cannot be reached, or the error from `PING`.
    pub async fn connect(&self) -> Result<ConnectionManager, StoreError> {
        let client = Client::open(self.url())
            .map_err(|e| StoreError::Connection(format!("Failed to create Redis client: {e}")))?;

        let mut conn = ConnectionManager::new(client).await.map_err(|e| {
            StoreError::Connection(format!("Failed to create Redis connection manager: {e}"))
        })?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| store_error(&e))?;

        tracing::info!(addr = %self.addr, db = self.db, reply = %pong, "Connected to Redis");
        Ok(conn)
    }
}

impl fmt::Debug for RedisSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisSettings")
            .field("addr", &self.addr)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("db", &self.db)
            .finish()
    }
}
