//! Connecting to Redpanda and Redis at startup.
//!
//! Both dependencies go through the same [`RetryPolicy`]; running out of
//! attempts is fatal for the process.

use crate::config::RedpandaConfig;
use parking_sim_core::EventBusError;
use parking_sim_redis::{ConnectionManager, RedisSettings};
use parking_sim_redpanda::RedpandaEventBus;
use parking_sim_runtime::retry::{BootstrapError, RetryPolicy, connect_with_retry};

/// Build the event bus and wait until a broker answers.
///
/// # Errors
///
/// Returns [`BootstrapError`] once every attempt has failed.
pub async fn connect_event_bus(
    config: &RedpandaConfig,
    policy: &RetryPolicy,
) -> Result<RedpandaEventBus, BootstrapError> {
    connect_with_retry("redpanda", policy, || async move {
        let bus = RedpandaEventBus::builder()
            .brokers(&config.brokers)
            .consumer_group(&config.consumer_group)
            .auto_offset_reset(&config.auto_offset_reset)
            .build()?;
        bus.ping().await?;
        Ok::<_, EventBusError>(bus)
    })
    .await
}

/// Open a Redis connection and wait until it answers `PING`.
///
/// # Errors
///
/// Returns [`BootstrapError`] once every attempt has failed.
pub async fn connect_redis(
    settings: &RedisSettings,
    policy: &RetryPolicy,
) -> Result<ConnectionManager, BootstrapError> {
    connect_with_retry("redis", policy, || settings.connect()).await
}
