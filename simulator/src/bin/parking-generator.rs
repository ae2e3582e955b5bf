//! Parking event generator.
//!
//! Publishes entry or exit events (per `GENERATOR_MODE`) at random
//! intervals until Ctrl-C or SIGTERM.

use anyhow::Context;
use parking_sim_core::environment::SystemClock;
use parking_sim_redis::RedisMembershipStore;
use parking_sim_runtime::generator::{Generator, GeneratorMode, GeneratorSettings};
use parking_simulator::bootstrap::{connect_event_bus, connect_redis};
use parking_simulator::{Config, shutdown, telemetry};
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    telemetry::init_tracing(&config.server.log_level).context("Failed to initialise logging")?;

    tracing::info!("Starting parking generator");
    config.validate().context("Invalid configuration")?;
    config.log();

    let mode = config.generator.mode()?;
    let _metrics = telemetry::start_metrics(config.server.metrics_addr()?)
        .context("Failed to start metrics server")?;

    let policy = config.bootstrap.retry_policy();
    let bus = connect_event_bus(&config.redpanda, &policy).await?;
    let membership = RedisMembershipStore::new(connect_redis(&config.redis, &policy).await?);

    let topic = match mode {
        GeneratorMode::Entry => config.redpanda.entry_topic.clone(),
        GeneratorMode::Exit => config.redpanda.exit_topic.clone(),
    };
    let mut settings = GeneratorSettings::new(mode, topic);
    settings.exit_bias = config.generator.exit_bias;
    settings.max_sleep_secs = config.generator.max_sleep_secs;

    let mut generator = Generator::new(Arc::new(bus), membership, SystemClock, settings);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    shutdown::spawn_signal_handler(shutdown_tx);

    generator
        .run(shutdown_rx)
        .await
        .context("Generator stopped on a fatal error")?;

    tracing::info!("Parking generator stopped");
    Ok(())
}
