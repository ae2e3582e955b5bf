//! Parking record keeper.
//!
//! Consumes entry and exit events, records timestamps per vehicle and posts
//! a summary for every exit with a known entry.

use anyhow::Context;
use parking_sim_redis::RedisRecordStore;
use parking_sim_runtime::record_keeper::{RecordKeeper, RecordKeeperSettings};
use parking_simulator::bootstrap::{connect_event_bus, connect_redis};
use parking_simulator::{Config, HttpSummarySink, shutdown, telemetry};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    telemetry::init_tracing(&config.server.log_level).context("Failed to initialise logging")?;

    tracing::info!("Starting parking record keeper");
    config.validate().context("Invalid configuration")?;
    config.log();

    let _metrics = telemetry::start_metrics(config.server.metrics_addr()?)
        .context("Failed to start metrics server")?;

    let policy = config.bootstrap.retry_policy();
    let bus = connect_event_bus(&config.redpanda, &policy).await?;
    let records = RedisRecordStore::new(connect_redis(&config.redis, &policy).await?);
    let sink = HttpSummarySink::new(&config.collector.url, config.collector.timeout())
        .context("Failed to create summary collector client")?;

    let (keeper, shutdown_tx) = RecordKeeper::new(
        Arc::new(bus),
        records,
        sink,
        RecordKeeperSettings {
            entry_topic: config.redpanda.entry_topic.clone(),
            exit_topic: config.redpanda.exit_topic.clone(),
        },
    );
    shutdown::spawn_signal_handler(shutdown_tx);

    let report = keeper.run().await.context("Failed to subscribe to event topics")?;

    tracing::info!(
        entries_processed = report.entry.processed,
        entries_failed = report.entry.failed,
        exits_processed = report.exit.processed,
        exits_failed = report.exit.failed,
        "Parking record keeper stopped"
    );
    Ok(())
}
