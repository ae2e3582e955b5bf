//! Subscription loops feeding the entry and exit processors.
//!
//! The entry and exit topics are consumed independently. Within a topic each
//! message is processed to completion before the next one is taken; across
//! topics there is no ordering. Per-message failures are counted and logged
//! by the processors and never stop a loop.

use crate::processor::{EntryProcessor, ExitProcessor, MessageProcessor};
use futures::StreamExt;
use parking_sim_core::event_bus::{EventBus, EventBusError, EventStream};
use parking_sim_core::stores::{RecordStore, SummarySink};
use std::sync::Arc;
use tokio::sync::watch;

/// Topics the record keeper consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKeeperSettings {
    /// Topic carrying entry events.
    pub entry_topic: String,
    /// Topic carrying exit events.
    pub exit_topic: String,
}

/// Message counts for one subscription loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Messages processed successfully.
    pub processed: u64,
    /// Messages abandoned at some stage.
    pub failed: u64,
    /// Receive errors reported by the transport.
    pub transport_errors: u64,
}

/// Counts for both loops, returned when the record keeper stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordKeeperReport {
    /// Entry topic loop.
    pub entry: StreamStats,
    /// Exit topic loop.
    pub exit: StreamStats,
}

/// Consumes both topics and maintains the record store.
///
/// # Example
///
/// ```rust,ignore
/// let (keeper, shutdown) = RecordKeeper::new(bus, records, sink, settings);
///
/// tokio::spawn(async move {
///     tokio::signal::ctrl_c().await.ok();
///     shutdown.send(true).ok();
/// });
///
/// keeper.run().await?;
/// ```
pub struct RecordKeeper<R, S> {
    bus: Arc<dyn EventBus>,
    entry: EntryProcessor<R>,
    exit: ExitProcessor<R, S>,
    settings: RecordKeeperSettings,
    shutdown: watch::Receiver<bool>,
}

impl<R, S> RecordKeeper<R, S>
where
    R: RecordStore + Clone,
    S: SummarySink,
{
    /// Create a record keeper and the sender that stops it.
    ///
    /// Send `true` on the returned sender to stop both loops after the
    /// message currently being processed.
    #[must_use]
    pub fn new(
        bus: Arc<dyn EventBus>,
        records: R,
        sink: S,
        settings: RecordKeeperSettings,
    ) -> (Self, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let keeper = Self {
            bus,
            entry: EntryProcessor::new(records.clone()),
            exit: ExitProcessor::new(records, sink),
            settings,
            shutdown: shutdown_rx,
        };
        (keeper, shutdown_tx)
    }

    /// Subscribe to both topics and process messages until shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError`] if either subscription cannot be created.
    /// Once both loops are running, this only returns on shutdown or when
    /// both streams end.
    pub async fn run(&self) -> Result<RecordKeeperReport, EventBusError> {
        tracing::info!(
            entry_topic = %self.settings.entry_topic,
            exit_topic = %self.settings.exit_topic,
            "Starting record keeper"
        );

        let entry_stream = self.bus.subscribe(&[self.settings.entry_topic.as_str()]).await?;
        let exit_stream = self.bus.subscribe(&[self.settings.exit_topic.as_str()]).await?;

        let (entry, exit) = tokio::join!(
            consume(
                &self.settings.entry_topic,
                entry_stream,
                &self.entry,
                self.shutdown.clone()
            ),
            consume(
                &self.settings.exit_topic,
                exit_stream,
                &self.exit,
                self.shutdown.clone()
            ),
        );

        let report = RecordKeeperReport { entry, exit };
        tracing::info!(?report, "Record keeper stopped");
        Ok(report)
    }
}

async fn consume<P: MessageProcessor>(
    topic: &str,
    mut stream: EventStream,
    processor: &P,
    mut shutdown: watch::Receiver<bool>,
) -> StreamStats {
    let mut stats = StreamStats::default();

    while !*shutdown.borrow() {
        tokio::select! {
            item = stream.next() => match item {
                Some(Ok(message)) => {
                    tracing::debug!(topic, key = %message.key, "Received message");
                    match processor.process_message(&message.payload).await {
                        Ok(()) => stats.processed += 1,
                        Err(_) => stats.failed += 1,
                    }
                }
                Some(Err(e)) => {
                    stats.transport_errors += 1;
                    tracing::error!(topic, error = %e, "Error receiving message");
                }
                None => {
                    tracing::warn!(topic, "Subscription ended");
                    break;
                }
            },

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!(topic, "Shutdown signal received");
                    break;
                }
            }
        }
    }

    stats
}
