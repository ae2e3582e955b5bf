//! Prometheus metrics for the generator and the record keeper.
//!
//! Processing metrics, labelled by `event_type` (`entry`/`exit`):
//! - `event_processing_latency_seconds` histogram (successful messages only)
//! - `event_processing_successes_total` counter
//! - `event_processing_fails_total` counter, additionally labelled `error_stage`
//!
//! Generator metrics:
//! - `generator_events_published_total{event_type}`
//! - `generator_exit_attempts_total{outcome}` (`parked`/`unregistered`)
//!
//! # Example
//!
//! ```rust,no_run
//! use parking_sim_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Scrape endpoint on http://0.0.0.0:2112/metrics
//! let mut server = MetricsServer::new("0.0.0.0:2112".parse()?);
//! server.start()?;
//! # Ok(())
//! # }
//! ```

use crate::processor::FailureStage;
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use parking_sim_core::EventType;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Processing latency histogram.
pub const PROCESSING_LATENCY: &str = "event_processing_latency_seconds";
/// Failed message counter.
pub const PROCESSING_FAILS: &str = "event_processing_fails_total";
/// Successful message counter.
pub const PROCESSING_SUCCESSES: &str = "event_processing_successes_total";
/// Events published by the generator.
pub const GENERATOR_PUBLISHED: &str = "generator_events_published_total";
/// Exit attempts by outcome.
pub const GENERATOR_EXIT_ATTEMPTS: &str = "generator_exit_attempts_total";

const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the global recorder and spawn the HTTP listener.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or there is no runtime
    /// to host the listener.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g. in tests), a warning is logged
    /// and the call succeeds without serving anything.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        let (recorder, exporter) = recorder_builder()?
            .with_http_listener(self.addr)
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;
        let handle = recorder.handle();
        let addr = self.addr;

        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
            return Ok(());
        }

        // the exporter error type has no Debug or Display
        runtime.spawn(async move {
            if exporter.await.is_err() {
                tracing::error!(addr = %addr, "Metrics exporter stopped");
            }
        });

        self.handle = Some(handle);
        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn recorder_builder() -> Result<PrometheusBuilder, MetricsError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(PROCESSING_LATENCY.to_string()), LATENCY_BUCKETS)
        .map_err(|e| MetricsError::Build(e.to_string()))
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_histogram!(
        PROCESSING_LATENCY,
        metrics::Unit::Seconds,
        "Time taken to process a message successfully"
    );
    describe_counter!(
        PROCESSING_FAILS,
        "Messages that failed processing, by stage"
    );
    describe_counter!(
        PROCESSING_SUCCESSES,
        "Messages processed successfully"
    );
    describe_counter!(
        GENERATOR_PUBLISHED,
        "Events published by the generator"
    );
    describe_counter!(
        GENERATOR_EXIT_ATTEMPTS,
        "Exit events generated, by whether a parked vehicle was found"
    );
}

/// Record keeper metrics recorder.
pub struct ProcessingMetrics;

impl ProcessingMetrics {
    /// Record a fully processed message.
    pub fn record_success(event_type: EventType, latency: Duration) {
        histogram!(PROCESSING_LATENCY, "event_type" => event_type.as_str())
            .record(latency.as_secs_f64());
        counter!(PROCESSING_SUCCESSES, "event_type" => event_type.as_str()).increment(1);
    }

    /// Record a message abandoned at `stage`.
    pub fn record_failure(event_type: EventType, stage: FailureStage) {
        counter!(
            PROCESSING_FAILS,
            "event_type" => event_type.as_str(),
            "error_stage" => stage.as_str()
        )
        .increment(1);
    }
}

/// Generator metrics recorder.
pub struct GeneratorMetrics;

impl GeneratorMetrics {
    /// Record a published event.
    pub fn record_published(event_type: EventType) {
        counter!(GENERATOR_PUBLISHED, "event_type" => event_type.as_str()).increment(1);
    }

    /// Record an exit attempt; `parked` is whether a parked vehicle was drawn.
    pub fn record_exit_attempt(parked: bool) {
        let outcome = if parked { "parked" } else { "unregistered" };
        counter!(GENERATOR_EXIT_ATTEMPTS, "outcome" => outcome).increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn render_with_local_recorder(record: impl FnOnce()) -> String {
        let recorder = recorder_builder().unwrap().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, record);
        handle.render()
    }

    #[test]
    fn failures_are_labelled_by_type_and_stage() {
        let rendered = render_with_local_recorder(|| {
            ProcessingMetrics::record_failure(EventType::Exit, FailureStage::StoreRead);
            ProcessingMetrics::record_failure(EventType::Exit, FailureStage::StoreRead);
            ProcessingMetrics::record_failure(EventType::Entry, FailureStage::Decode);
        });

        assert!(rendered.contains(
            r#"event_processing_fails_total{event_type="exit",error_stage="store_read"} 2"#
        ));
        assert!(rendered.contains(
            r#"event_processing_fails_total{event_type="entry",error_stage="decode"} 1"#
        ));
    }

    #[test]
    fn success_records_latency_and_count() {
        let rendered = render_with_local_recorder(|| {
            ProcessingMetrics::record_success(EventType::Entry, Duration::from_millis(20));
        });

        assert!(rendered.contains(r#"event_processing_successes_total{event_type="entry"} 1"#));
        assert!(rendered.contains(r#"event_processing_latency_seconds_bucket{event_type="entry",le="0.025"} 1"#));
        assert!(rendered.contains(r#"event_processing_latency_seconds_count{event_type="entry"} 1"#));
    }

    #[test]
    fn generator_counters() {
        let rendered = render_with_local_recorder(|| {
            GeneratorMetrics::record_published(EventType::Exit);
            GeneratorMetrics::record_exit_attempt(true);
            GeneratorMetrics::record_exit_attempt(false);
        });

        assert!(rendered.contains(r#"generator_events_published_total{event_type="exit"} 1"#));
        assert!(rendered.contains(r#"generator_exit_attempts_total{outcome="parked"} 1"#));
        assert!(rendered.contains(r#"generator_exit_attempts_total{outcome="unregistered"} 1"#));
    }

    #[tokio::test]
    async fn start_inside_a_runtime_succeeds() {
        let mut server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        assert!(server.start().is_ok());
    }

    #[test]
    fn start_outside_a_runtime_is_an_error() {
        let mut server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        assert!(matches!(server.start(), Err(MetricsError::Install(_))));
    }

    #[test]
    fn server_without_recorder_renders_nothing() {
        let server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        assert!(server.render().is_none());
    }
}
