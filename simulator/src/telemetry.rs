//! Logging and metrics setup shared by both binaries.

use parking_sim_runtime::metrics::{MetricsError, MetricsServer};
use std::net::SocketAddr;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `fallback` (normally `LOG_LEVEL`)
/// is used as the filter.
///
/// # Errors
///
/// Returns [`TryInitError`] if a subscriber is already installed.
pub fn init_tracing(fallback: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(filter(fallback))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}

fn filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Start the Prometheus listener on `addr`.
///
/// # Errors
///
/// Returns [`MetricsError`] if the exporter cannot be built or installed.
pub fn start_metrics(addr: SocketAddr) -> Result<MetricsServer, MetricsError> {
    let mut server = MetricsServer::new(addr);
    server.start()?;
    Ok(server)
}
