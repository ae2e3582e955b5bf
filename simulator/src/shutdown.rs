//! Ctrl-C / SIGTERM handling.

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Wait for Ctrl+C or SIGTERM.
///
/// If a handler cannot be installed, that signal is ignored and a warning
/// is logged; the process can then only be stopped by the other one.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}

/// Flip `shutdown` to `true` once a termination signal arrives.
pub fn spawn_signal_handler(shutdown: watch::Sender<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_signal().await;
        if shutdown.send(true).is_err() {
            tracing::debug!("Shutdown receiver already dropped");
        }
    })
}
