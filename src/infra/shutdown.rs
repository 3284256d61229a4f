//! Process shutdown signal handling.

use tokio::signal;
use tracing::info;

/// Completes when the process receives SIGTERM or SIGINT.
///
/// Used both by the HTTP server's graceful-shutdown hook and by the main
/// loop to know when to drain the pipeline registry.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
