//! Service bootstrap.
//!
//! Wires together configuration, telemetry, the pipeline registry (one
//! instance per enumerated chain), and the HTTP surface, then runs until a
//! shutdown signal drains everything.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::api::{self, AppState};
use crate::config::RelayerConfig;
use crate::infra::{shutdown_signal, PipelineRegistry};
use crate::metrics::MetricsRegistry;
use crate::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};

/// Start the relayer and block until shutdown completes.
pub async fn run() -> anyhow::Result<()> {
    let telemetry_config = TelemetryConfig::from_env();
    init_telemetry(&telemetry_config)
        .map_err(|e| anyhow::anyhow!("failed to initialize telemetry: {e}"))?;

    info!("Starting proof-relayer v{}", env!("CARGO_PKG_VERSION"));

    let config = RelayerConfig::from_env()?;
    let metrics = Arc::new(MetricsRegistry::new());
    let registry = Arc::new(PipelineRegistry::new(metrics.clone()));

    // A chain that fails to start is reported and skipped; its siblings
    // keep running.
    for chain_config in &config.chains {
        let chain_id = chain_config.chain_id;
        match registry.add(chain_config.clone()).await {
            Ok(()) => info!(%chain_id, "Pipeline registered"),
            Err(error) => {
                error!(%chain_id, %error, "Failed to start pipeline, continuing with remaining chains")
            }
        }
    }

    let started = registry.chain_ids().await;
    if started.is_empty() {
        anyhow::bail!("no pipeline instance could be started");
    }
    info!(chains = ?started, "Relaying proofs for {} chain(s)", started.len());

    let state = AppState {
        registry: registry.clone(),
        metrics,
    };
    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Draining pipeline instances");
    let failures = registry.stop_all().await;
    if !failures.is_empty() {
        warn!(count = failures.len(), "Some pipelines did not stop cleanly");
    }

    shutdown_telemetry();
    Ok(())
}
