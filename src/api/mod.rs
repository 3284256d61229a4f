//! HTTP surface: health checks and metrics export.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::domain::{ChainId, HealthSnapshot, PipelineStatus};
use crate::infra::PipelineRegistry;
use crate::metrics::MetricsRegistry;

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<PipelineRegistry>,
    pub metrics: Arc<MetricsRegistry>,
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/health/chains", get(chains_health))
        .route("/metrics", get(metrics_prometheus))
        .route("/metrics/json", get(metrics_json))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthzResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

/// Liveness probe: answers as long as the process is serving requests,
/// without touching any dependency.
async fn healthz() -> Json<HealthzResponse> {
    Json(HealthzResponse {
        status: "ok",
        service: "proof-relayer",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Serialize)]
struct ChainsHealthResponse {
    status: &'static str,
    chains: HashMap<ChainId, HealthSnapshot>,
}

/// Per-chain health: every registered pipeline's status, dependency
/// reachability, and pending count.
async fn chains_health(
    State(state): State<AppState>,
) -> (StatusCode, Json<ChainsHealthResponse>) {
    let chains = state.registry.health_status().await;

    let all_stopped = !chains.is_empty()
        && chains
            .values()
            .all(|snapshot| snapshot.status == PipelineStatus::Stopped);
    let fully_healthy = chains.values().all(|snapshot| {
        snapshot.status == PipelineStatus::Running
            && snapshot.queue_connected
            && snapshot.ledger_connected
            && snapshot.cache_connected
    });

    let (code, status) = if all_stopped {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    } else if fully_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::OK, "degraded")
    };

    (code, Json(ChainsHealthResponse { status, chains }))
}

async fn metrics_prometheus(State(state): State<AppState>) -> String {
    state.metrics.to_prometheus().await
}

async fn metrics_json(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.metrics.to_json().await)
}
