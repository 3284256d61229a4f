//! Pipeline registry.
//!
//! Owns every pipeline instance, keyed by chain id, behind a single mutation
//! point. Instances are fully independent; the registry only fans lifecycle
//! and health operations out across them.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info};

use crate::config::ChainPipelineConfig;
use crate::domain::{ChainId, HealthSnapshot};
use crate::metrics::MetricsRegistry;

use super::pipeline::{ChainPipeline, PipelineDeps};
use super::{RelayerError, Result};

/// Owner of all per-chain pipeline instances.
pub struct PipelineRegistry {
    pipelines: tokio::sync::Mutex<HashMap<ChainId, Arc<ChainPipeline>>>,
    metrics: Arc<MetricsRegistry>,
}

impl PipelineRegistry {
    pub fn new(metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            pipelines: tokio::sync::Mutex::new(HashMap::new()),
            metrics,
        }
    }

    /// Connect the chain's collaborators, start an instance, and register
    /// it. Fails without side effects if the chain is already registered.
    pub async fn add(&self, config: ChainPipelineConfig) -> Result<()> {
        let mut pipelines = self.pipelines.lock().await;
        if pipelines.contains_key(&config.chain_id) {
            return Err(RelayerError::PipelineExists(config.chain_id));
        }

        let deps = PipelineDeps::connect(&config).await?;
        let pipeline = ChainPipeline::start(config, deps, self.metrics.clone()).await?;
        pipelines.insert(pipeline.chain_id(), Arc::new(pipeline));
        Ok(())
    }

    /// As [`add`](Self::add), but with injected collaborators. This is the
    /// seam the integration tests drive fakes through.
    pub async fn add_with_deps(
        &self,
        config: ChainPipelineConfig,
        deps: PipelineDeps,
    ) -> Result<()> {
        let mut pipelines = self.pipelines.lock().await;
        if pipelines.contains_key(&config.chain_id) {
            return Err(RelayerError::PipelineExists(config.chain_id));
        }

        let pipeline = ChainPipeline::start(config, deps, self.metrics.clone()).await?;
        pipelines.insert(pipeline.chain_id(), Arc::new(pipeline));
        Ok(())
    }

    /// Stop and discard the chain's instance. Fails if none is registered.
    pub async fn remove(&self, chain_id: ChainId) -> Result<()> {
        let pipeline = {
            let mut pipelines = self.pipelines.lock().await;
            pipelines
                .remove(&chain_id)
                .ok_or(RelayerError::PipelineNotFound(chain_id))?
        };
        pipeline.stop().await
    }

    /// Registered chain ids.
    pub async fn chain_ids(&self) -> Vec<ChainId> {
        let pipelines = self.pipelines.lock().await;
        let mut ids: Vec<ChainId> = pipelines.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Stop every instance concurrently, collecting individual failures
    /// instead of failing fast.
    pub async fn stop_all(&self) -> Vec<(ChainId, RelayerError)> {
        let pipelines: Vec<Arc<ChainPipeline>> = {
            let mut map = self.pipelines.lock().await;
            map.drain().map(|(_, pipeline)| pipeline).collect()
        };
        info!(count = pipelines.len(), "Stopping all pipeline instances");

        let results = join_all(pipelines.iter().map(|pipeline| async {
            (pipeline.chain_id(), pipeline.stop().await)
        }))
        .await;

        let mut failures = Vec::new();
        for (chain_id, result) in results {
            if let Err(err) = result {
                error!(%chain_id, error = %err, "Pipeline stop failed");
                failures.push((chain_id, err));
            }
        }
        failures
    }

    /// Probe every instance independently and return the full map. A slow
    /// or failing dependency shows up as `false` booleans in that chain's
    /// snapshot, never as a missing entry.
    pub async fn health_status(&self) -> HashMap<ChainId, HealthSnapshot> {
        let pipelines: Vec<Arc<ChainPipeline>> = {
            let map = self.pipelines.lock().await;
            map.values().cloned().collect()
        };

        let snapshots = join_all(pipelines.iter().map(|pipeline| async {
            (pipeline.chain_id(), pipeline.health().await)
        }))
        .await;

        snapshots.into_iter().collect()
    }
}
