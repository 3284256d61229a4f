//! Per-chain pipeline instance.
//!
//! One instance owns the full consume→validate→dedupe→accumulate→submit
//! lifecycle for a single chain: a consumer task reads the queue and feeds
//! parsed, deduplicated records over a channel to an accumulator task that
//! owns the pending batch. All batch mutation happens on the accumulator
//! task, so the append/check-threshold/swap-and-clear sequence is serialized
//! by ownership, without a lock around the pending state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::ChainPipelineConfig;
use crate::domain::{ChainId, HealthSnapshot, PipelineStatus, ProofRecord};
use crate::ledger::EvmLedgerClient;
use crate::metrics::{metric_names, MetricsRegistry};

use super::batcher::{AddOutcome, BatchAccumulator};
use super::dedupe::{DedupChecker, RedisDedupStore};
use super::queue::KafkaQueueConsumer;
use super::submitter::BatchSubmitter;
use super::traits::{DedupStore, LedgerClient, QueueConsumer};
use super::{RelayerError, Result};

const RECORD_CHANNEL_CAPACITY: usize = 256;

/// Pause after a queue receive error so a dead broker does not spin the
/// consume loop hot.
const QUEUE_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Lifecycle states of a pipeline instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// The external collaborators one instance runs against.
///
/// Bundled so tests can inject in-memory fakes while production wiring uses
/// [`PipelineDeps::connect`].
pub struct PipelineDeps {
    pub queue: Arc<dyn QueueConsumer>,
    pub dedup_store: Arc<dyn DedupStore>,
    pub ledger: Arc<dyn LedgerClient>,
}

impl PipelineDeps {
    /// Open the real collaborator connections for one chain.
    pub async fn connect(config: &ChainPipelineConfig) -> Result<Self> {
        let ledger = EvmLedgerClient::new(&config.ledger)?;
        let dedup_store = RedisDedupStore::connect(&config.cache.url).await?;
        let queue = KafkaQueueConsumer::connect(&config.queue)?;
        Ok(Self {
            queue: Arc::new(queue),
            dedup_store: Arc::new(dedup_store),
            ledger: Arc::new(ledger),
        })
    }
}

struct TaskHandles {
    consumer: JoinHandle<()>,
    accumulator: JoinHandle<()>,
}

/// One running pipeline instance.
///
/// Terminal once stopped: a configuration change or restart means recreating
/// the instance through the registry.
pub struct ChainPipeline {
    chain_id: ChainId,
    state: Arc<Mutex<PipelineState>>,
    pending_count: Arc<AtomicUsize>,
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Option<TaskHandles>>,
    flush_timeout: Duration,
    queue: Arc<dyn QueueConsumer>,
    dedup_store: Arc<dyn DedupStore>,
    ledger: Arc<dyn LedgerClient>,
}

impl ChainPipeline {
    /// Start an instance: verify the cache connection, register the consume
    /// loop, and transition to running.
    ///
    /// A dependency failure here is fatal for this instance only; the
    /// registry reports it and keeps sibling instances untouched.
    pub async fn start(
        config: ChainPipelineConfig,
        deps: PipelineDeps,
        metrics: Arc<MetricsRegistry>,
    ) -> Result<Self> {
        let chain_id = config.chain_id;
        let state = Arc::new(Mutex::new(PipelineState::Starting));
        info!(%chain_id, topic = %config.queue.topic, "Starting pipeline instance");

        deps.dedup_store.ping().await.map_err(|error| {
            error!(%chain_id, %error, "Dedup cache unreachable during startup");
            error
        })?;

        let dedup = Arc::new(DedupChecker::new(
            deps.dedup_store.clone(),
            deps.ledger.clone(),
            config.cache.ttl,
        ));
        let submitter = BatchSubmitter::new(
            chain_id,
            deps.ledger.clone(),
            dedup.clone(),
            metrics.clone(),
        );

        let (record_tx, record_rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pending_count = Arc::new(AtomicUsize::new(0));

        let consumer = tokio::spawn(consume_loop(
            chain_id,
            deps.queue.clone(),
            dedup,
            record_tx,
            shutdown_rx,
            metrics.clone(),
        ));
        let accumulator = tokio::spawn(accumulate_loop(
            chain_id,
            config.batch_size,
            config.batch_max_wait,
            config.retry_backoff,
            record_rx,
            submitter,
            pending_count.clone(),
            metrics,
        ));

        *state.lock().unwrap() = PipelineState::Running;
        info!(%chain_id, "Pipeline instance running");

        Ok(Self {
            chain_id,
            state,
            pending_count,
            shutdown_tx,
            handles: Mutex::new(Some(TaskHandles {
                consumer,
                accumulator,
            })),
            flush_timeout: config.flush_timeout,
            queue: deps.queue,
            dedup_store: deps.dedup_store,
            ledger: deps.ledger,
        })
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// Stop the instance: end consumption, drain and flush the pending
    /// batch, release the tasks. Bounded by the configured flush timeout so
    /// an unreachable ledger cannot wedge shutdown.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            match *state {
                PipelineState::Stopping | PipelineState::Stopped => return Ok(()),
                _ => *state = PipelineState::Stopping,
            }
        }
        info!(chain_id = %self.chain_id, "Stopping pipeline instance");
        let _ = self.shutdown_tx.send(true);

        let handles = self.handles.lock().unwrap().take();
        let result = match handles {
            Some(TaskHandles {
                consumer,
                accumulator,
            }) => {
                let consumer_abort = consumer.abort_handle();
                let accumulator_abort = accumulator.abort_handle();
                let drain = async {
                    let _ = consumer.await;
                    let _ = accumulator.await;
                };
                match tokio::time::timeout(self.flush_timeout, drain).await {
                    Ok(()) => Ok(()),
                    Err(_) => {
                        consumer_abort.abort();
                        accumulator_abort.abort();
                        warn!(
                            chain_id = %self.chain_id,
                            timeout = ?self.flush_timeout,
                            "Shutdown flush timed out, aborting pipeline tasks"
                        );
                        Err(RelayerError::FlushTimeout {
                            chain_id: self.chain_id,
                            timeout: self.flush_timeout,
                        })
                    }
                }
            }
            None => Ok(()),
        };

        *self.state.lock().unwrap() = PipelineState::Stopped;
        info!(chain_id = %self.chain_id, "Pipeline instance stopped");
        result
    }

    /// Probe each dependency independently and report a snapshot.
    pub async fn health(&self) -> HealthSnapshot {
        let status = match *self.state.lock().unwrap() {
            PipelineState::Running => PipelineStatus::Running,
            _ => PipelineStatus::Stopped,
        };

        let (queue, ledger, cache) = tokio::join!(
            self.queue.health_check(),
            self.ledger.health_check(),
            self.dedup_store.ping(),
        );

        HealthSnapshot {
            status,
            queue_connected: queue.is_ok(),
            ledger_connected: ledger.is_ok(),
            cache_connected: cache.is_ok(),
            pending: self.pending_count.load(Ordering::Relaxed),
        }
    }
}

/// Queue → parse → validate → dedupe → channel.
async fn consume_loop(
    chain_id: ChainId,
    queue: Arc<dyn QueueConsumer>,
    dedup: Arc<DedupChecker>,
    records: mpsc::Sender<ProofRecord>,
    mut shutdown: watch::Receiver<bool>,
    metrics: Arc<MetricsRegistry>,
) {
    debug!(%chain_id, "Consume loop registered");
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            received = queue.recv() => {
                let payload = match received {
                    Ok(payload) => payload,
                    Err(error) => {
                        warn!(%chain_id, %error, "Queue receive failed");
                        metrics.inc_counter(metric_names::QUEUE_ERRORS).await;
                        tokio::time::sleep(QUEUE_ERROR_PAUSE).await;
                        continue;
                    }
                };
                metrics.inc_counter(metric_names::RECORDS_CONSUMED).await;

                // A malformed message is dropped alone; the batch and the
                // instance state are unaffected.
                let record = match ProofRecord::from_wire(&payload) {
                    Ok(record) => record,
                    Err(error) => {
                        warn!(%chain_id, %error, "Discarding malformed queue message");
                        metrics.inc_counter(metric_names::RECORDS_INVALID).await;
                        continue;
                    }
                };

                if dedup.is_committed(record.chain_id, record.block_number).await {
                    debug!(
                        %chain_id,
                        block_number = record.block_number,
                        "Discarding already committed record"
                    );
                    metrics.inc_counter(metric_names::RECORDS_DUPLICATE).await;
                    continue;
                }

                metrics.inc_counter(metric_names::RECORDS_ACCEPTED).await;
                if records.send(record).await.is_err() {
                    // Accumulator is gone; nothing left to feed.
                    break;
                }
            }
        }
    }
    debug!(%chain_id, "Consume loop stopped");
}

/// A failed batch waiting out its backoff before being reinserted.
struct ParkedBatch {
    records: Vec<ProofRecord>,
    retry_at: Instant,
}

/// Channel → accumulate → flush/retry. Owns all pending-batch state.
#[allow(clippy::too_many_arguments)]
async fn accumulate_loop(
    chain_id: ChainId,
    batch_size: usize,
    max_wait: Duration,
    retry_backoff: Duration,
    mut records: mpsc::Receiver<ProofRecord>,
    submitter: BatchSubmitter,
    pending_count: Arc<AtomicUsize>,
    metrics: Arc<MetricsRegistry>,
) {
    let mut accumulator = BatchAccumulator::new(batch_size, max_wait);
    let mut parked: Option<ParkedBatch> = None;

    loop {
        let flush_at = accumulator.deadline();
        let retry_at = parked.as_ref().map(|p| p.retry_at);

        tokio::select! {
            maybe = records.recv() => {
                match maybe {
                    Some(record) => {
                        let outcome = accumulator.add(record);
                        publish_pending(chain_id, &accumulator, &parked, &pending_count, &metrics).await;
                        match outcome {
                            AddOutcome::Flush => {
                                flush(
                                    chain_id,
                                    &mut accumulator,
                                    &mut parked,
                                    &submitter,
                                    retry_backoff,
                                    &pending_count,
                                    &metrics,
                                )
                                .await;
                            }
                            AddOutcome::Armed => {
                                debug!(%chain_id, max_wait = ?max_wait, "Armed batch max-wait timer");
                            }
                            AddOutcome::Pending => {}
                        }
                    }
                    // Consumer closed the channel: shut down after draining.
                    None => break,
                }
            }
            _ = sleep_until_opt(flush_at), if flush_at.is_some() => {
                debug!(%chain_id, pending = accumulator.len(), "Batch max-wait timer fired");
                flush(
                    chain_id,
                    &mut accumulator,
                    &mut parked,
                    &submitter,
                    retry_backoff,
                    &pending_count,
                    &metrics,
                )
                .await;
            }
            _ = sleep_until_opt(retry_at), if retry_at.is_some() => {
                let batch = parked.take().map(|p| p.records).unwrap_or_default();
                info!(%chain_id, record_count = batch.len(), "Reinserting failed batch for retry");
                let outcome = accumulator.requeue_front(batch);
                publish_pending(chain_id, &accumulator, &parked, &pending_count, &metrics).await;
                if outcome == AddOutcome::Flush {
                    flush(
                        chain_id,
                        &mut accumulator,
                        &mut parked,
                        &submitter,
                        retry_backoff,
                        &pending_count,
                        &metrics,
                    )
                    .await;
                }
            }
        }
    }

    // Stopping: the parked batch rejoins the pending sequence and the whole
    // remainder is flushed synchronously. The stop() timeout bounds this.
    if let Some(parked_batch) = parked.take() {
        accumulator.requeue_front(parked_batch.records);
    }
    if !accumulator.is_empty() {
        let batch = accumulator.take_batch();
        info!(%chain_id, record_count = batch.len(), "Flushing pending batch before shutdown");
        if let Err(error) = submitter.submit(&batch).await {
            error!(
                %chain_id,
                record_count = batch.len(),
                %error,
                "Final flush failed"
            );
        }
    }
    publish_pending(chain_id, &accumulator, &parked, &pending_count, &metrics).await;
    debug!(%chain_id, "Accumulator stopped");
}

/// Flush the current pending batch; on failure, park the whole batch behind
/// the fixed backoff so it is reinserted at the front later.
async fn flush(
    chain_id: ChainId,
    accumulator: &mut BatchAccumulator,
    parked: &mut Option<ParkedBatch>,
    submitter: &BatchSubmitter,
    retry_backoff: Duration,
    pending_count: &Arc<AtomicUsize>,
    metrics: &Arc<MetricsRegistry>,
) {
    let batch = accumulator.take_batch();
    if batch.is_empty() {
        return;
    }

    if submitter.submit(&batch).await.is_err() {
        match parked {
            // A retry is already pending; the new failure queues up behind
            // it, older records first.
            Some(existing) => existing.records.extend(batch),
            None => {
                *parked = Some(ParkedBatch {
                    records: batch,
                    retry_at: Instant::now() + retry_backoff,
                })
            }
        }
    }

    publish_pending(chain_id, accumulator, parked, pending_count, metrics).await;
}

async fn publish_pending(
    chain_id: ChainId,
    accumulator: &BatchAccumulator,
    parked: &Option<ParkedBatch>,
    pending_count: &Arc<AtomicUsize>,
    metrics: &Arc<MetricsRegistry>,
) {
    let pending = accumulator.len() + parked.as_ref().map_or(0, |p| p.records.len());
    pending_count.store(pending, Ordering::Relaxed);
    metrics
        .set_gauge(&metric_names::pending_gauge(chain_id), pending as u64)
        .await;
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, LedgerConfig, QueueConfig};
    use crate::infra::traits::{MockDedupStore, MockLedgerClient, MockQueueConsumer};

    fn test_config() -> ChainPipelineConfig {
        ChainPipelineConfig {
            chain_id: ChainId::new(1),
            queue: QueueConfig {
                brokers: "localhost:9092".into(),
                topic: "block-proofs.1".into(),
                group_id: "proof-relayer".into(),
            },
            ledger: LedgerConfig {
                rpc_url: "http://localhost:8545".parse().unwrap(),
                registry_address: alloy::primitives::Address::ZERO,
                private_key: String::new(),
                gas_limit_per_proof: 300_000,
                max_fee_per_gas: None,
                max_priority_fee_per_gas: None,
            },
            cache: CacheConfig {
                url: "redis://localhost:6379".into(),
                ttl: Duration::from_secs(3600),
            },
            batch_size: 3,
            batch_max_wait: Duration::from_secs(1),
            retry_backoff: Duration::from_secs(5),
            flush_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_startup_fails_when_cache_unreachable() {
        let mut store = MockDedupStore::new();
        store
            .expect_ping()
            .returning(|| Err(RelayerError::Internal("connection refused".into())));

        let deps = PipelineDeps {
            queue: Arc::new(MockQueueConsumer::new()),
            dedup_store: Arc::new(store),
            ledger: Arc::new(MockLedgerClient::new()),
        };

        let result =
            ChainPipeline::start(test_config(), deps, Arc::new(MetricsRegistry::new())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut store = MockDedupStore::new();
        store.expect_ping().returning(|| Ok(()));

        // recv keeps failing; the consume loop pauses between attempts and
        // notices shutdown on the next iteration.
        let mut queue = MockQueueConsumer::new();
        queue
            .expect_recv()
            .returning(|| Err(RelayerError::Internal("no messages".into())));

        let deps = PipelineDeps {
            queue: Arc::new(queue),
            dedup_store: Arc::new(store),
            ledger: Arc::new(MockLedgerClient::new()),
        };

        let pipeline = ChainPipeline::start(test_config(), deps, Arc::new(MetricsRegistry::new()))
            .await
            .unwrap();

        pipeline.stop().await.unwrap();
        pipeline.stop().await.unwrap();
    }
}
