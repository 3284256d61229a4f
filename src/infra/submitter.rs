//! Submission executor.
//!
//! Turns an accumulated batch into one registry transaction, choosing the
//! single-item or batched commit path by batch size, and settles the dedup
//! cache on success. Failure handling (whole-batch requeue with backoff)
//! belongs to the owning pipeline; this layer only reports the outcome.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::domain::{ChainId, ProofRecord, SubmissionReceipt};
use crate::metrics::{metric_names, MetricsRegistry};

use super::dedupe::DedupChecker;
use super::traits::LedgerClient;
use super::Result;

/// Commits batches for one chain.
pub struct BatchSubmitter {
    chain_id: ChainId,
    ledger: Arc<dyn LedgerClient>,
    dedup: Arc<DedupChecker>,
    metrics: Arc<MetricsRegistry>,
}

impl BatchSubmitter {
    pub fn new(
        chain_id: ChainId,
        ledger: Arc<dyn LedgerClient>,
        dedup: Arc<DedupChecker>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            chain_id,
            ledger,
            dedup,
            metrics,
        }
    }

    /// Commit a non-empty batch in one transaction.
    ///
    /// On success every record is marked committed in the dedup cache; a
    /// cache write failure only costs a future ledger read, so it is logged
    /// and swallowed. On failure the batch is returned to the caller intact
    /// for requeueing.
    pub async fn submit(&self, batch: &[ProofRecord]) -> Result<SubmissionReceipt> {
        let started = Instant::now();
        self.metrics
            .observe_histogram(metric_names::BATCH_SIZE, batch.len() as f64)
            .await;

        let result = if batch.len() == 1 {
            self.ledger.store_proof(&batch[0]).await
        } else {
            self.ledger.store_proof_batch(batch).await
        };

        match result {
            Ok(receipt) => {
                self.metrics
                    .inc_counter(metric_names::SUBMISSIONS_SUCCEEDED)
                    .await;
                self.metrics
                    .observe_histogram(
                        metric_names::SUBMISSION_LATENCY,
                        started.elapsed().as_secs_f64(),
                    )
                    .await;
                self.metrics
                    .add_counter(metric_names::GAS_USED, receipt.gas_used)
                    .await;

                info!(
                    chain_id = %self.chain_id,
                    record_count = batch.len(),
                    tx_hash = %hex::encode(receipt.tx_hash),
                    gas_used = receipt.gas_used,
                    block_number = receipt.block_number,
                    "Batch committed"
                );

                for record in batch {
                    if let Err(error) = self
                        .dedup
                        .mark_committed(record.chain_id, record.block_number)
                        .await
                    {
                        warn!(
                            chain_id = %record.chain_id,
                            block_number = record.block_number,
                            %error,
                            "Failed to mark record committed in cache"
                        );
                    }
                }

                Ok(receipt)
            }
            Err(error) => {
                self.metrics
                    .inc_counter(metric_names::SUBMISSIONS_FAILED)
                    .await;
                warn!(
                    chain_id = %self.chain_id,
                    record_count = batch.len(),
                    %error,
                    "Batch submission failed"
                );
                Err(error)
            }
        }
    }
}
