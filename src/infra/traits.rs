//! Capability traits for the external collaborators.
//!
//! The pipeline consumes the message queue, the dedup cache, and the remote
//! ledger exclusively through these contracts. Concrete implementations are
//! `KafkaQueueConsumer`, `RedisDedupStore`, and `EvmLedgerClient`; tests
//! substitute in-memory fakes.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::domain::{ProofRecord, SubmissionReceipt};

use super::Result;

/// One subscription to a message-queue topic.
///
/// Delivery is at-least-once: consumers must tolerate redelivery of already
/// committed records (handled by the dedup check, never by the queue layer).
#[cfg_attr(test, automock)]
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    /// Wait for and return the next message payload.
    ///
    /// Cancel-safe: dropping the future mid-wait loses no message.
    async fn recv(&self) -> Result<Vec<u8>>;

    /// Verify the broker group is reachable.
    async fn health_check(&self) -> Result<()>;
}

/// Fast existence-check store shielding the authoritative ledger.
///
/// A positive answer may be trusted; a negative answer only means "unknown"
/// and must fall through to the ledger; that policy lives in `DedupChecker`,
/// this trait is only the raw store access.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Whether the key is present.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Write a key with a bounded time-to-live.
    async fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// Verify the store is reachable.
    async fn ping(&self) -> Result<()>;
}

/// Write/read access to one chain's proof-registry contract.
///
/// Transactions either confirm (receipt returned) or fail with an observable
/// error; there is no silent partial application.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Authoritative existence check for a block's proof.
    async fn has_proof(&self, block_number: u64) -> Result<bool>;

    /// Commit a single proof record.
    async fn store_proof(&self, record: &ProofRecord) -> Result<SubmissionReceipt>;

    /// Commit a batch of proof records in one transaction.
    async fn store_proof_batch(&self, records: &[ProofRecord]) -> Result<SubmissionReceipt>;

    /// Verify the RPC endpoint is reachable via a lightweight read call.
    async fn health_check(&self) -> Result<()>;
}
