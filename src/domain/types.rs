//! Shared type definitions for the proof relayer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte digest (block hashes, merkle roots, state roots).
pub type Hash256 = [u8; 32];

/// Identifier of a supported chain.
///
/// Every dedup-cache key and every pipeline instance is partitioned by this
/// value, so records for different chains can never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status reported for a pipeline instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    /// Consume loop is registered and processing messages.
    Running,
    /// Instance is not processing (created, stopping, or terminal).
    Stopped,
}

/// Point-in-time view of one pipeline instance's health.
///
/// Produced on demand by probing each dependency independently; never
/// persisted.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    /// Overall pipeline status.
    pub status: PipelineStatus,
    /// Whether the message queue answered the last probe.
    pub queue_connected: bool,
    /// Whether the remote ledger answered a lightweight read call.
    pub ledger_connected: bool,
    /// Whether the dedup cache answered a ping.
    pub cache_connected: bool,
    /// Number of records accumulated but not yet committed.
    pub pending: usize,
}

/// Outcome of a confirmed registry transaction.
#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
    /// Hash of the confirmed transaction.
    pub tx_hash: Hash256,
    /// Gas consumed by the transaction.
    pub gas_used: u64,
    /// Block the transaction was included in, when the node reports it.
    pub block_number: Option<u64>,
    /// Number of proof records committed by the transaction.
    pub record_count: usize,
}
