//! Error types for the proof-relayer infrastructure.

use std::time::Duration;

use thiserror::Error;

use crate::domain::{ChainId, RecordValidationError};

/// Errors that can occur in the relayer infrastructure.
#[derive(Error, Debug)]
pub enum RelayerError {
    /// Message queue error
    #[error("queue error: {0}")]
    Queue(#[from] rdkafka::error::KafkaError),

    /// Dedup cache error
    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// Remote ledger error (RPC, signing, or contract failure)
    #[error("ledger error: {0}")]
    Ledger(String),

    /// Queue message failed parsing or structural validation
    #[error("invalid record: {0}")]
    InvalidRecord(#[from] RecordValidationError),

    /// A pipeline instance is already registered for the chain
    #[error("pipeline for chain {0} already exists")]
    PipelineExists(ChainId),

    /// No pipeline instance is registered for the chain
    #[error("no pipeline for chain {0}")]
    PipelineNotFound(ChainId),

    /// Final flush did not complete within the configured bound
    #[error("shutdown flush for chain {chain_id} timed out after {timeout:?}")]
    FlushTimeout { chain_id: ChainId, timeout: Duration },

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for relayer operations.
pub type Result<T> = std::result::Result<T, RelayerError>;
