//! Proof Relayer
//!
//! Ingests block-proof records from a message queue, deduplicates them
//! against previously committed work, accumulates them into bounded
//! batches, and commits each batch to a per-chain proof registry contract.
//!
//! ## Modules
//!
//! - [`domain`] - Core domain types (proof records, health snapshots)
//! - [`infra`] - Pipeline machinery (queue, dedup cache, batcher, submitter,
//!   per-chain instances and their registry)
//! - [`ledger`] - Proof-registry contract client
//! - [`config`] - Startup-validated per-chain configuration
//! - [`metrics`] - Observability and metrics
//! - [`telemetry`] - Tracing and OpenTelemetry integration
//! - [`api`] - Health and metrics HTTP surface

pub mod api;
pub mod config;
pub mod domain;
pub mod infra;
pub mod ledger;
pub mod metrics;
pub mod server;
pub mod telemetry;

// Re-export commonly used types
pub use domain::{ChainId, Hash256, HealthSnapshot, PipelineStatus, ProofRecord, SubmissionReceipt};

pub use infra::{
    BatchAccumulator, ChainPipeline, DedupChecker, DedupStore, LedgerClient, PipelineDeps,
    PipelineRegistry, QueueConsumer, RelayerError, Result,
};
