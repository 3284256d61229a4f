//! Infrastructure layer for the proof relayer.
//!
//! Contains the capability traits for the external collaborators and the
//! pipeline machinery built on top of them:
//! - Queue consumption (Kafka)
//! - Deduplication cache (Redis over the authoritative ledger)
//! - Batch accumulation (size/time dual trigger)
//! - Submission execution (single vs. batched commit paths)
//! - Per-chain pipeline instances and their registry
//! - Shutdown signal handling

mod batcher;
mod dedupe;
mod error;
mod pipeline;
mod queue;
mod registry;
mod shutdown;
mod submitter;
mod traits;

pub use batcher::{AddOutcome, BatchAccumulator};
pub use dedupe::{DedupChecker, RedisDedupStore, DEFAULT_DEDUPE_TTL};
pub use error::*;
pub use pipeline::{ChainPipeline, PipelineDeps};
pub use queue::KafkaQueueConsumer;
pub use registry::PipelineRegistry;
pub use shutdown::shutdown_signal;
pub use submitter::BatchSubmitter;
pub use traits::*;
