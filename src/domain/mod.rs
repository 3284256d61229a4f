//! Core domain types for the proof relayer.

mod proof;
mod types;

pub use proof::{parse_digest, ProofRecord, RecordValidationError};
pub(crate) use proof::dedupe_key;
pub use types::{ChainId, Hash256, HealthSnapshot, PipelineStatus, SubmissionReceipt};
