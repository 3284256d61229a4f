//! Shared fixtures for the integration tests: in-memory implementations of
//! the queue, cache, and ledger capability traits.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use proof_relayer::config::{CacheConfig, ChainPipelineConfig, LedgerConfig, QueueConfig};
use proof_relayer::infra::{DedupStore, LedgerClient, PipelineDeps, QueueConsumer};
use proof_relayer::{
    ChainId, Hash256, ProofRecord, RelayerError, Result, SubmissionReceipt,
};

pub const TEST_CHAIN: ChainId = ChainId(1);

/// Build a pipeline configuration with test-friendly batching parameters.
pub fn test_config(batch_size: usize, max_wait: Duration, retry_backoff: Duration) -> ChainPipelineConfig {
    ChainPipelineConfig {
        chain_id: TEST_CHAIN,
        queue: QueueConfig {
            brokers: "localhost:9092".into(),
            topic: "block-proofs.1".into(),
            group_id: "proof-relayer-test".into(),
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
        batch_size,
        batch_max_wait: max_wait,
        retry_backoff,
        flush_timeout: Duration::from_secs(30),
    }
}

/// A valid proof record for the test chain.
pub fn record(block: u64) -> ProofRecord {
    ProofRecord {
        chain_id: TEST_CHAIN,
        block_number: block,
        block_timestamp: 1_700_000_000 + block,
        merkle_root: [1u8; 32],
        block_hash: [2u8; 32],
        state_root: [3u8; 32],
        transaction_hashes: Vec::<Hash256>::new(),
    }
}

/// The record as it travels on the queue.
pub fn wire_record(block: u64) -> Vec<u8> {
    serde_json::to_vec(&record(block)).unwrap()
}

// ============================================================================
// Scripted queue
// ============================================================================

/// A queue consumer fed by the test through a channel. When the script runs
/// dry it behaves like an idle topic and blocks forever.
pub struct ScriptedQueue {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

pub fn scripted_queue() -> (mpsc::UnboundedSender<Vec<u8>>, Arc<ScriptedQueue>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        tx,
        Arc::new(ScriptedQueue {
            rx: tokio::sync::Mutex::new(rx),
        }),
    )
}

#[async_trait]
impl QueueConsumer for ScriptedQueue {
    async fn recv(&self) -> Result<Vec<u8>> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(payload) => Ok(payload),
            None => futures::future::pending().await,
        }
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// In-memory dedup store
// ============================================================================

/// HashSet-backed dedup store. TTLs are accepted and ignored; the tests
/// never outlive one. Can be switched into a failing mode to simulate an
/// unreachable cache.
#[derive(Default)]
pub struct MemoryDedupStore {
    keys: Mutex<HashSet<String>>,
    failing: AtomicBool,
    exists_calls: AtomicUsize,
}

impl MemoryDedupStore {
    pub fn with_keys(keys: &[&str]) -> Arc<Self> {
        let store = Self::default();
        store
            .keys
            .lock()
            .unwrap()
            .extend(keys.iter().map(|k| k.to_string()));
        Arc::new(store)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.lock().unwrap().contains(key)
    }

    /// Number of `exists` probes served, for synchronizing tests on the
    /// dedup path without sleeping.
    pub fn exists_count(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    fn check_failing(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RelayerError::Internal("cache unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        Ok(self.keys.lock().unwrap().contains(key))
    }

    async fn set_with_expiry(&self, key: &str, _value: &str, _ttl_secs: u64) -> Result<()> {
        self.check_failing()?;
        self.keys.lock().unwrap().insert(key.to_string());
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.check_failing()
    }
}

// ============================================================================
// Recording ledger
// ============================================================================

/// Which commit path a submission used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPath {
    Single,
    Batched,
}

/// One successful ledger write.
#[derive(Debug, Clone)]
pub struct Submission {
    pub path: CommitPath,
    pub blocks: Vec<u64>,
}

/// Ledger fake that records successful submissions, tracks committed block
/// numbers for `has_proof`, and can be told to fail the next N submissions.
#[derive(Default)]
pub struct RecordingLedger {
    submissions: Mutex<Vec<Submission>>,
    attempts: AtomicUsize,
    committed: Mutex<HashSet<u64>>,
    fail_next: AtomicUsize,
}

impl RecordingLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `count` submissions with a ledger error.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    /// Total submissions attempted, including failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn mark_committed(&self, block: u64) {
        self.committed.lock().unwrap().insert(block);
    }

    fn commit(&self, path: CommitPath, records: &[ProofRecord]) -> Result<SubmissionReceipt> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(RelayerError::Ledger("injected submission failure".into()));
        }

        let blocks: Vec<u64> = records.iter().map(|r| r.block_number).collect();
        {
            let mut committed = self.committed.lock().unwrap();
            committed.extend(blocks.iter().copied());
        }
        self.submissions.lock().unwrap().push(Submission {
            path,
            blocks,
        });

        Ok(SubmissionReceipt {
            tx_hash: [0xcd; 32],
            gas_used: 60_000 * records.len() as u64,
            block_number: Some(1),
            record_count: records.len(),
        })
    }
}

#[async_trait]
impl LedgerClient for RecordingLedger {
    async fn has_proof(&self, block_number: u64) -> Result<bool> {
        Ok(self.committed.lock().unwrap().contains(&block_number))
    }

    async fn store_proof(&self, record: &ProofRecord) -> Result<SubmissionReceipt> {
        self.commit(CommitPath::Single, std::slice::from_ref(record))
    }

    async fn store_proof_batch(&self, records: &[ProofRecord]) -> Result<SubmissionReceipt> {
        self.commit(CommitPath::Batched, records)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Wiring helpers
// ============================================================================

pub struct TestDeps {
    pub queue_tx: mpsc::UnboundedSender<Vec<u8>>,
    pub store: Arc<MemoryDedupStore>,
    pub ledger: Arc<RecordingLedger>,
}

/// Fakes for one pipeline, returning both the control handles and the
/// `PipelineDeps` bundle to start it with.
pub fn test_deps() -> (TestDeps, PipelineDeps) {
    let (queue_tx, queue) = scripted_queue();
    let store = Arc::new(MemoryDedupStore::default());
    let ledger = RecordingLedger::new();

    let deps = PipelineDeps {
        queue,
        dedup_store: store.clone(),
        ledger: ledger.clone(),
    };

    (
        TestDeps {
            queue_tx,
            store,
            ledger,
        },
        deps,
    )
}

/// Poll until `condition` holds, advancing paused time in small steps.
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
