//! Remote-ledger client.
//!
//! Commits proof records to the ProofRegistry contract on one chain. The
//! registry enforces uniqueness per block number on-chain, which is the
//! final backstop against double-storage when the dedup layer has to guess.

use alloy::contract::{CallBuilder, CallDecoder};
use alloy::network::EthereumWallet;
use alloy::primitives::{Address, FixedBytes};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use tracing::info;
use url::Url;

use crate::config::LedgerConfig;
use crate::domain::{Hash256, ProofRecord, SubmissionReceipt};
use crate::infra::{LedgerClient, RelayerError, Result};

// Contract bindings
sol! {
    #[sol(rpc)]
    interface IProofRegistry {
        function storeBlockProof(
            uint64 blockNumber,
            uint64 blockTimestamp,
            bytes32 merkleRoot,
            bytes32 blockHash,
            bytes32 stateRoot
        ) external;

        function storeBlockProofs(
            uint64[] calldata blockNumbers,
            uint64[] calldata blockTimestamps,
            bytes32[] calldata merkleRoots,
            bytes32[] calldata blockHashes,
            bytes32[] calldata stateRoots
        ) external;

        function hasBlockProof(uint64 blockNumber) external view returns (bool);
    }
}

/// Alloy-backed [`LedgerClient`] for one chain's proof registry.
pub struct EvmLedgerClient {
    rpc_url: Url,
    registry_address: Address,
    wallet: EthereumWallet,
    gas_limit_per_proof: u64,
    max_fee_per_gas: Option<u128>,
    max_priority_fee_per_gas: Option<u128>,
}

impl EvmLedgerClient {
    /// Parse the signing key and bind the configuration. No network traffic
    /// happens here; reachability is checked by `health_check`.
    pub fn new(config: &LedgerConfig) -> Result<Self> {
        let signer: PrivateKeySigner = config
            .private_key
            .parse()
            .map_err(|e| RelayerError::Configuration(format!("invalid private key: {e}")))?;

        Ok(Self {
            rpc_url: config.rpc_url.clone(),
            registry_address: config.registry_address,
            wallet: EthereumWallet::from(signer),
            gas_limit_per_proof: config.gas_limit_per_proof,
            max_fee_per_gas: config.max_fee_per_gas,
            max_priority_fee_per_gas: config.max_priority_fee_per_gas,
        })
    }

    fn to_bytes32(hash: &Hash256) -> FixedBytes<32> {
        FixedBytes::from_slice(hash)
    }

    async fn send_and_confirm<P, D>(
        &self,
        call: CallBuilder<Http<Client>, P, D>,
        gas_limit: u64,
        record_count: usize,
    ) -> Result<SubmissionReceipt>
    where
        P: Provider<Http<Client>>,
        D: CallDecoder + Send + Sync,
    {
        let mut call = call.gas(gas_limit);
        if let Some(max_fee) = self.max_fee_per_gas {
            call = call.max_fee_per_gas(max_fee);
        }
        if let Some(priority_fee) = self.max_priority_fee_per_gas {
            call = call.max_priority_fee_per_gas(priority_fee);
        }

        let pending = call
            .send()
            .await
            .map_err(|e| RelayerError::Ledger(format!("failed to send transaction: {e}")))?;

        info!(tx_hash = %pending.tx_hash(), record_count, "Registry transaction sent");

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| RelayerError::Ledger(format!("failed to get receipt: {e}")))?;

        if !receipt.status() {
            return Err(RelayerError::Ledger(format!(
                "transaction {} reverted",
                receipt.transaction_hash
            )));
        }

        Ok(SubmissionReceipt {
            tx_hash: receipt.transaction_hash.0,
            gas_used: u64::try_from(receipt.gas_used).unwrap_or(u64::MAX),
            block_number: receipt.block_number,
            record_count,
        })
    }
}

#[async_trait]
impl LedgerClient for EvmLedgerClient {
    async fn has_proof(&self, block_number: u64) -> Result<bool> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.clone());
        let contract = IProofRegistry::new(self.registry_address, &provider);

        let stored = contract
            .hasBlockProof(block_number)
            .call()
            .await
            .map_err(|e| RelayerError::Ledger(format!("contract call failed: {e}")))?;

        Ok(stored._0)
    }

    async fn store_proof(&self, record: &ProofRecord) -> Result<SubmissionReceipt> {
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(self.wallet.clone())
            .on_http(self.rpc_url.clone());
        let contract = IProofRegistry::new(self.registry_address, &provider);

        let call = contract.storeBlockProof(
            record.block_number,
            record.block_timestamp,
            Self::to_bytes32(&record.merkle_root),
            Self::to_bytes32(&record.block_hash),
            Self::to_bytes32(&record.state_root),
        );

        self.send_and_confirm(call, self.gas_limit_per_proof, 1)
            .await
    }

    async fn store_proof_batch(&self, records: &[ProofRecord]) -> Result<SubmissionReceipt> {
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(self.wallet.clone())
            .on_http(self.rpc_url.clone());
        let contract = IProofRegistry::new(self.registry_address, &provider);

        let block_numbers: Vec<u64> = records.iter().map(|r| r.block_number).collect();
        let block_timestamps: Vec<u64> = records.iter().map(|r| r.block_timestamp).collect();
        let merkle_roots: Vec<FixedBytes<32>> = records
            .iter()
            .map(|r| Self::to_bytes32(&r.merkle_root))
            .collect();
        let block_hashes: Vec<FixedBytes<32>> = records
            .iter()
            .map(|r| Self::to_bytes32(&r.block_hash))
            .collect();
        let state_roots: Vec<FixedBytes<32>> = records
            .iter()
            .map(|r| Self::to_bytes32(&r.state_root))
            .collect();

        let call = contract.storeBlockProofs(
            block_numbers,
            block_timestamps,
            merkle_roots,
            block_hashes,
            state_roots,
        );

        // Resource ceiling scales linearly with batch size.
        let gas_limit = self
            .gas_limit_per_proof
            .saturating_mul(records.len() as u64);

        self.send_and_confirm(call, gas_limit, records.len()).await
    }

    async fn health_check(&self) -> Result<()> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.clone());
        provider
            .get_block_number()
            .await
            .map(|_| ())
            .map_err(|e| RelayerError::Ledger(format!("RPC probe failed: {e}")))
    }
}
