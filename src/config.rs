//! Relayer configuration.
//!
//! Supported chains are an explicit enumeration: `RELAYER_CHAIN_IDS` names
//! every chain, and each named chain must provide a complete configuration
//! bundle under the `CHAIN_<id>_*` prefix. Everything is resolved and
//! validated once at startup; a missing or malformed variable is a
//! configuration error, never a runtime lookup failure.

use std::net::SocketAddr;
use std::time::Duration;

use alloy::primitives::Address;
use url::Url;

use crate::domain::ChainId;
use crate::infra::{RelayerError, Result};

/// Message-queue subscription parameters for one chain.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Broker list, comma separated.
    pub brokers: String,
    /// Topic carrying this chain's proof records.
    pub topic: String,
    /// Consumer group shared by all relayer replicas.
    pub group_id: String,
}

/// Remote-ledger connection and fee parameters for one chain.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// RPC endpoint.
    pub rpc_url: Url,
    /// Proof-registry contract address.
    pub registry_address: Address,
    /// Private key the instance signs registry transactions with.
    pub private_key: String,
    /// Gas ceiling for a single-proof commit; the batched path scales this
    /// linearly with batch size.
    pub gas_limit_per_proof: u64,
    /// Optional EIP-1559 fee cap in wei.
    pub max_fee_per_gas: Option<u128>,
    /// Optional EIP-1559 priority fee in wei.
    pub max_priority_fee_per_gas: Option<u128>,
}

/// Dedup-cache parameters.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Redis connection URL.
    pub url: String,
    /// Time-to-live for committed-proof markers.
    pub ttl: Duration,
}

/// Immutable configuration bound to one pipeline instance at construction.
///
/// Changing any of this requires tearing the instance down and recreating it
/// through the registry.
#[derive(Debug, Clone)]
pub struct ChainPipelineConfig {
    pub chain_id: ChainId,
    pub queue: QueueConfig,
    pub ledger: LedgerConfig,
    pub cache: CacheConfig,
    /// Batch size threshold; reaching it flushes immediately.
    pub batch_size: usize,
    /// Upper bound on how long any record waits for a batch.
    pub batch_max_wait: Duration,
    /// Fixed delay before a failed batch is reinserted for retry.
    pub retry_backoff: Duration,
    /// Bound on the final flush during shutdown.
    pub flush_timeout: Duration,
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct RelayerConfig {
    /// HTTP listen address for health and metrics.
    pub listen_addr: SocketAddr,
    /// One pipeline configuration per enumerated chain.
    pub chains: Vec<ChainPipelineConfig>,
}

impl RelayerConfig {
    /// Load and validate the full configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = env_parse_or("PORT", 8080)?;
        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| RelayerError::Configuration(format!("invalid listen address: {e}")))?;

        let chain_ids = parse_chain_ids(&require_env("RELAYER_CHAIN_IDS")?)?;

        let brokers = require_env("KAFKA_BROKERS")?;
        let group_id =
            std::env::var("KAFKA_GROUP_ID").unwrap_or_else(|_| "proof-relayer".to_string());
        let redis_url = require_env("REDIS_URL")?;

        let dedupe_ttl = Duration::from_secs(env_parse_or("RELAYER_DEDUPE_TTL_SECS", 3600u64)?);
        let batch_size: usize = env_parse_or("RELAYER_BATCH_SIZE", 10usize)?;
        let batch_max_wait =
            Duration::from_millis(env_parse_or("RELAYER_BATCH_MAX_WAIT_MS", 10_000u64)?);
        let retry_backoff =
            Duration::from_millis(env_parse_or("RELAYER_RETRY_BACKOFF_MS", 5_000u64)?);
        let flush_timeout =
            Duration::from_millis(env_parse_or("RELAYER_FLUSH_TIMEOUT_MS", 30_000u64)?);

        let mut chains = Vec::with_capacity(chain_ids.len());
        for chain_id in chain_ids {
            let prefix = format!("CHAIN_{chain_id}");

            let rpc_url: Url = require_env(&format!("{prefix}_RPC_URL"))?
                .parse()
                .map_err(|e| {
                    RelayerError::Configuration(format!("chain {chain_id}: invalid RPC URL: {e}"))
                })?;
            let registry_address: Address = require_env(&format!("{prefix}_REGISTRY_ADDRESS"))?
                .parse()
                .map_err(|e| {
                    RelayerError::Configuration(format!(
                        "chain {chain_id}: invalid registry address: {e}"
                    ))
                })?;
            let private_key = require_env(&format!("{prefix}_PRIVATE_KEY"))?;

            let topic = std::env::var(format!("{prefix}_TOPIC"))
                .unwrap_or_else(|_| default_topic(chain_id));
            let gas_limit_per_proof =
                env_parse_or(&format!("{prefix}_GAS_LIMIT"), 300_000u64)?;
            let max_fee_per_gas = env_parse_opt(&format!("{prefix}_MAX_FEE_PER_GAS"))?;
            let max_priority_fee_per_gas =
                env_parse_opt(&format!("{prefix}_MAX_PRIORITY_FEE_PER_GAS"))?;

            chains.push(ChainPipelineConfig {
                chain_id,
                queue: QueueConfig {
                    brokers: brokers.clone(),
                    topic,
                    group_id: group_id.clone(),
                },
                ledger: LedgerConfig {
                    rpc_url,
                    registry_address,
                    private_key,
                    gas_limit_per_proof,
                    max_fee_per_gas,
                    max_priority_fee_per_gas,
                },
                cache: CacheConfig {
                    url: redis_url.clone(),
                    ttl: dedupe_ttl,
                },
                batch_size,
                batch_max_wait,
                retry_backoff,
                flush_timeout,
            });
        }

        Ok(Self {
            listen_addr,
            chains,
        })
    }
}

/// Parse the `RELAYER_CHAIN_IDS` enumeration ("1,137,8453").
fn parse_chain_ids(raw: &str) -> Result<Vec<ChainId>> {
    let mut ids = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let id: u64 = part.parse().map_err(|_| {
            RelayerError::Configuration(format!("invalid chain id in RELAYER_CHAIN_IDS: {part:?}"))
        })?;
        if id == 0 {
            return Err(RelayerError::Configuration(
                "chain id 0 is not a valid chain".into(),
            ));
        }
        let id = ChainId::new(id);
        if ids.contains(&id) {
            return Err(RelayerError::Configuration(format!(
                "duplicate chain id {id} in RELAYER_CHAIN_IDS"
            )));
        }
        ids.push(id);
    }
    if ids.is_empty() {
        return Err(RelayerError::Configuration(
            "RELAYER_CHAIN_IDS names no chains".into(),
        ));
    }
    Ok(ids)
}

fn default_topic(chain_id: ChainId) -> String {
    format!("block-proofs.{chain_id}")
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| RelayerError::Configuration(format!("missing required variable {name}")))
}

fn env_parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| RelayerError::Configuration(format!("invalid value for {name}: {raw:?}"))),
        Err(_) => Ok(default),
    }
}

fn env_parse_opt<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| RelayerError::Configuration(format!("invalid value for {name}: {raw:?}"))),
        Err(_) => Ok(None),
    }
}
