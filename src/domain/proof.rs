//! Block-proof records and their wire format.
//!
//! Upstream proof producers publish one JSON document per block onto the
//! queue. Digests travel as 0x-prefixed hex strings; `(chain_id,
//! block_number)` is the natural key used for deduplication.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{ChainId, Hash256};

/// Reasons a queue message is rejected before reaching the dedup check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordValidationError {
    /// Payload is not a structurally valid proof record document.
    #[error("unparsable proof record: {0}")]
    Malformed(String),

    /// Chain id must be a positive integer.
    #[error("chain id must be positive")]
    ZeroChainId,

    /// Block timestamp must be a positive integer (seconds).
    #[error("block timestamp must be positive")]
    ZeroTimestamp,

    /// A required digest field is all zeroes.
    #[error("{0} must be non-zero")]
    ZeroDigest(&'static str),
}

/// One unit of work: a single block's proof summary awaiting commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRecord {
    /// Chain the block belongs to.
    pub chain_id: ChainId,
    /// Block number, unique per chain.
    pub block_number: u64,
    /// Block timestamp in seconds.
    pub block_timestamp: u64,
    /// Merkle root over the block's transaction hashes.
    #[serde(with = "hex_digest")]
    pub merkle_root: Hash256,
    /// Hash of the block itself.
    #[serde(with = "hex_digest")]
    pub block_hash: Hash256,
    /// State root after the block.
    #[serde(with = "hex_digest")]
    pub state_root: Hash256,
    /// Ordered transaction hashes; may be empty for empty blocks.
    #[serde(default, with = "hex_digest_vec")]
    pub transaction_hashes: Vec<Hash256>,
}

impl ProofRecord {
    /// Parse and structurally validate a raw queue payload.
    pub fn from_wire(payload: &[u8]) -> Result<Self, RecordValidationError> {
        let record: ProofRecord = serde_json::from_slice(payload)
            .map_err(|e| RecordValidationError::Malformed(e.to_string()))?;
        record.validate()?;
        Ok(record)
    }

    /// Check the structural invariants: positive chain id and timestamp,
    /// non-zero digests. An empty transaction list is valid.
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        if self.chain_id.as_u64() == 0 {
            return Err(RecordValidationError::ZeroChainId);
        }
        if self.block_timestamp == 0 {
            return Err(RecordValidationError::ZeroTimestamp);
        }
        if self.merkle_root == [0u8; 32] {
            return Err(RecordValidationError::ZeroDigest("merkle root"));
        }
        if self.block_hash == [0u8; 32] {
            return Err(RecordValidationError::ZeroDigest("block hash"));
        }
        if self.state_root == [0u8; 32] {
            return Err(RecordValidationError::ZeroDigest("state root"));
        }
        Ok(())
    }

    /// Cache key under which this record's commitment is tracked.
    ///
    /// The chain id is part of every key, so pipelines for different chains
    /// never contend over the same key space.
    pub fn dedupe_key(&self) -> String {
        dedupe_key(self.chain_id, self.block_number)
    }
}

/// Dedup-cache key for a (chain, block) pair.
pub(crate) fn dedupe_key(chain_id: ChainId, block_number: u64) -> String {
    format!("proof:{}:{}", chain_id, block_number)
}

/// Parse a 32-byte digest from hex, with or without a `0x` prefix.
pub fn parse_digest(s: &str) -> Result<Hash256, String> {
    let raw = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(raw).map_err(|e| format!("invalid hex digest: {e}"))?;
    let digest: Hash256 = bytes
        .try_into()
        .map_err(|_| format!("digest must be 32 bytes, got {} hex chars", raw.len()))?;
    Ok(digest)
}

mod hex_digest {
    use super::{parse_digest, Hash256};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(digest: &Hash256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(digest)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Hash256, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_digest(&s).map_err(de::Error::custom)
    }
}

mod hex_digest_vec {
    use super::{parse_digest, Hash256};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        digests: &[Hash256],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(digests.iter().map(|d| format!("0x{}", hex::encode(d))))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Hash256>, D::Error> {
        let strings = Vec::<String>::deserialize(deserializer)?;
        strings
            .iter()
            .map(|s| parse_digest(s).map_err(de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_record() -> ProofRecord {
        ProofRecord {
            chain_id: ChainId::new(1),
            block_number: 42,
            block_timestamp: 1_700_000_000,
            merkle_root: [1u8; 32],
            block_hash: [2u8; 32],
            state_root: [3u8; 32],
            transaction_hashes: vec![[4u8; 32], [5u8; 32]],
        }
    }

    #[test]
    fn test_valid_record_passes() {
        assert!(valid_record().validate().is_ok());
    }

    #[test]
    fn test_empty_transaction_list_is_valid() {
        let mut record = valid_record();
        record.transaction_hashes.clear();
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_zero_fields_rejected() {
        let mut record = valid_record();
        record.chain_id = ChainId::new(0);
        assert_eq!(record.validate(), Err(RecordValidationError::ZeroChainId));

        let mut record = valid_record();
        record.block_timestamp = 0;
        assert_eq!(record.validate(), Err(RecordValidationError::ZeroTimestamp));

        let mut record = valid_record();
        record.merkle_root = [0u8; 32];
        assert_eq!(
            record.validate(),
            Err(RecordValidationError::ZeroDigest("merkle root"))
        );

        let mut record = valid_record();
        record.state_root = [0u8; 32];
        assert_eq!(
            record.validate(),
            Err(RecordValidationError::ZeroDigest("state root"))
        );
    }

    #[test]
    fn test_wire_roundtrip() {
        let record = valid_record();
        let json = serde_json::to_vec(&record).unwrap();
        let parsed = ProofRecord::from_wire(&json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_wire_parse_camel_case() {
        let json = br#"{
            "chainId": 137,
            "blockNumber": 19000000,
            "blockTimestamp": 1719000000,
            "merkleRoot": "0x0101010101010101010101010101010101010101010101010101010101010101",
            "blockHash": "0202020202020202020202020202020202020202020202020202020202020202",
            "stateRoot": "0x0303030303030303030303030303030303030303030303030303030303030303"
        }"#;
        let record = ProofRecord::from_wire(json).unwrap();
        assert_eq!(record.chain_id, ChainId::new(137));
        assert_eq!(record.block_number, 19_000_000);
        assert_eq!(record.block_hash, [2u8; 32]);
        assert!(record.transaction_hashes.is_empty());
    }

    #[test]
    fn test_wire_parse_garbage_rejected() {
        let err = ProofRecord::from_wire(b"not json").unwrap_err();
        assert!(matches!(err, RecordValidationError::Malformed(_)));

        let err = ProofRecord::from_wire(br#"{"chainId": 1}"#).unwrap_err();
        assert!(matches!(err, RecordValidationError::Malformed(_)));
    }

    #[test]
    fn test_parse_digest_lengths() {
        assert!(parse_digest("0xdead").is_err());
        assert!(parse_digest("zz").is_err());
        let ok = parse_digest(&format!("0x{}", hex::encode([7u8; 32]))).unwrap();
        assert_eq!(ok, [7u8; 32]);
    }

    #[test]
    fn test_dedupe_key_partitioned_by_chain() {
        let record = valid_record();
        assert_eq!(record.dedupe_key(), "proof:1:42");
        assert_ne!(
            dedupe_key(ChainId::new(1), 7),
            dedupe_key(ChainId::new(2), 7)
        );
    }
}
