//! Deduplication cache layer.
//!
//! Redis answers the fast path; the on-chain registry stays authoritative.
//! A cache hit is trusted as "already committed". A cache miss falls through
//! to the registry's existence check and backfills the cache on a positive
//! answer, so redelivered records for finalized blocks stay cheap. Entries
//! carry a bounded TTL; expiry caps cache growth, it is not invalidation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::{dedupe_key, ChainId};

use super::traits::{DedupStore, LedgerClient};
use super::Result;

/// Default time-to-live for committed-proof markers.
pub const DEFAULT_DEDUPE_TTL: Duration = Duration::from_secs(3600);

/// Redis-backed [`DedupStore`] over a multiplexed connection manager.
pub struct RedisDedupStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisDedupStore {
    /// Connect to Redis and establish the managed connection.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl DedupStore for RedisDedupStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let found: bool = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(found)
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// The dedup policy over a [`DedupStore`] fast path and a [`LedgerClient`]
/// authoritative fallback.
pub struct DedupChecker {
    store: Arc<dyn DedupStore>,
    ledger: Arc<dyn LedgerClient>,
    ttl: Duration,
}

impl DedupChecker {
    pub fn new(store: Arc<dyn DedupStore>, ledger: Arc<dyn LedgerClient>, ttl: Duration) -> Self {
        Self { store, ledger, ttl }
    }

    /// Whether a (chain, block) pair has already been committed.
    ///
    /// Any failure reaching the registry during the fallback check is
    /// conservatively treated as non-existence: the record proceeds to
    /// submission and the contract's uniqueness constraint is the final
    /// backstop against double-storage.
    pub async fn is_committed(&self, chain_id: ChainId, block_number: u64) -> bool {
        let key = dedupe_key(chain_id, block_number);

        match self.store.exists(&key).await {
            Ok(true) => {
                debug!(%chain_id, block_number, "Dedup cache hit");
                return true;
            }
            Ok(false) => {}
            Err(error) => {
                warn!(%chain_id, block_number, %error, "Dedup cache unreachable, falling back to ledger");
            }
        }

        match self.ledger.has_proof(block_number).await {
            Ok(true) => {
                // Backfill so the next redelivery short-circuits on the
                // fast path. A failed write only costs a future ledger read.
                if let Err(error) = self
                    .store
                    .set_with_expiry(&key, "1", self.ttl.as_secs())
                    .await
                {
                    warn!(%chain_id, block_number, %error, "Failed to backfill dedup cache");
                }
                true
            }
            Ok(false) => false,
            Err(error) => {
                warn!(%chain_id, block_number, %error, "Ledger existence check failed, assuming not committed");
                false
            }
        }
    }

    /// Record a successful commitment in the cache.
    pub async fn mark_committed(&self, chain_id: ChainId, block_number: u64) -> Result<()> {
        let key = dedupe_key(chain_id, block_number);
        self.store.set_with_expiry(&key, "1", self.ttl.as_secs()).await
    }
}
