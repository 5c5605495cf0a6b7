//! Read-side service behind the HTTP API.
//!
//! [`Explorer`] answers every read by walking the window → database → node
//! RPC tiers through a [`FallbackPath`]. Each request gets a child of the
//! service's shutdown token, so in-flight lookups stop when the process
//! shuts down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use scope_cache::ChainCache;
use scope_core::error::{CacheError, ScopeError};
use scope_core::pagination::Pagination;
use scope_core::traits::{BlockStore, NodeClient};
use scope_core::types::{Block, Transaction};

use crate::fallback::{FallbackPath, Tier};

/// A block reference as given by a caller: `0x`-prefixed hash or decimal
/// height.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockId {
    Hash(String),
    Height(u64),
}

impl BlockId {
    /// Parse a path segment. Heights must be positive decimal integers.
    pub fn parse(raw: &str) -> Result<Self, ScopeError> {
        if raw.starts_with("0x") {
            return Ok(BlockId::Hash(raw.to_string()));
        }
        match raw.parse::<u64>() {
            Ok(height) if height > 0 => Ok(BlockId::Height(height)),
            _ => Err(ScopeError::InvalidInput(format!("block id {raw:?}"))),
        }
    }
}

/// Tier-walking read service shared by all request handlers.
pub struct Explorer {
    cache: Arc<ChainCache>,
    store: Arc<dyn BlockStore>,
    node: Arc<dyn NodeClient>,
    tier_timeout: Duration,
    shutdown: CancellationToken,
}

impl Explorer {
    pub fn new(
        cache: Arc<ChainCache>,
        store: Arc<dyn BlockStore>,
        node: Arc<dyn NodeClient>,
        tier_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            cache,
            store,
            node,
            tier_timeout,
            shutdown,
        }
    }

    pub fn cache(&self) -> &Arc<ChainCache> {
        &self.cache
    }

    fn path(&self) -> FallbackPath {
        FallbackPath::new(self.tier_timeout, self.shutdown.child_token())
    }

    // --- Blocks ---

    pub async fn block(&self, id: &BlockId) -> Result<Block, ScopeError> {
        match id {
            BlockId::Hash(hash) => self.block_by_hash(hash).await,
            BlockId::Height(height) => self.block_by_height(*height).await,
        }
    }

    pub async fn block_by_hash(&self, hash: &str) -> Result<Block, ScopeError> {
        let tiers = vec![
            Tier::local("window", async { Ok::<_, ScopeError>(self.cache.block_by_hash(hash)?) }),
            Tier::remote("database", async { Ok::<_, ScopeError>(self.store.block_by_hash(hash).await?.summary()) }),
            Tier::remote("rpc", async { Ok::<_, ScopeError>(self.node.block_by_hash(hash).await?.summary()) }),
        ];
        self.path().resolve("block_by_hash", tiers).await
    }

    pub async fn block_by_height(&self, height: u64) -> Result<Block, ScopeError> {
        let tiers = vec![
            Tier::local("window", async { Ok::<_, ScopeError>(self.cache.block_by_height(height)?) }),
            Tier::remote("database", async {
                Ok::<_, ScopeError>(self.store.block_by_height(height).await?.summary())
            }),
            Tier::remote("rpc", async { Ok::<_, ScopeError>(self.node.block_by_height(height).await?.summary()) }),
        ];
        self.path().resolve("block_by_height", tiers).await
    }

    /// A page of block summaries, newest first, plus the chain height used as
    /// the list total.
    pub async fn latest_blocks(&self, pagination: &Pagination) -> Result<(Vec<Block>, u64), ScopeError> {
        let tiers = vec![
            Tier::local("window", async {
                let blocks = self.cache.latest_blocks(pagination)?;
                if blocks.is_empty() {
                    return Err(CacheError::NotFound("latest blocks page".into()).into());
                }
                Ok::<_, ScopeError>(blocks)
            }),
            Tier::remote("database", async { Ok::<_, ScopeError>(self.store.blocks(pagination).await?) }),
        ];
        let blocks = self.path().resolve("latest_blocks", tiers).await?;
        Ok((blocks, self.latest_height().await))
    }

    /// Height of the newest known block, 0 when nothing is known.
    pub async fn latest_height(&self) -> u64 {
        if let Ok(height) = self.cache.latest_block_height() {
            return height;
        }
        let tiers = vec![Tier::remote("database", async {
            self.store
                .latest_height()
                .await?
                .ok_or_else(|| ScopeError::from(CacheError::Empty("stored blocks")))
        })];
        self.path()
            .resolve("latest_height", tiers)
            .await
            .unwrap_or_default()
    }

    // --- Block transactions ---

    pub async fn block_txs(
        &self,
        id: &BlockId,
        pagination: &Pagination,
    ) -> Result<(Vec<Transaction>, u64), ScopeError> {
        match id {
            BlockId::Hash(hash) => self.block_txs_by_hash(hash, pagination).await,
            BlockId::Height(height) => self.block_txs_by_height(*height, pagination).await,
        }
    }

    pub async fn block_txs_by_hash(
        &self,
        hash: &str,
        pagination: &Pagination,
    ) -> Result<(Vec<Transaction>, u64), ScopeError> {
        let tiers = vec![
            Tier::local("window", async { Ok::<_, ScopeError>(self.cache.txs_by_block_hash(hash, pagination)?) }),
            Tier::remote("database", async {
                Ok::<_, ScopeError>(self.store.txs_by_block_hash(hash, pagination).await?)
            }),
            Tier::remote("rpc", async {
                let block = self.node.block_by_hash(hash).await?;
                Ok::<_, ScopeError>(page_of_block(block, pagination))
            }),
        ];
        self.path().resolve("block_txs_by_hash", tiers).await
    }

    pub async fn block_txs_by_height(
        &self,
        height: u64,
        pagination: &Pagination,
    ) -> Result<(Vec<Transaction>, u64), ScopeError> {
        let tiers = vec![
            Tier::local("window", async { Ok::<_, ScopeError>(self.cache.txs_by_block_height(height, pagination)?) }),
            Tier::remote("database", async {
                Ok::<_, ScopeError>(self.store.txs_by_block_height(height, pagination).await?)
            }),
            Tier::remote("rpc", async {
                let block = self.node.block_by_height(height).await?;
                Ok::<_, ScopeError>(page_of_block(block, pagination))
            }),
        ];
        self.path().resolve("block_txs_by_height", tiers).await
    }

    // --- Transactions ---

    /// A page of the most recent transactions plus the stored transaction
    /// total.
    pub async fn latest_txs(&self, pagination: &Pagination) -> Result<(Vec<Transaction>, u64), ScopeError> {
        let tiers = vec![
            Tier::local("window", async { Ok::<_, ScopeError>(self.cache.latest_transactions(pagination)?) }),
            Tier::remote("database", async { Ok::<_, ScopeError>(self.store.latest_txs(pagination).await?) }),
        ];
        let txs = self.path().resolve("latest_txs", tiers).await?;
        Ok((txs, self.total_txs().await))
    }

    async fn total_txs(&self) -> u64 {
        let windowed = self.cache.total_txs();
        let tiers = vec![Tier::remote("database", async { Ok::<_, ScopeError>(self.store.total_txs().await?) })];
        match self.path().resolve("total_txs", tiers).await {
            Ok(stored) => stored.max(windowed),
            Err(e) => {
                debug!(error = %e, "stored transaction total unavailable");
                windowed
            }
        }
    }

    /// A transaction by hash. The RPC tier merges the receipt when the node
    /// has one.
    pub async fn tx_by_hash(&self, hash: &str) -> Result<Transaction, ScopeError> {
        let tiers = vec![
            Tier::local("window", async { Ok::<_, ScopeError>(self.cache.tx_by_hash(hash)?) }),
            Tier::remote("database", async { Ok::<_, ScopeError>(self.store.tx_by_hash(hash).await?) }),
            Tier::remote("rpc", async {
                let mut tx = self.node.transaction(hash).await?;
                match self.node.transaction_receipt(hash).await {
                    Ok(receipt) => tx.apply_receipt(&receipt),
                    Err(e) => warn!(tx = hash, error = %e, "receipt unavailable"),
                }
                Ok::<_, ScopeError>(tx)
            }),
        ];
        self.path().resolve("tx_by_hash", tiers).await
    }

    /// Transactions sent from or to `address`. Served from the database only.
    pub async fn txs_by_address(
        &self,
        address: &str,
        pagination: &Pagination,
    ) -> Result<(Vec<Transaction>, u64), ScopeError> {
        let tiers = vec![Tier::remote("database", async {
            Ok::<_, ScopeError>(self.store.txs_by_address(address, pagination).await?)
        })];
        self.path().resolve("txs_by_address", tiers).await
    }

    // --- Operations ---

    /// Heights whose import failed, in failure order.
    pub fn persistent_error_blocks(&self) -> Vec<u64> {
        self.cache.persistent_errors()
    }

    /// Validator address → display name. Empty when the node cannot be
    /// reached in time.
    pub async fn validator_names(&self) -> HashMap<String, String> {
        let tiers = vec![Tier::remote("rpc", async { Ok::<_, ScopeError>(self.node.validators().await?) })];
        match self.path().resolve("validators", tiers).await {
            Ok(validators) => validators
                .into_iter()
                .map(|v| (v.address.to_ascii_lowercase(), v.name))
                .collect(),
            Err(e) => {
                debug!(error = %e, "validator names unavailable");
                HashMap::new()
            }
        }
    }
}

/// Page the raw transactions of an RPC-fetched block. The total is the
/// block's transaction count.
fn page_of_block(block: Block, pagination: &Pagination) -> (Vec<Transaction>, u64) {
    let total = block.tx_count.max(block.txs.len() as u64);
    (pagination.slice(&block.txs).to_vec(), total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_id_parsing() {
        assert_eq!(BlockId::parse("0xabc").unwrap(), BlockId::Hash("0xabc".into()));
        assert_eq!(BlockId::parse("42").unwrap(), BlockId::Height(42));
        assert!(matches!(BlockId::parse("0"), Err(ScopeError::InvalidInput(_))));
        assert!(matches!(BlockId::parse("-3"), Err(ScopeError::InvalidInput(_))));
        assert!(matches!(BlockId::parse("tip"), Err(ScopeError::InvalidInput(_))));
    }

    #[test]
    fn rpc_page_is_clamped() {
        let block = Block {
            tx_count: 3,
            txs: (0..3)
                .map(|i| Transaction {
                    transaction_index: i,
                    ..Transaction::default()
                })
                .collect(),
            ..Block::default()
        };
        let (txs, total) = page_of_block(block.clone(), &Pagination::from_skip(2, 10));
        assert_eq!((txs.len(), total), (1, 3));
        let (txs, _) = page_of_block(block, &Pagination::from_skip(5, 10));
        assert!(txs.is_empty());
    }
}
