//! Trait interfaces for the backing tiers behind the block window.
//!
//! - [`BlockStore`]: the durable database (scope-node's `RocksStore` implements)
//! - [`NodeClient`]: the live chain node (scope-node's `RpcClient` implements)
//!
//! Both are consumed through `Arc<dyn ...>` handles built once at startup and
//! passed to the read path and the ingestion loop.

use async_trait::async_trait;

use crate::error::{DatabaseError, RpcError};
use crate::pagination::Pagination;
use crate::types::{Block, Receipt, Transaction, Validator};

/// Durable block and transaction storage.
///
/// Reads may lag behind ingestion; callers treat the store as eventually
/// consistent.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Full block at `height`.
    async fn block_by_height(&self, height: u64) -> Result<Block, DatabaseError>;

    /// Full block with the given hash.
    async fn block_by_hash(&self, hash: &str) -> Result<Block, DatabaseError>;

    /// Whether a block is stored at `height`.
    ///
    /// Default implementation delegates to [`block_by_height`](Self::block_by_height).
    async fn block_exists(&self, height: u64) -> Result<bool, DatabaseError> {
        match self.block_by_height(height).await {
            Ok(_) => Ok(true),
            Err(DatabaseError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Block summaries ordered by height, highest first.
    async fn blocks(&self, pagination: &Pagination) -> Result<Vec<Block>, DatabaseError>;

    /// A page of the transactions of a block, plus the block's total count.
    async fn txs_by_block_hash(
        &self,
        hash: &str,
        pagination: &Pagination,
    ) -> Result<(Vec<Transaction>, u64), DatabaseError>;

    /// A page of the transactions of a block, plus the block's total count.
    async fn txs_by_block_height(
        &self,
        height: u64,
        pagination: &Pagination,
    ) -> Result<(Vec<Transaction>, u64), DatabaseError>;

    /// Transactions sent from or to `address`, newest first, plus the total.
    async fn txs_by_address(
        &self,
        address: &str,
        pagination: &Pagination,
    ) -> Result<(Vec<Transaction>, u64), DatabaseError>;

    /// Most recent transactions, newest block first.
    async fn latest_txs(&self, pagination: &Pagination) -> Result<Vec<Transaction>, DatabaseError>;

    /// A single transaction by hash.
    async fn tx_by_hash(&self, hash: &str) -> Result<Transaction, DatabaseError>;

    /// Store a new block. Fails if a block already exists at its height.
    async fn insert_block(&self, block: &Block) -> Result<(), DatabaseError>;

    /// Store a block, replacing whatever was stored at its height.
    async fn upsert_block(&self, block: &Block) -> Result<(), DatabaseError>;

    /// Highest stored height, `None` when the store is empty.
    async fn latest_height(&self) -> Result<Option<u64>, DatabaseError>;

    /// Total number of stored transactions.
    async fn total_txs(&self) -> Result<u64, DatabaseError>;
}

/// A live chain node reachable over RPC. Higher latency than the other
/// tiers, used as the last resort.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Height of the node's latest block.
    async fn latest_block_number(&self) -> Result<u64, RpcError>;

    /// Full block (with transactions and receipts) by hash.
    async fn block_by_hash(&self, hash: &str) -> Result<Block, RpcError>;

    /// Full block (with transactions and receipts) by height.
    async fn block_by_height(&self, height: u64) -> Result<Block, RpcError>;

    /// A transaction by hash, without execution results.
    async fn transaction(&self, hash: &str) -> Result<Transaction, RpcError>;

    /// The receipt of a transaction.
    async fn transaction_receipt(&self, hash: &str) -> Result<Receipt, RpcError>;

    /// Current validator set.
    async fn validators(&self) -> Result<Vec<Validator>, RpcError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    // ------------------------------------------------------------------
    // Mock: BlockStore
    // ------------------------------------------------------------------

    struct MockStore {
        blocks: HashMap<u64, Block>,
    }

    #[async_trait]
    impl BlockStore for MockStore {
        async fn block_by_height(&self, height: u64) -> Result<Block, DatabaseError> {
            if height == 13 {
                return Err(DatabaseError::Storage("disk on fire".into()));
            }
            self.blocks
                .get(&height)
                .cloned()
                .ok_or_else(|| DatabaseError::NotFound(format!("block {height}")))
        }
        async fn block_by_hash(&self, hash: &str) -> Result<Block, DatabaseError> {
            Err(DatabaseError::NotFound(hash.to_string()))
        }
        async fn blocks(&self, _: &Pagination) -> Result<Vec<Block>, DatabaseError> {
            Ok(Vec::new())
        }
        async fn txs_by_block_hash(
            &self,
            _: &str,
            _: &Pagination,
        ) -> Result<(Vec<Transaction>, u64), DatabaseError> {
            Ok((Vec::new(), 0))
        }
        async fn txs_by_block_height(
            &self,
            _: u64,
            _: &Pagination,
        ) -> Result<(Vec<Transaction>, u64), DatabaseError> {
            Ok((Vec::new(), 0))
        }
        async fn txs_by_address(
            &self,
            _: &str,
            _: &Pagination,
        ) -> Result<(Vec<Transaction>, u64), DatabaseError> {
            Ok((Vec::new(), 0))
        }
        async fn latest_txs(&self, _: &Pagination) -> Result<Vec<Transaction>, DatabaseError> {
            Ok(Vec::new())
        }
        async fn tx_by_hash(&self, hash: &str) -> Result<Transaction, DatabaseError> {
            Err(DatabaseError::NotFound(hash.to_string()))
        }
        async fn insert_block(&self, _: &Block) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn upsert_block(&self, _: &Block) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn latest_height(&self) -> Result<Option<u64>, DatabaseError> {
            Ok(self.blocks.keys().max().copied())
        }
        async fn total_txs(&self) -> Result<u64, DatabaseError> {
            Ok(0)
        }
    }

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        // The mock never awaits anything, so a single poll completes it.
        let waker = std::task::Waker::noop();
        let mut cx = std::task::Context::from_waker(waker);
        let mut f = std::pin::pin!(f);
        match f.as_mut().poll(&mut cx) {
            std::task::Poll::Ready(v) => v,
            std::task::Poll::Pending => panic!("mock future pending"),
        }
    }

    #[test]
    fn block_exists_default_impl() {
        let mut blocks = HashMap::new();
        blocks.insert(1, Block { height: 1, ..Block::default() });
        let store = MockStore { blocks };

        assert!(block_on(store.block_exists(1)).unwrap());
        assert!(!block_on(store.block_exists(2)).unwrap());
        assert!(matches!(
            block_on(store.block_exists(13)),
            Err(DatabaseError::Storage(_))
        ));
    }
}
