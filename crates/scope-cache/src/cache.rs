//! Thread-safe facade over the block window and height queues.
//!
//! One writer (the ingestion loop) and many readers (HTTP handlers) share a
//! [`ChainCache`]. Every mutation runs under the write lock for its whole
//! duration, so readers never see an insert-and-evict sequence half done.

use parking_lot::RwLock;
use tracing::debug;

use scope_core::error::CacheError;
use scope_core::pagination::Pagination;
use scope_core::types::{Block, Transaction};

use crate::index::Slot;
use crate::queues::HeightQueues;
use crate::window::BlockWindow;

#[derive(Debug)]
struct CacheState {
    window: BlockWindow,
    queues: HeightQueues,
}

/// Shared in-memory tier: bounded window, index, and height queues behind
/// one lock.
#[derive(Debug)]
pub struct ChainCache {
    state: RwLock<CacheState>,
}

impl ChainCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: RwLock::new(CacheState {
                window: BlockWindow::new(capacity),
                queues: HeightQueues::new(),
            }),
        }
    }

    // --- Window writes ---

    pub fn insert_block(&self, block: &Block) -> Result<Slot, CacheError> {
        self.state.write().window.insert_block(block)
    }

    pub fn insert_transactions_of_block(&self, block: &Block) -> Result<(), CacheError> {
        self.state.write().window.insert_transactions_of_block(block)
    }

    /// Insert a block and attach its transactions under a single write lock.
    pub fn import_block(&self, block: &Block) -> Result<Slot, CacheError> {
        let mut state = self.state.write();
        let slot = state.window.insert_block(block)?;
        state.window.insert_transactions_of_block(block)?;
        debug!(height = block.height, txs = block.tx_count, "imported block into cache");
        Ok(slot)
    }

    /// Swap the windowed block at `block.height` for `block`, keeping its
    /// position. [`CacheError::NotFound`] when that height is not windowed.
    pub fn replace_block(&self, block: &Block) -> Result<Slot, CacheError> {
        self.state.write().window.replace_block(block)
    }

    // --- Window reads ---

    pub fn block_by_hash(&self, hash: &str) -> Result<Block, CacheError> {
        self.state.read().window.block_by_hash(hash)
    }

    pub fn block_by_height(&self, height: u64) -> Result<Block, CacheError> {
        self.state.read().window.block_by_height(height)
    }

    pub fn txs_by_block_hash(
        &self,
        hash: &str,
        pagination: &Pagination,
    ) -> Result<(Vec<Transaction>, u64), CacheError> {
        self.state.read().window.txs_by_block_hash(hash, pagination)
    }

    pub fn txs_by_block_height(
        &self,
        height: u64,
        pagination: &Pagination,
    ) -> Result<(Vec<Transaction>, u64), CacheError> {
        self.state.read().window.txs_by_block_height(height, pagination)
    }

    pub fn tx_by_hash(&self, hash: &str) -> Result<Transaction, CacheError> {
        self.state.read().window.tx_by_hash(hash)
    }

    pub fn tx_by_nonce(&self, height: u64, nonce: u64) -> Result<Transaction, CacheError> {
        self.state.read().window.tx_by_nonce(height, nonce)
    }

    pub fn latest_blocks(&self, pagination: &Pagination) -> Result<Vec<Block>, CacheError> {
        self.state.read().window.latest_blocks(pagination)
    }

    pub fn latest_transactions(&self, pagination: &Pagination) -> Result<Vec<Transaction>, CacheError> {
        self.state.read().window.latest_transactions(pagination)
    }

    /// Run several window reads against one consistent view. The writer
    /// is held off until `read` returns.
    pub fn with_window<R>(&self, read: impl FnOnce(&BlockWindow) -> R) -> R {
        read(&self.state.read().window)
    }

    pub fn position_by_height(&self, height: u64) -> Result<usize, CacheError> {
        self.state.read().window.position_by_height(height)
    }

    pub fn block_size(&self) -> Result<usize, CacheError> {
        self.state.read().window.block_size()
    }

    pub fn latest_block_height(&self) -> Result<u64, CacheError> {
        self.state.read().window.latest_block_height()
    }

    pub fn total_txs(&self) -> u64 {
        self.state.read().window.total_txs()
    }

    pub fn capacity(&self) -> usize {
        self.state.read().window.capacity()
    }

    /// Number of blocks currently windowed.
    pub fn len(&self) -> usize {
        self.state.read().window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().window.is_empty()
    }

    // --- Queues ---

    pub fn push_error_range(&self, start: u64, end: u64) -> u64 {
        let pushed = self.state.write().queues.push_error_range(start, end);
        if pushed > 0 {
            debug!(start, end, pushed, "queued error heights");
        }
        pushed
    }

    pub fn push_error_height(&self, height: u64) {
        self.state.write().queues.push_error_height(height);
        debug!(height, "queued error height");
    }

    pub fn pop_error_height(&self) -> Result<u64, CacheError> {
        self.state.write().queues.pop_error_height()
    }

    pub fn error_heights(&self) -> Vec<u64> {
        self.state.read().queues.error_heights()
    }

    pub fn push_unverified(&self, height: u64) {
        self.state.write().queues.push_unverified(height);
    }

    pub fn pop_unverified(&self) -> Result<u64, CacheError> {
        self.state.write().queues.pop_unverified()
    }

    pub fn push_persistent_error(&self, height: u64) {
        self.state.write().queues.push_persistent_error(height);
    }

    pub fn persistent_errors(&self) -> Vec<u64> {
        self.state.read().queues.persistent_errors()
    }
}

impl Default for ChainCache {
    fn default() -> Self {
        Self::new(crate::window::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(height: u64, txs: u64) -> Block {
        let hash = format!("0x{height:x}");
        Block {
            height,
            hash: hash.clone(),
            tx_count: txs,
            txs: (0..txs)
                .map(|i| Transaction {
                    hash: format!("{hash}-{i}"),
                    transaction_index: i,
                    nonce: i,
                    ..Transaction::default()
                })
                .collect(),
            ..Block::default()
        }
    }

    #[test]
    fn import_attaches_transactions() {
        let cache = ChainCache::new(4);
        cache.import_block(&block(1, 3)).unwrap();

        assert_eq!(cache.total_txs(), 3);
        let (txs, total) = cache
            .txs_by_block_height(1, &Pagination::from_skip(0, 10))
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(txs.len(), 3);
        assert_eq!(cache.tx_by_nonce(1, 2).unwrap().hash, "0x1-2");
    }

    #[test]
    fn import_rejects_duplicate_height() {
        let cache = ChainCache::new(4);
        cache.import_block(&block(1, 0)).unwrap();
        let dup = Block {
            hash: "0xother".into(),
            ..block(1, 0)
        };
        assert!(matches!(cache.import_block(&dup), Err(CacheError::Index(_))));
        assert_eq!(cache.block_size().unwrap(), 1);
    }

    #[test]
    fn replace_swaps_block_and_transaction_keys() {
        let cache = ChainCache::new(4);
        cache.import_block(&block(1, 1)).unwrap();
        cache.import_block(&block(2, 2)).unwrap();
        cache.import_block(&block(3, 0)).unwrap();

        let fork = Block {
            hash: "0xfork2".into(),
            tx_count: 1,
            txs: vec![Transaction {
                hash: "0xfork2-0".into(),
                ..Transaction::default()
            }],
            ..block(2, 0)
        };
        cache.replace_block(&fork).unwrap();

        assert_eq!(cache.block_by_height(2).unwrap().hash, "0xfork2");
        assert_eq!(cache.position_by_height(2).unwrap(), 1);
        assert!(cache.block_by_hash("0x2").is_err());
        assert!(cache.tx_by_hash("0x2-1").is_err());
        assert_eq!(cache.tx_by_hash("0xfork2-0").unwrap().hash, "0xfork2-0");
        assert_eq!(cache.total_txs(), 2);
        assert!(matches!(cache.replace_block(&block(9, 0)), Err(CacheError::NotFound(_))));
    }

    #[test]
    fn queues_through_facade() {
        let cache = ChainCache::default();
        assert_eq!(cache.push_error_range(5, 9), 3);
        assert_eq!(cache.error_heights(), vec![8, 7, 6]);
        assert_eq!(cache.pop_error_height().unwrap(), 8);

        cache.push_unverified(1);
        assert_eq!(cache.pop_unverified().unwrap(), 1);

        cache.push_persistent_error(7);
        assert_eq!(cache.persistent_errors(), vec![7]);
        assert_eq!(cache.capacity(), crate::window::DEFAULT_CAPACITY);
    }
}
