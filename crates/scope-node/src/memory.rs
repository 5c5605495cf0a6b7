//! In-memory [`BlockStore`] for tests and ephemeral runs.
//!
//! Keeps full blocks in a height-ordered map behind a `RwLock`. Same
//! observable ordering as [`RocksStore`](crate::storage::RocksStore).

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use scope_core::error::DatabaseError;
use scope_core::pagination::Pagination;
use scope_core::traits::BlockStore;
use scope_core::types::{Block, Transaction};

#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: RwLock<BTreeMap<u64, Block>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blocks.
    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }

    fn find_by_hash<R>(&self, hash: &str, f: impl FnOnce(&Block) -> R) -> Result<R, DatabaseError> {
        let blocks = self.blocks.read();
        blocks
            .values()
            .find(|b| b.hash == hash)
            .map(f)
            .ok_or_else(|| DatabaseError::NotFound(format!("block {hash}")))
    }

    fn page(block: &Block, pagination: &Pagination) -> (Vec<Transaction>, u64) {
        (pagination.slice(&block.txs).to_vec(), block.txs.len() as u64)
    }
}

#[async_trait]
impl BlockStore for MemoryStore {
    async fn block_by_height(&self, height: u64) -> Result<Block, DatabaseError> {
        self.blocks
            .read()
            .get(&height)
            .cloned()
            .ok_or_else(|| DatabaseError::NotFound(format!("block {height}")))
    }

    async fn block_by_hash(&self, hash: &str) -> Result<Block, DatabaseError> {
        self.find_by_hash(hash, Block::clone)
    }

    async fn blocks(&self, pagination: &Pagination) -> Result<Vec<Block>, DatabaseError> {
        Ok(self
            .blocks
            .read()
            .values()
            .rev()
            .skip(pagination.skip() as usize)
            .take(pagination.limit() as usize)
            .map(Block::summary)
            .collect())
    }

    async fn txs_by_block_hash(
        &self,
        hash: &str,
        pagination: &Pagination,
    ) -> Result<(Vec<Transaction>, u64), DatabaseError> {
        self.find_by_hash(hash, |b| Self::page(b, pagination))
    }

    async fn txs_by_block_height(
        &self,
        height: u64,
        pagination: &Pagination,
    ) -> Result<(Vec<Transaction>, u64), DatabaseError> {
        self.blocks
            .read()
            .get(&height)
            .map(|b| Self::page(b, pagination))
            .ok_or_else(|| DatabaseError::NotFound(format!("block {height}")))
    }

    async fn txs_by_address(
        &self,
        address: &str,
        pagination: &Pagination,
    ) -> Result<(Vec<Transaction>, u64), DatabaseError> {
        let blocks = self.blocks.read();
        let matching: Vec<&Transaction> = blocks
            .values()
            .rev()
            .flat_map(|b| b.txs.iter().rev())
            .filter(|tx| tx.involves(address))
            .collect();
        let total = matching.len() as u64;
        let page = pagination.slice(&matching).iter().map(|tx| (*tx).clone()).collect();
        Ok((page, total))
    }

    async fn latest_txs(&self, pagination: &Pagination) -> Result<Vec<Transaction>, DatabaseError> {
        Ok(self
            .blocks
            .read()
            .values()
            .rev()
            .flat_map(|b| b.txs.iter())
            .skip(pagination.skip() as usize)
            .take(pagination.limit() as usize)
            .cloned()
            .collect())
    }

    async fn tx_by_hash(&self, hash: &str) -> Result<Transaction, DatabaseError> {
        self.blocks
            .read()
            .values()
            .flat_map(|b| b.txs.iter())
            .find(|tx| tx.hash == hash)
            .cloned()
            .ok_or_else(|| DatabaseError::NotFound(format!("transaction {hash}")))
    }

    async fn insert_block(&self, block: &Block) -> Result<(), DatabaseError> {
        let mut blocks = self.blocks.write();
        if blocks.contains_key(&block.height) {
            return Err(DatabaseError::Storage(format!(
                "block {} already stored",
                block.height
            )));
        }
        blocks.insert(block.height, stored(block));
        Ok(())
    }

    async fn upsert_block(&self, block: &Block) -> Result<(), DatabaseError> {
        self.blocks.write().insert(block.height, stored(block));
        Ok(())
    }

    async fn latest_height(&self) -> Result<Option<u64>, DatabaseError> {
        Ok(self.blocks.read().keys().next_back().copied())
    }

    async fn total_txs(&self) -> Result<u64, DatabaseError> {
        Ok(self.blocks.read().values().map(|b| b.txs.len() as u64).sum())
    }
}

/// The stored form of a block: receipts dropped, count matching the bodies.
fn stored(block: &Block) -> Block {
    Block {
        receipts: Vec::new(),
        tx_count: block.tx_count.max(block.txs.len() as u64),
        ..block.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(height: u64, txs: &[(&str, &str, &str)]) -> Block {
        Block {
            height,
            hash: format!("0x{height:02x}"),
            tx_count: txs.len() as u64,
            txs: txs
                .iter()
                .enumerate()
                .map(|(i, (hash, from, to))| Transaction {
                    hash: hash.to_string(),
                    from: from.to_string(),
                    to: to.to_string(),
                    block_number: height,
                    transaction_index: i as u64,
                    ..Transaction::default()
                })
                .collect(),
            ..Block::default()
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_height_but_upsert_replaces() {
        let store = MemoryStore::new();
        store.insert_block(&block(1, &[])).await.unwrap();
        assert!(store.insert_block(&block(1, &[])).await.is_err());

        store.upsert_block(&block(1, &[("0xt", "0xa", "0xb")])).await.unwrap();
        assert_eq!(store.total_txs().await.unwrap(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn blocks_newest_first_without_bodies() {
        let store = MemoryStore::new();
        for h in 1..=3 {
            store.insert_block(&block(h, &[("x", "", "")])).await.unwrap();
        }
        let page = store.blocks(&Pagination::new(1, 2)).await.unwrap();
        assert_eq!(page.iter().map(|b| b.height).collect::<Vec<_>>(), vec![3, 2]);
        assert!(page[0].txs.is_empty());
        assert_eq!(store.latest_height().await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn txs_by_address_newest_first() {
        let store = MemoryStore::new();
        store
            .insert_block(&block(1, &[("0x1a", "0xAA", "0xbb"), ("0x1b", "0xcc", "0xdd")]))
            .await
            .unwrap();
        store
            .insert_block(&block(2, &[("0x2a", "0xbb", "0xaa")]))
            .await
            .unwrap();

        let (txs, total) = store
            .txs_by_address("0xaa", &Pagination::default())
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(
            txs.iter().map(|t| t.hash.as_str()).collect::<Vec<_>>(),
            vec!["0x2a", "0x1a"]
        );
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.block_by_hash("0xnope").await,
            Err(DatabaseError::NotFound(_))
        ));
        assert!(matches!(
            store.txs_by_block_height(4, &Pagination::default()).await,
            Err(DatabaseError::NotFound(_))
        ));
        assert_eq!(store.latest_height().await.unwrap(), None);
    }
}
