//! Shared fixtures and tier doubles for integration tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use scope_core::error::{DatabaseError, RpcError};
use scope_core::pagination::Pagination;
use scope_core::traits::{BlockStore, NodeClient};
use scope_core::types::{Block, Receipt, Transaction, Validator};
use scope_node::MemoryStore;

/// Gas used by every fixture transaction.
pub const FIXTURE_GAS: u64 = 21_000;

/// Hash of the fixture block at `height`.
pub fn block_hash(height: u64) -> String {
    format!("0x{height:064x}")
}

/// Hash of the fixture transaction `index` in the block at `height`.
pub fn tx_hash(height: u64, index: u64) -> String {
    format!("0x{height:032x}{index:032x}")
}

/// Address of fixture validator `n`.
pub fn validator_address(n: u64) -> String {
    format!("0x{:040x}", 0xa0 + n)
}

/// Address of fixture account `n`.
pub fn account(n: u64) -> String {
    format!("0x{:040x}", n)
}

/// A block at `height` carrying `txs` transactions with matching receipts.
/// Transactions have no execution results applied; receipts carry them.
pub fn make_block(height: u64, txs: u64) -> Block {
    let hash = block_hash(height);
    let transactions: Vec<Transaction> = (0..txs)
        .map(|i| Transaction {
            hash: tx_hash(height, i),
            block_number: height,
            block_hash: hash.clone(),
            transaction_index: i,
            nonce: height * 1_000 + i,
            from: account(i % 5),
            to: account(10 + i % 3),
            value: "1000".into(),
            gas_price: 2,
            gas_limit: 50_000,
            time: 1_600_000_000 + height,
            ..Transaction::default()
        })
        .collect();
    let receipts = transactions
        .iter()
        .map(|tx| Receipt {
            transaction_hash: tx.hash.clone(),
            gas_used: FIXTURE_GAS,
            status: 1,
            ..Receipt::default()
        })
        .collect();
    Block {
        height,
        hash,
        parent_hash: block_hash(height.saturating_sub(1)),
        proposer_address: validator_address(height % 3),
        timestamp: 1_600_000_000 + height,
        gas_limit: 10_000_000,
        gas_used: FIXTURE_GAS * txs,
        rewards: "0".into(),
        tx_count: txs,
        txs: transactions,
        receipts,
    }
}

/// [`make_block`] with receipts already merged, as the grabber stores it.
pub fn imported_block(height: u64, txs: u64) -> Block {
    let mut block = make_block(height, txs);
    block.merge_receipts();
    block
}

/// Fixture validator set, one per proposer used by [`make_block`].
pub fn validators() -> Vec<Validator> {
    (0..3)
        .map(|n| Validator {
            address: validator_address(n),
            name: format!("validator-{n}"),
            role: 2,
            ..Validator::default()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// MockNode
// ---------------------------------------------------------------------------

/// Scriptable [`NodeClient`] with call counting, artificial latency, and an
/// outage switch.
#[derive(Default)]
pub struct MockNode {
    latest: AtomicU64,
    blocks: Mutex<BTreeMap<u64, Block>>,
    validators: Mutex<Vec<Validator>>,
    delay: Mutex<Option<Duration>>,
    down: AtomicBool,
    calls: AtomicUsize,
}

impl MockNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// A node holding [`make_block`] fixtures for `heights`, `txs` each, with
    /// the tip at the highest height and the fixture validators.
    pub fn with_chain(heights: std::ops::RangeInclusive<u64>, txs: u64) -> Self {
        let node = Self::new();
        for h in heights {
            node.add_block(make_block(h, txs));
        }
        *node.validators.lock() = validators();
        node
    }

    /// Add or replace a block. Moves the tip forward when the block is
    /// higher.
    pub fn add_block(&self, block: Block) {
        self.latest.fetch_max(block.height, Ordering::SeqCst);
        self.blocks.lock().insert(block.height, block);
    }

    pub fn set_latest(&self, height: u64) {
        self.latest.store(height, Ordering::SeqCst);
    }

    /// Delay every call by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Make every call fail with a transport error.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Number of calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<(), RpcError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.down.load(Ordering::SeqCst) {
            return Err(RpcError::Transport("connection refused".into()));
        }
        Ok(())
    }

    fn find<R>(&self, f: impl Fn(&Block) -> Option<R>) -> Option<R> {
        self.blocks.lock().values().find_map(f)
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn latest_block_number(&self) -> Result<u64, RpcError> {
        self.enter().await?;
        Ok(self.latest.load(Ordering::SeqCst))
    }

    async fn block_by_hash(&self, hash: &str) -> Result<Block, RpcError> {
        self.enter().await?;
        self.find(|b| (b.hash == hash).then(|| b.clone()))
            .ok_or_else(|| RpcError::NotFound(hash.to_string()))
    }

    async fn block_by_height(&self, height: u64) -> Result<Block, RpcError> {
        self.enter().await?;
        self.blocks
            .lock()
            .get(&height)
            .cloned()
            .ok_or_else(|| RpcError::NotFound(format!("block {height}")))
    }

    async fn transaction(&self, hash: &str) -> Result<Transaction, RpcError> {
        self.enter().await?;
        self.find(|b| b.txs.iter().find(|tx| tx.hash == hash).cloned())
            .ok_or_else(|| RpcError::NotFound(hash.to_string()))
    }

    async fn transaction_receipt(&self, hash: &str) -> Result<Receipt, RpcError> {
        self.enter().await?;
        self.find(|b| b.receipts.iter().find(|r| r.transaction_hash == hash).cloned())
            .ok_or_else(|| RpcError::NotFound(hash.to_string()))
    }

    async fn validators(&self) -> Result<Vec<Validator>, RpcError> {
        self.enter().await?;
        Ok(self.validators.lock().clone())
    }
}

// ---------------------------------------------------------------------------
// SlowStore
// ---------------------------------------------------------------------------

/// [`MemoryStore`] wrapper with call counting and artificial latency, for
/// deadline tests.
///
/// `set_delay` sleeps on the async clock; `set_stall` holds a blocking-pool
/// thread the way a disk-bound store does.
#[derive(Default)]
pub struct SlowStore {
    inner: MemoryStore,
    delay: Mutex<Option<Duration>>,
    stall: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl SlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn set_stall(&self, stall: Duration) {
        *self.stall.lock() = Some(stall);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let stall = *self.stall.lock();
        if let Some(stall) = stall {
            let _ = tokio::task::spawn_blocking(move || std::thread::sleep(stall)).await;
        }
    }
}

#[async_trait]
impl BlockStore for SlowStore {
    async fn block_by_height(&self, height: u64) -> Result<Block, DatabaseError> {
        self.enter().await;
        self.inner.block_by_height(height).await
    }

    async fn block_by_hash(&self, hash: &str) -> Result<Block, DatabaseError> {
        self.enter().await;
        self.inner.block_by_hash(hash).await
    }

    async fn blocks(&self, pagination: &Pagination) -> Result<Vec<Block>, DatabaseError> {
        self.enter().await;
        self.inner.blocks(pagination).await
    }

    async fn txs_by_block_hash(
        &self,
        hash: &str,
        pagination: &Pagination,
    ) -> Result<(Vec<Transaction>, u64), DatabaseError> {
        self.enter().await;
        self.inner.txs_by_block_hash(hash, pagination).await
    }

    async fn txs_by_block_height(
        &self,
        height: u64,
        pagination: &Pagination,
    ) -> Result<(Vec<Transaction>, u64), DatabaseError> {
        self.enter().await;
        self.inner.txs_by_block_height(height, pagination).await
    }

    async fn txs_by_address(
        &self,
        address: &str,
        pagination: &Pagination,
    ) -> Result<(Vec<Transaction>, u64), DatabaseError> {
        self.enter().await;
        self.inner.txs_by_address(address, pagination).await
    }

    async fn latest_txs(&self, pagination: &Pagination) -> Result<Vec<Transaction>, DatabaseError> {
        self.enter().await;
        self.inner.latest_txs(pagination).await
    }

    async fn tx_by_hash(&self, hash: &str) -> Result<Transaction, DatabaseError> {
        self.enter().await;
        self.inner.tx_by_hash(hash).await
    }

    async fn insert_block(&self, block: &Block) -> Result<(), DatabaseError> {
        self.inner.insert_block(block).await
    }

    async fn upsert_block(&self, block: &Block) -> Result<(), DatabaseError> {
        self.inner.upsert_block(block).await
    }

    async fn latest_height(&self) -> Result<Option<u64>, DatabaseError> {
        self.enter().await;
        self.inner.latest_height().await
    }

    async fn total_txs(&self) -> Result<u64, DatabaseError> {
        self.enter().await;
        self.inner.total_txs().await
    }
}
