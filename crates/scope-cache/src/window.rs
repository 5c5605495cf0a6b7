//! Fixed-capacity, most-recent-first window of block summaries.
//!
//! The window provides:
//! - O(1) prepend of the newest block and O(1) eviction of the oldest
//! - O(1) lookup by hash or height via [`BlockIndex`]
//! - paged reads over blocks and over the flattened transaction stream
//!
//! Each entry holds the block summary as a bincode record (transactions and
//! receipts stripped) plus the block's transactions once the producer has
//! supplied them. Eviction is insert-triggered only.

use std::collections::VecDeque;

use scope_core::error::CacheError;
use scope_core::pagination::Pagination;
use scope_core::types::{Block, Transaction};

use crate::index::{BlockIndex, Slot, TxKey};

/// Default number of blocks kept in the window.
pub const DEFAULT_CAPACITY: usize = 1_000;

#[derive(Debug)]
struct Entry {
    slot: Slot,
    /// Bincode-encoded block summary.
    record: Vec<u8>,
    txs: Vec<Transaction>,
}

fn encode_record(block: &Block) -> Result<Vec<u8>, CacheError> {
    bincode::encode_to_vec(block, bincode::config::standard())
        .map_err(|e| CacheError::Store(e.to_string()))
}

fn decode_record(record: &[u8]) -> Result<Block, CacheError> {
    let (block, _): (Block, _) = bincode::decode_from_slice(record, bincode::config::standard())
        .map_err(|e| CacheError::Store(e.to_string()))?;
    Ok(block)
}

/// Bounded block window with its secondary index.
///
/// Position 0 is the newest entry. Not thread-safe; [`ChainCache`](crate::ChainCache)
/// wraps it in a lock.
#[derive(Debug)]
pub struct BlockWindow {
    entries: VecDeque<Entry>,
    index: BlockIndex,
    capacity: usize,
    /// Slot assigned to the next inserted block.
    next_slot: Slot,
    /// Transactions held across all entries.
    tx_total: u64,
}

impl BlockWindow {
    /// Create an empty window holding at most `capacity` blocks.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            index: BlockIndex::new(),
            capacity,
            next_slot: 0,
            tx_total: 0,
        }
    }

    /// Insert a block as the newest entry, evicting the oldest when full.
    ///
    /// Key collisions with surviving entries are detected before anything is
    /// evicted, so a failed insert leaves the window unchanged.
    pub fn insert_block(&mut self, block: &Block) -> Result<Slot, CacheError> {
        if self.capacity == 0 {
            return Err(CacheError::Store("block window capacity must be positive".into()));
        }

        let slot = self.next_slot;
        let evicting = if self.entries.len() >= self.capacity {
            self.entries.back().map(|e| e.slot)
        } else {
            None
        };
        self.index.check_block(&block.hash, block.height, slot, evicting)?;
        let record = encode_record(&block.summary())?;

        if evicting.is_some() {
            self.evict_oldest();
        }

        self.entries.push_front(Entry {
            slot,
            record,
            txs: Vec::new(),
        });
        self.next_slot += 1;
        self.index.record_block(&block.hash, block.height, slot)?;

        tracing::debug!(
            height = block.height,
            hash = %block.hash,
            slot,
            size = self.entries.len(),
            "inserted block into window"
        );
        Ok(slot)
    }

    /// Drop the oldest entry and its index keys.
    ///
    /// The keys to drop are read from the evicted entry's own record.
    fn evict_oldest(&mut self) {
        let Some(oldest) = self.entries.pop_back() else {
            return;
        };
        match decode_record(&oldest.record) {
            Ok(block) => {
                self.index.drop_block(&block.hash, block.height);
                tracing::debug!(height = block.height, hash = %block.hash, "evicted block");
            }
            Err(e) => {
                tracing::warn!(slot = oldest.slot, error = %e, "evicted undecodable record, purging by slot");
                self.index.purge_slot(oldest.slot);
            }
        }
        self.tx_total -= oldest.txs.len() as u64;
    }

    /// Overwrite the entry at `block.height` with `block` and its
    /// transactions. The entry keeps its slot, so no other position moves.
    ///
    /// The old hash and transaction keys are dropped. A new hash already
    /// owned by another entry is rejected before anything changes.
    pub fn replace_block(&mut self, block: &Block) -> Result<Slot, CacheError> {
        let slot = self.index.by_height(block.height)?;
        let position = self.position(slot)?;
        self.index.check_block(&block.hash, block.height, slot, None)?;
        let record = encode_record(&block.summary())?;

        match decode_record(&self.entries[position].record) {
            Ok(old) => self.index.drop_block(&old.hash, old.height),
            Err(_) => self.index.purge_slot(slot),
        }
        self.index.record_block(&block.hash, block.height, slot)?;

        let entry = &mut self.entries[position];
        entry.record = record;
        self.tx_total -= entry.txs.len() as u64;
        entry.txs = block.txs.clone();
        self.tx_total += entry.txs.len() as u64;
        self.index.record_transactions(block.height, &block.txs);

        tracing::debug!(height = block.height, hash = %block.hash, slot, "replaced windowed block");
        Ok(slot)
    }

    /// Attach the transactions of a block already in the window.
    ///
    /// A block with `tx_count == 0` is accepted without lookup.
    pub fn insert_transactions_of_block(&mut self, block: &Block) -> Result<(), CacheError> {
        if block.tx_count == 0 {
            return Ok(());
        }
        let slot = self.index.by_height(block.height)?;
        let position = self.position(slot)?;
        let entry = &mut self.entries[position];

        self.tx_total -= entry.txs.len() as u64;
        entry.txs = block.txs.clone();
        self.tx_total += entry.txs.len() as u64;
        self.index.record_transactions(block.height, &block.txs);
        Ok(())
    }

    /// Position (0 = newest) of a live slot.
    fn position(&self, slot: Slot) -> Result<usize, CacheError> {
        let newest = self
            .entries
            .front()
            .map(|e| e.slot)
            .ok_or(CacheError::Empty("block window"))?;
        let position = newest
            .checked_sub(slot)
            .and_then(|p| usize::try_from(p).ok())
            .filter(|p| *p < self.entries.len())
            .ok_or_else(|| CacheError::NotFound(format!("slot {slot} left the window")))?;
        Ok(position)
    }

    /// Position of the block with the given hash.
    pub fn position_by_hash(&self, hash: &str) -> Result<usize, CacheError> {
        self.position(self.index.by_hash(hash)?)
    }

    /// Position of the block at the given height.
    pub fn position_by_height(&self, height: u64) -> Result<usize, CacheError> {
        self.position(self.index.by_height(height)?)
    }

    fn entry_for(&self, slot: Result<Slot, CacheError>) -> Result<&Entry, CacheError> {
        if self.entries.is_empty() {
            return Err(CacheError::NotFound("block window is empty".into()));
        }
        let position = self.position(slot?)?;
        Ok(&self.entries[position])
    }

    fn summary_of(entry: &Entry) -> Result<Block, CacheError> {
        decode_record(&entry.record)
            .map_err(|e| CacheError::NotFound(format!("undecodable block record: {e}")))
    }

    /// Block summary by hash.
    pub fn block_by_hash(&self, hash: &str) -> Result<Block, CacheError> {
        Self::summary_of(self.entry_for(self.index.by_hash(hash))?)
    }

    /// Block summary by height.
    pub fn block_by_height(&self, height: u64) -> Result<Block, CacheError> {
        Self::summary_of(self.entry_for(self.index.by_height(height))?)
    }

    /// A page of a block's transactions plus the block's transaction count.
    /// A skip past the end yields an empty page.
    pub fn txs_by_block_height(
        &self,
        height: u64,
        pagination: &Pagination,
    ) -> Result<(Vec<Transaction>, u64), CacheError> {
        let entry = self.entry_for(self.index.by_height(height))?;
        Ok((pagination.slice(&entry.txs).to_vec(), entry.txs.len() as u64))
    }

    /// A page of a block's transactions plus the block's transaction count.
    pub fn txs_by_block_hash(
        &self,
        hash: &str,
        pagination: &Pagination,
    ) -> Result<(Vec<Transaction>, u64), CacheError> {
        let entry = self.entry_for(self.index.by_hash(hash))?;
        Ok((pagination.slice(&entry.txs).to_vec(), entry.txs.len() as u64))
    }

    /// A windowed transaction by hash.
    pub fn tx_by_hash(&self, hash: &str) -> Result<Transaction, CacheError> {
        let missing = || CacheError::NotFound(format!("transaction {hash}"));
        let height = self.index.tx_height(hash).ok_or_else(missing)?;
        let entry = self.entry_for(self.index.by_height(height))?;
        let position = self
            .index
            .tx_position(height, &TxKey::Hash(hash.to_string()))
            .ok_or_else(missing)?;
        entry.txs.get(position).cloned().ok_or_else(missing)
    }

    /// A windowed transaction by its block height and sender nonce.
    pub fn tx_by_nonce(&self, height: u64, nonce: u64) -> Result<Transaction, CacheError> {
        let missing = || CacheError::NotFound(format!("transaction nonce {nonce} in block {height}"));
        let entry = self.entry_for(self.index.by_height(height))?;
        let position = self
            .index
            .tx_position(height, &TxKey::Nonce(nonce))
            .ok_or_else(missing)?;
        entry.txs.get(position).cloned().ok_or_else(missing)
    }

    /// A page of block summaries, newest first. Out-of-range pages come back
    /// short or empty rather than as errors.
    pub fn latest_blocks(&self, pagination: &Pagination) -> Result<Vec<Block>, CacheError> {
        let skip = usize::try_from(pagination.skip()).unwrap_or(usize::MAX);
        let limit = usize::try_from(pagination.limit()).unwrap_or(usize::MAX);
        self.entries
            .iter()
            .skip(skip)
            .take(limit)
            .map(|entry| decode_record(&entry.record))
            .collect()
    }

    /// A page of the most recent transactions: newest block first, ascending
    /// transaction index within a block.
    ///
    /// Unlike [`latest_blocks`](Self::latest_blocks), a page that does not
    /// fit entirely inside the available transactions is an error.
    pub fn latest_transactions(&self, pagination: &Pagination) -> Result<Vec<Transaction>, CacheError> {
        let available = self.tx_total;
        if available == 0 {
            return Err(CacheError::Empty("windowed transactions"));
        }
        if pagination.skip() >= available || pagination.end() > available {
            return Err(CacheError::OutOfRange {
                skip: pagination.skip(),
                limit: pagination.limit(),
                available,
            });
        }
        Ok(self
            .entries
            .iter()
            .flat_map(|entry| entry.txs.iter())
            .skip(usize::try_from(pagination.skip()).unwrap_or(usize::MAX))
            .take(usize::try_from(pagination.limit()).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    /// Number of blocks in the window; [`CacheError::Empty`] when zero.
    pub fn block_size(&self) -> Result<usize, CacheError> {
        match self.entries.len() {
            0 => Err(CacheError::Empty("block window")),
            n => Ok(n),
        }
    }

    /// Height of the newest block.
    pub fn latest_block_height(&self) -> Result<u64, CacheError> {
        let newest = self.entries.front().ok_or(CacheError::Empty("block window"))?;
        Ok(decode_record(&newest.record)?.height)
    }

    /// Transactions held across the window.
    pub fn total_txs(&self) -> u64 {
        self.tx_total
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Read-only view of the index.
    pub fn index(&self) -> &BlockIndex {
        &self.index
    }

    #[cfg(test)]
    fn corrupt(&mut self, position: usize) {
        self.entries[position].record = vec![0xff; 3];
    }
}
