//! Secondary lookup keys for the block window.
//!
//! Blocks are keyed by hash and by height, both mapping to the block's
//! [`Slot`]: the insert sequence number the window assigned it. Slots never
//! change once assigned, so inserting a new block does not rewrite any index
//! entry; the window converts a slot to a position on lookup.
//!
//! Transactions are keyed per block height by nonce and by hash, mapping to
//! the transaction's position within its block. A global hash → height key
//! lets a transaction be found without knowing its block.

use std::collections::HashMap;

use scope_core::error::CacheError;
use scope_core::types::Transaction;

/// Insert sequence number of a window entry.
pub type Slot = u64;

/// Key of a transaction within one block.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TxKey {
    Nonce(u64),
    Hash(String),
}

/// Hash/height → slot maps plus per-block transaction keys.
///
/// Not thread-safe; the window that owns it is guarded by the cache lock.
#[derive(Debug, Default)]
pub struct BlockIndex {
    by_hash: HashMap<String, Slot>,
    by_height: HashMap<u64, Slot>,
    /// height → (nonce | hash) → position within the block.
    txs: HashMap<u64, HashMap<TxKey, usize>>,
    /// tx hash → height of its block.
    tx_heights: HashMap<String, u64>,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that recording `(hash, height) → slot` would not displace a
    /// key owned by another slot. Keys owned by `replacing` are treated as
    /// free, since that entry is about to be evicted.
    pub fn check_block(
        &self,
        hash: &str,
        height: u64,
        slot: Slot,
        replacing: Option<Slot>,
    ) -> Result<(), CacheError> {
        let free = |owner: Slot| owner == slot || Some(owner) == replacing;
        if let Some(&owner) = self.by_hash.get(hash) {
            if !free(owner) {
                return Err(CacheError::Index(format!(
                    "hash {hash} already indexed at slot {owner}"
                )));
            }
        }
        if let Some(&owner) = self.by_height.get(&height) {
            if !free(owner) {
                return Err(CacheError::Index(format!(
                    "height {height} already indexed at slot {owner}"
                )));
            }
        }
        Ok(())
    }

    /// Record both block keys. Re-recording identical values is a no-op;
    /// a key that maps to a different slot is an [`CacheError::Index`] and
    /// leaves the index untouched.
    pub fn record_block(&mut self, hash: &str, height: u64, slot: Slot) -> Result<(), CacheError> {
        self.check_block(hash, height, slot, None)?;
        self.by_hash.insert(hash.to_string(), slot);
        self.by_height.insert(height, slot);
        Ok(())
    }

    pub fn by_hash(&self, hash: &str) -> Result<Slot, CacheError> {
        self.by_hash
            .get(hash)
            .copied()
            .ok_or_else(|| CacheError::NotFound(format!("block hash {hash}")))
    }

    pub fn by_height(&self, height: u64) -> Result<Slot, CacheError> {
        self.by_height
            .get(&height)
            .copied()
            .ok_or_else(|| CacheError::NotFound(format!("block height {height}")))
    }

    /// Record nonce and hash keys for every transaction of the block at
    /// `height`, replacing any keys previously recorded for that block.
    pub fn record_transactions(&mut self, height: u64, txs: &[Transaction]) {
        self.drop_transactions(height);
        let mut keys = HashMap::with_capacity(txs.len() * 2);
        for (position, tx) in txs.iter().enumerate() {
            keys.insert(TxKey::Nonce(tx.nonce), position);
            keys.insert(TxKey::Hash(tx.hash.clone()), position);
            self.tx_heights.insert(tx.hash.clone(), height);
        }
        self.txs.insert(height, keys);
    }

    /// Position of a transaction within the block at `height`.
    pub fn tx_position(&self, height: u64, key: &TxKey) -> Option<usize> {
        self.txs.get(&height)?.get(key).copied()
    }

    /// Height of the block containing the transaction `hash`.
    pub fn tx_height(&self, hash: &str) -> Option<u64> {
        self.tx_heights.get(hash).copied()
    }

    /// Remove the block keys and every transaction key scoped to `height`.
    ///
    /// The caller sources `hash` and `height` from the evicted entry's own
    /// record.
    pub fn drop_block(&mut self, hash: &str, height: u64) {
        self.by_hash.remove(hash);
        self.by_height.remove(&height);
        self.drop_transactions(height);
    }

    /// Remove whatever keys point at `slot`. Used when the evicted record
    /// cannot be decoded to name its keys.
    pub fn purge_slot(&mut self, slot: Slot) {
        self.by_hash.retain(|_, owner| *owner != slot);
        let heights: Vec<u64> = self
            .by_height
            .iter()
            .filter(|(_, owner)| **owner == slot)
            .map(|(height, _)| *height)
            .collect();
        for height in heights {
            self.by_height.remove(&height);
            self.drop_transactions(height);
        }
    }

    fn drop_transactions(&mut self, height: u64) {
        if let Some(keys) = self.txs.remove(&height) {
            for key in keys.into_keys() {
                if let TxKey::Hash(hash) = key {
                    if self.tx_heights.get(&hash) == Some(&height) {
                        self.tx_heights.remove(&hash);
                    }
                }
            }
        }
    }

    /// Number of indexed blocks.
    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    /// Number of indexed transactions across all blocks.
    pub fn tx_len(&self) -> usize {
        self.tx_heights.len()
    }
}
