//! RocksDB-backed durable block and transaction storage.
//!
//! Implements [`BlockStore`] using RocksDB column families for block
//! summaries, a hash → height index, transactions, the per-block transaction
//! list, a per-address transaction index, and metadata. Every block write is
//! a single atomic [`WriteBatch`].
//!
//! Key layout:
//! - `blocks`: height (BE) → block summary
//! - `hash_index`: block hash → height (BE)
//! - `txs`: tx hash → transaction
//! - `block_txs`: height (BE) ‖ tx index (BE) → tx hash
//! - `address_index`: address key ‖ height (BE) ‖ tx index (BE) → tx hash
//! - `metadata`: counters

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use tracing::debug;

use scope_core::error::DatabaseError;
use scope_core::pagination::Pagination;
use scope_core::traits::BlockStore;
use scope_core::types::{Block, Transaction};

// --- Column family names ---

const CF_BLOCKS: &str = "blocks";
const CF_HASH_INDEX: &str = "hash_index";
const CF_TXS: &str = "txs";
const CF_BLOCK_TXS: &str = "block_txs";
const CF_ADDRESS_INDEX: &str = "address_index";
const CF_METADATA: &str = "metadata";

/// All column family names.
const ALL_CFS: &[&str] = &[
    CF_BLOCKS,
    CF_HASH_INDEX,
    CF_TXS,
    CF_BLOCK_TXS,
    CF_ADDRESS_INDEX,
    CF_METADATA,
];

// --- Metadata keys ---

const META_TOTAL_TXS: &[u8] = b"total_txs";

fn storage_err(e: impl std::fmt::Display) -> DatabaseError {
    DatabaseError::Storage(e.to_string())
}

fn encode<T: bincode::Encode>(value: &T) -> Result<Vec<u8>, DatabaseError> {
    bincode::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn decode<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T, DatabaseError> {
    let (value, _): (T, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
    Ok(value)
}

/// RocksDB-backed durable tier.
///
/// Cloning shares the same database handle. Trait methods run their RocksDB
/// work on the blocking pool, so a tier deadline or shutdown can abandon a
/// slow scan without stalling a runtime worker.
#[derive(Clone)]
pub struct RocksStore {
    db: Arc<DB>,
}

impl RocksStore {
    /// Open or create a RocksDB database at the given path, creating any
    /// missing column families.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(storage_err)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Flush all in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), DatabaseError> {
        self.db.flush().map_err(storage_err)
    }

    // --- Internal helpers ---

    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, DatabaseError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| DatabaseError::Storage(format!("missing column family: {name}")))
    }

    /// Encode a height as big-endian bytes for ordered iteration.
    fn height_key(height: u64) -> [u8; 8] {
        height.to_be_bytes()
    }

    fn block_tx_key(height: u64, index: u64) -> [u8; 16] {
        let mut key = [0u8; 16];
        key[0..8].copy_from_slice(&height.to_be_bytes());
        key[8..16].copy_from_slice(&index.to_be_bytes());
        key
    }

    /// Length-prefixed address bytes. Hex addresses are stored decoded and
    /// case-folded; anything else is stored as lowercase UTF-8.
    fn address_prefix(address: &str) -> Vec<u8> {
        let lower = address.to_ascii_lowercase();
        let raw = hex::decode(lower.trim_start_matches("0x")).unwrap_or_else(|_| lower.into_bytes());
        let len = u8::try_from(raw.len()).unwrap_or(u8::MAX);
        let mut prefix = Vec::with_capacity(1 + raw.len());
        prefix.push(len);
        prefix.extend_from_slice(&raw[..len as usize]);
        prefix
    }

    fn address_key(address: &str, height: u64, index: u64) -> Vec<u8> {
        let mut key = Self::address_prefix(address);
        key.extend_from_slice(&Self::block_tx_key(height, index));
        key
    }

    fn get_meta_u64(&self, key: &[u8]) -> Result<u64, DatabaseError> {
        let cf = self.cf_handle(CF_METADATA)?;
        match self.db.get_cf(cf, key).map_err(storage_err)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| DatabaseError::Storage("invalid metadata value length".into()))?;
                Ok(u64::from_le_bytes(arr))
            }
            None => Ok(0),
        }
    }

    fn read_summary(&self, height: u64) -> Result<Option<Block>, DatabaseError> {
        let cf = self.cf_handle(CF_BLOCKS)?;
        self.db
            .get_cf(cf, Self::height_key(height))
            .map_err(storage_err)?
            .map(|data| decode(&data))
            .transpose()
    }

    fn height_of(&self, hash: &str) -> Result<Option<u64>, DatabaseError> {
        let cf = self.cf_handle(CF_HASH_INDEX)?;
        match self.db.get_cf(cf, hash.as_bytes()).map_err(storage_err)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| DatabaseError::Storage("invalid height index length".into()))?;
                Ok(Some(u64::from_be_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    fn read_tx(&self, hash: &[u8]) -> Result<Option<Transaction>, DatabaseError> {
        let cf = self.cf_handle(CF_TXS)?;
        self.db
            .get_cf(cf, hash)
            .map_err(storage_err)?
            .map(|data| decode(&data))
            .transpose()
    }

    /// Transaction hashes stored under `prefix` in `cf_name`, in key order.
    fn hashes_with_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<Vec<u8>>, DatabaseError> {
        let cf = self.cf_handle(cf_name)?;
        let mut hashes = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item.map_err(storage_err)?;
            if !key.starts_with(prefix) {
                break;
            }
            hashes.push(value.into_vec());
        }
        Ok(hashes)
    }

    /// All transactions of the block at `height`, ascending index.
    fn block_txs(&self, height: u64) -> Result<Vec<Transaction>, DatabaseError> {
        self.hashes_with_prefix(CF_BLOCK_TXS, &Self::height_key(height))?
            .iter()
            .map(|hash| {
                self.read_tx(hash)?.ok_or_else(|| {
                    DatabaseError::Storage(format!(
                        "block {height} lists missing tx {}",
                        String::from_utf8_lossy(hash)
                    ))
                })
            })
            .collect()
    }

    fn full_block(&self, height: u64) -> Result<Block, DatabaseError> {
        let mut block = self
            .read_summary(height)?
            .ok_or_else(|| DatabaseError::NotFound(format!("block {height}")))?;
        block.txs = self.block_txs(height)?;
        Ok(block)
    }

    fn page_block_txs(
        &self,
        height: u64,
        pagination: &Pagination,
    ) -> Result<(Vec<Transaction>, u64), DatabaseError> {
        if self.read_summary(height)?.is_none() {
            return Err(DatabaseError::NotFound(format!("block {height}")));
        }
        let txs = self.block_txs(height)?;
        let total = txs.len() as u64;
        Ok((pagination.slice(&txs).to_vec(), total))
    }

    fn page_blocks(&self, pagination: &Pagination) -> Result<Vec<Block>, DatabaseError> {
        let cf = self.cf_handle(CF_BLOCKS)?;
        let skip = usize::try_from(pagination.skip()).unwrap_or(usize::MAX);
        let limit = usize::try_from(pagination.limit()).unwrap_or(usize::MAX);
        self.db
            .iterator_cf(cf, IteratorMode::End)
            .skip(skip)
            .take(limit)
            .map(|item| {
                let (_, value) = item.map_err(storage_err)?;
                decode(&value)
            })
            .collect()
    }

    /// Address history, newest first, plus the total count.
    fn page_address_txs(
        &self,
        address: &str,
        pagination: &Pagination,
    ) -> Result<(Vec<Transaction>, u64), DatabaseError> {
        let mut hashes = self.hashes_with_prefix(CF_ADDRESS_INDEX, &Self::address_prefix(address))?;
        let total = hashes.len() as u64;
        hashes.reverse();

        let mut txs = Vec::new();
        for hash in pagination.slice(&hashes) {
            if let Some(tx) = self.read_tx(hash)? {
                txs.push(tx);
            }
        }
        Ok((txs, total))
    }

    /// Most recent transactions: newest block first, ascending index within
    /// a block.
    ///
    /// Offsets are counted from the `block_txs` keys actually stored, not
    /// from the summary's reported `tx_count`.
    fn page_latest_txs(&self, pagination: &Pagination) -> Result<Vec<Transaction>, DatabaseError> {
        let cf = self.cf_handle(CF_BLOCKS)?;
        let limit = usize::try_from(pagination.limit()).unwrap_or(usize::MAX);
        let mut skip = usize::try_from(pagination.skip()).unwrap_or(usize::MAX);
        let mut out = Vec::new();

        for item in self.db.iterator_cf(cf, IteratorMode::End) {
            if out.len() >= limit {
                break;
            }
            let (height_key, _) = item.map_err(storage_err)?;
            let hashes = self.hashes_with_prefix(CF_BLOCK_TXS, &height_key)?;
            if skip >= hashes.len() {
                skip -= hashes.len();
                continue;
            }
            for hash in hashes.iter().skip(skip).take(limit - out.len()) {
                let tx = self.read_tx(hash)?.ok_or_else(|| {
                    DatabaseError::Storage(format!(
                        "block_txs lists missing tx {}",
                        String::from_utf8_lossy(hash)
                    ))
                })?;
                out.push(tx);
            }
            skip = 0;
        }
        Ok(out)
    }

    fn tip_height(&self) -> Result<Option<u64>, DatabaseError> {
        let cf = self.cf_handle(CF_BLOCKS)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item.map_err(storage_err)?;
                let arr: [u8; 8] = key[..]
                    .try_into()
                    .map_err(|_| DatabaseError::Storage("invalid block key length".into()))?;
                Ok(Some(u64::from_be_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    /// Run `op` against this store on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T, DatabaseError>
    where
        T: Send + 'static,
        F: FnOnce(&RocksStore) -> Result<T, DatabaseError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| DatabaseError::Storage(format!("blocking task failed: {e}")))?
    }

    /// Stage deletion of everything written for `old`. Returns how many
    /// transactions were removed.
    fn stage_removal(&self, batch: &mut WriteBatch, old: &Block) -> Result<u64, DatabaseError> {
        let cf_hash = self.cf_handle(CF_HASH_INDEX)?;
        let cf_txs = self.cf_handle(CF_TXS)?;
        let cf_block_txs = self.cf_handle(CF_BLOCK_TXS)?;
        let cf_addr = self.cf_handle(CF_ADDRESS_INDEX)?;

        batch.delete_cf(cf_hash, old.hash.as_bytes());
        let txs = self.block_txs(old.height)?;
        for (index, tx) in txs.iter().enumerate() {
            let index = index as u64;
            batch.delete_cf(cf_txs, tx.hash.as_bytes());
            batch.delete_cf(cf_block_txs, Self::block_tx_key(old.height, index));
            for address in [&tx.from, &tx.to] {
                if !address.is_empty() {
                    batch.delete_cf(cf_addr, Self::address_key(address, old.height, index));
                }
            }
        }
        Ok(txs.len() as u64)
    }

    /// Write `block` at its height, optionally replacing what is stored there.
    fn write_block(&self, block: &Block, replace: bool) -> Result<(), DatabaseError> {
        let existing = self.read_summary(block.height)?;
        if existing.is_some() && !replace {
            return Err(DatabaseError::Storage(format!(
                "block {} already stored",
                block.height
            )));
        }

        let cf_blocks = self.cf_handle(CF_BLOCKS)?;
        let cf_hash = self.cf_handle(CF_HASH_INDEX)?;
        let cf_txs = self.cf_handle(CF_TXS)?;
        let cf_block_txs = self.cf_handle(CF_BLOCK_TXS)?;
        let cf_addr = self.cf_handle(CF_ADDRESS_INDEX)?;
        let cf_meta = self.cf_handle(CF_METADATA)?;

        let mut batch = WriteBatch::default();
        let removed = match &existing {
            Some(old) => self.stage_removal(&mut batch, old)?,
            None => 0,
        };

        let mut summary = block.summary();
        summary.tx_count = block.tx_count.max(block.txs.len() as u64);
        batch.put_cf(cf_blocks, Self::height_key(block.height), encode(&summary)?);
        batch.put_cf(cf_hash, block.hash.as_bytes(), Self::height_key(block.height));

        for (index, tx) in block.txs.iter().enumerate() {
            let index = index as u64;
            batch.put_cf(cf_txs, tx.hash.as_bytes(), encode(tx)?);
            batch.put_cf(cf_block_txs, Self::block_tx_key(block.height, index), tx.hash.as_bytes());
            if !tx.from.is_empty() {
                batch.put_cf(cf_addr, Self::address_key(&tx.from, block.height, index), tx.hash.as_bytes());
            }
            if !tx.to.is_empty() && !tx.to.eq_ignore_ascii_case(&tx.from) {
                batch.put_cf(cf_addr, Self::address_key(&tx.to, block.height, index), tx.hash.as_bytes());
            }
        }

        let total = self.get_meta_u64(META_TOTAL_TXS)?;
        let total = total.saturating_sub(removed) + block.txs.len() as u64;
        batch.put_cf(cf_meta, META_TOTAL_TXS, total.to_le_bytes());

        self.db.write(batch).map_err(storage_err)?;
        debug!(
            height = block.height,
            txs = block.txs.len(),
            replaced = existing.is_some(),
            "stored block"
        );
        Ok(())
    }
}

#[async_trait]
impl BlockStore for RocksStore {
    async fn block_by_height(&self, height: u64) -> Result<Block, DatabaseError> {
        self.blocking(move |store| store.full_block(height)).await
    }

    async fn block_by_hash(&self, hash: &str) -> Result<Block, DatabaseError> {
        let hash = hash.to_string();
        self.blocking(move |store| {
            let height = store
                .height_of(&hash)?
                .ok_or_else(|| DatabaseError::NotFound(format!("block {hash}")))?;
            store.full_block(height)
        })
        .await
    }

    async fn block_exists(&self, height: u64) -> Result<bool, DatabaseError> {
        self.blocking(move |store| Ok(store.read_summary(height)?.is_some()))
            .await
    }

    async fn blocks(&self, pagination: &Pagination) -> Result<Vec<Block>, DatabaseError> {
        let pagination = *pagination;
        self.blocking(move |store| store.page_blocks(&pagination)).await
    }

    async fn txs_by_block_hash(
        &self,
        hash: &str,
        pagination: &Pagination,
    ) -> Result<(Vec<Transaction>, u64), DatabaseError> {
        let hash = hash.to_string();
        let pagination = *pagination;
        self.blocking(move |store| {
            let height = store
                .height_of(&hash)?
                .ok_or_else(|| DatabaseError::NotFound(format!("block {hash}")))?;
            store.page_block_txs(height, &pagination)
        })
        .await
    }

    async fn txs_by_block_height(
        &self,
        height: u64,
        pagination: &Pagination,
    ) -> Result<(Vec<Transaction>, u64), DatabaseError> {
        let pagination = *pagination;
        self.blocking(move |store| store.page_block_txs(height, &pagination))
            .await
    }

    async fn txs_by_address(
        &self,
        address: &str,
        pagination: &Pagination,
    ) -> Result<(Vec<Transaction>, u64), DatabaseError> {
        let address = address.to_string();
        let pagination = *pagination;
        self.blocking(move |store| store.page_address_txs(&address, &pagination))
            .await
    }

    async fn latest_txs(&self, pagination: &Pagination) -> Result<Vec<Transaction>, DatabaseError> {
        let pagination = *pagination;
        self.blocking(move |store| store.page_latest_txs(&pagination)).await
    }

    async fn tx_by_hash(&self, hash: &str) -> Result<Transaction, DatabaseError> {
        let hash = hash.to_string();
        self.blocking(move |store| {
            store
                .read_tx(hash.as_bytes())?
                .ok_or_else(|| DatabaseError::NotFound(format!("transaction {hash}")))
        })
        .await
    }

    async fn insert_block(&self, block: &Block) -> Result<(), DatabaseError> {
        let block = block.clone();
        self.blocking(move |store| store.write_block(&block, false)).await
    }

    async fn upsert_block(&self, block: &Block) -> Result<(), DatabaseError> {
        let block = block.clone();
        self.blocking(move |store| store.write_block(&block, true)).await
    }

    async fn latest_height(&self) -> Result<Option<u64>, DatabaseError> {
        self.blocking(|store| store.tip_height()).await
    }

    async fn total_txs(&self) -> Result<u64, DatabaseError> {
        self.blocking(|store| store.get_meta_u64(META_TOTAL_TXS)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_prefix_folds_case_and_decodes_hex() {
        let upper = RocksStore::address_prefix("0xABCD");
        let lower = RocksStore::address_prefix("0xabcd");
        assert_eq!(upper, lower);
        assert_eq!(upper, vec![2, 0xab, 0xcd]);
    }

    #[test]
    fn address_prefix_falls_back_to_text() {
        let prefix = RocksStore::address_prefix("Staking");
        assert_eq!(prefix[0], 7);
        assert_eq!(&prefix[1..], b"staking");
    }

    #[test]
    fn address_prefix_is_not_ambiguous() {
        // "0xab" must not be a key prefix of "0xabcd".
        let short = RocksStore::address_prefix("0xab");
        let long = RocksStore::address_key("0xabcd", 1, 0);
        assert!(!long.starts_with(&short));
    }

    #[test]
    fn block_tx_keys_sort_by_height_then_index() {
        let a = RocksStore::block_tx_key(1, 9);
        let b = RocksStore::block_tx_key(2, 0);
        let c = RocksStore::block_tx_key(2, 1);
        assert!(a < b && b < c);
    }
}
