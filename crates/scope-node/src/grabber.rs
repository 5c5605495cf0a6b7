//! Block ingestion loop.
//!
//! Every poll interval the [`Grabber`] asks the node for its latest block
//! number. When the number moves it fetches that block and imports it: the
//! durable store first, then the window. A jump of more than one height
//! queues the skipped heights as error heights; a failed import lands in the
//! persistent error list and is queued for retry. Between polls the grabber backfills a few error
//! heights and re-checks a few unverified ones against the node.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use scope_cache::ChainCache;
use scope_core::error::{CacheError, ScopeError};
use scope_core::traits::{BlockStore, NodeClient};
use scope_core::types::Block;

/// Error heights backfilled per tick.
pub const RETRY_BATCH: usize = 10;

/// Unverified heights re-checked per tick.
pub const VERIFY_BATCH: usize = 10;

/// What a single poll did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// The node has not moved since the previous poll.
    Unchanged,
    /// The block at this height was imported.
    Imported(u64),
    /// The block at this height could not be imported.
    Failed(u64),
}

pub struct Grabber {
    cache: Arc<ChainCache>,
    store: Arc<dyn BlockStore>,
    node: Arc<dyn NodeClient>,
    poll_interval: Duration,
}

impl Grabber {
    pub fn new(
        cache: Arc<ChainCache>,
        store: Arc<dyn BlockStore>,
        node: Arc<dyn NodeClient>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            cache,
            store,
            node,
            poll_interval,
        }
    }

    /// Poll until `cancel` fires.
    ///
    /// Starts from the store's latest height so a restart does not re-queue
    /// everything below the tip.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut prev = match self.store.latest_height().await {
            Ok(height) => height,
            Err(e) => {
                warn!(error = %e, "could not read stored tip, starting fresh");
                None
            }
        };
        info!(from = ?prev, interval_ms = self.poll_interval.as_millis() as u64, "grabber started");

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("grabber stopping");
                    return;
                }
                _ = ticker.tick() => {}
            }

            match self.poll_once(prev).await {
                Ok(PollOutcome::Unchanged) => {}
                Ok(PollOutcome::Imported(height) | PollOutcome::Failed(height)) => prev = Some(height),
                Err(e) => {
                    error!(error = %e, "failed to poll latest block number");
                    continue;
                }
            }
            self.retry_error_blocks(RETRY_BATCH).await;
            self.verify_blocks(VERIFY_BATCH).await;
        }
    }

    /// One poll of the node tip.
    ///
    /// `Err` only when the node's latest block number cannot be read; the
    /// caller retries on the next tick.
    pub async fn poll_once(&self, prev: Option<u64>) -> Result<PollOutcome, ScopeError> {
        let latest = self.node.latest_block_number().await?;
        if prev == Some(latest) {
            return Ok(PollOutcome::Unchanged);
        }

        match prev {
            Some(p) if latest > p.saturating_add(1) => {
                let queued = self.cache.push_error_range(p, latest);
                warn!(prev = p, latest, queued, "height gap, queued missing blocks");
            }
            Some(p) if latest < p => {
                warn!(prev = p, latest, "node tip moved backwards");
            }
            _ => {}
        }

        match self.fetch_and_import(latest).await {
            Ok(()) => {
                self.cache.push_unverified(latest);
                info!(height = latest, "imported block");
                Ok(PollOutcome::Imported(latest))
            }
            Err(e) => {
                error!(height = latest, error = %e, "failed to import block");
                self.cache.push_persistent_error(latest);
                self.cache.push_error_height(latest);
                Ok(PollOutcome::Failed(latest))
            }
        }
    }

    async fn fetch_and_import(&self, height: u64) -> Result<(), ScopeError> {
        let block = self.node.block_by_height(height).await?;
        self.import_block(block).await
    }

    /// Store a block durably and add it to the window.
    pub async fn import_block(&self, mut block: Block) -> Result<(), ScopeError> {
        block.merge_receipts();
        self.store.upsert_block(&block).await?;
        self.cache.import_block(&block)?;
        Ok(())
    }

    /// Store a block durably without touching the window. Used for heights
    /// behind the tip, which would break the window's newest-first order.
    pub async fn backfill_block(&self, mut block: Block) -> Result<(), ScopeError> {
        block.merge_receipts();
        self.store.upsert_block(&block).await?;
        Ok(())
    }

    /// Re-store a block that replaced what the store held at its height,
    /// and swap it into the window if that height is still windowed.
    async fn repair_block(&self, mut block: Block) -> Result<(), ScopeError> {
        block.merge_receipts();
        self.store.upsert_block(&block).await?;
        match self.cache.replace_block(&block) {
            Ok(_) => debug!(height = block.height, "repaired windowed block"),
            Err(CacheError::NotFound(_) | CacheError::Empty(_)) => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Pop up to `max` error heights and backfill each one. A height that
    /// fails again goes to the persistent error list. Returns how many were
    /// backfilled.
    pub async fn retry_error_blocks(&self, max: usize) -> usize {
        let mut done = 0;
        for _ in 0..max {
            let height = match self.cache.pop_error_height() {
                Ok(height) => height,
                Err(CacheError::Empty(_)) => break,
                Err(e) => {
                    warn!(error = %e, "error queue unavailable");
                    break;
                }
            };
            let result = match self.node.block_by_height(height).await {
                Ok(block) => self.backfill_block(block).await,
                Err(e) => Err(e.into()),
            };
            match result {
                Ok(()) => {
                    debug!(height, "backfilled error height");
                    done += 1;
                }
                Err(e) => {
                    warn!(height, error = %e, "backfill failed");
                    self.cache.push_persistent_error(height);
                }
            }
        }
        done
    }

    /// Pop up to `max` unverified heights and compare the stored hash with
    /// the node's. A mismatch re-stores the node's block and replaces the
    /// windowed copy. Returns how many
    /// heights needed repair.
    pub async fn verify_blocks(&self, max: usize) -> usize {
        let mut repaired = 0;
        for _ in 0..max {
            let Ok(height) = self.cache.pop_unverified() else {
                break;
            };
            let canonical = match self.node.block_by_height(height).await {
                Ok(block) => block,
                Err(e) => {
                    warn!(height, error = %e, "could not verify block");
                    self.cache.push_persistent_error(height);
                    continue;
                }
            };
            let stored_hash = self.store.block_by_height(height).await.map(|b| b.hash);
            if stored_hash.as_deref().ok() == Some(canonical.hash.as_str()) {
                continue;
            }
            warn!(height, stored = ?stored_hash, canonical = %canonical.hash, "stored block differs from node");
            match self.repair_block(canonical).await {
                Ok(()) => repaired += 1,
                Err(e) => {
                    error!(height, error = %e, "failed to repair block");
                    self.cache.push_persistent_error(height);
                }
            }
        }
        repaired
    }
}
