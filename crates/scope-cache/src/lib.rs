//! # scope-cache
//! In-memory tier of the Scope explorer.
//!
//! - [`index`]: hash/height → slot maps and per-block transaction keys
//! - [`window`]: bounded, most-recent-first block window with eviction
//! - [`queues`]: error, unverified, and persistent height queues
//! - [`cache`]: [`ChainCache`], the lock-guarded facade shared by readers and
//!   the ingestion loop

pub mod cache;
pub mod index;
pub mod queues;
pub mod window;

pub use cache::ChainCache;
pub use index::{BlockIndex, Slot, TxKey};
pub use queues::HeightQueues;
pub use window::{BlockWindow, DEFAULT_CAPACITY};
