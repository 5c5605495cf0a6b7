//! # scope-node
//! Durable and remote tiers of the Scope explorer, the fallback read path
//! over them, and the block ingestion loop.

pub mod config;
pub mod explorer;
pub mod fallback;
pub mod grabber;
pub mod memory;
pub mod rpc;
pub mod storage;

pub use config::NodeConfig;
pub use explorer::{BlockId, Explorer};
pub use fallback::{FallbackPath, Tier, TierOutcome};
pub use grabber::{Grabber, PollOutcome};
pub use memory::MemoryStore;
pub use rpc::RpcClient;
pub use storage::RocksStore;
