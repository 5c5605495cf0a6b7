//! Service configuration shared by the API server and the grabber.
//!
//! Provides [`NodeConfig`] with defaults for the data directory, node RPC
//! endpoint, window capacity, and tier timing. Binaries override fields from
//! environment variables or CLI flags.

use std::path::PathBuf;
use std::time::Duration;

use scope_cache::DEFAULT_CAPACITY;

/// Default JSON-RPC endpoint of the chain node.
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

/// Default per-tier deadline for database and RPC lookups.
pub const DEFAULT_TIER_TIMEOUT: Duration = Duration::from_secs(2);

/// Default interval between polls of the node's latest block number.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// JSON-RPC endpoint of the chain node.
    pub rpc_url: String,
    /// Number of blocks kept in the in-memory window.
    pub window_capacity: usize,
    /// Deadline applied to each database or RPC tier call.
    pub tier_timeout: Duration,
    /// Interval between polls of the node's latest block number.
    pub poll_interval: Duration,
    /// Log filter string (e.g. "info", "scope_node=debug").
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("scope");

        Self {
            data_dir,
            rpc_url: DEFAULT_RPC_URL.to_string(),
            window_capacity: DEFAULT_CAPACITY,
            tier_timeout: DEFAULT_TIER_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Path to the RocksDB directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("blockdata")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.window_capacity, 1_000);
        assert_eq!(cfg.tier_timeout, Duration::from_secs(2));
        assert_eq!(cfg.poll_interval, Duration::from_secs(1));
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.rpc_url, DEFAULT_RPC_URL);
    }

    #[test]
    fn default_data_dir_ends_with_scope() {
        let cfg = NodeConfig::default();
        assert!(
            cfg.data_dir.ends_with("scope"),
            "data_dir should end with 'scope': {:?}",
            cfg.data_dir
        );
    }

    #[test]
    fn db_path_appends_blockdata() {
        let cfg = NodeConfig {
            data_dir: PathBuf::from("/tmp/scope-test"),
            ..NodeConfig::default()
        };
        assert_eq!(cfg.db_path(), PathBuf::from("/tmp/scope-test/blockdata"));
    }
}
