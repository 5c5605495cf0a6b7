//! Scope block grabber.
//!
//! Follows the chain node's tip and imports every new block into the RocksDB
//! store, queueing skipped heights for backfill. Runs headless, to populate a
//! data directory without serving the API. RocksDB locks the directory, so it
//! cannot share one with a running `scope-api`.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use scope_cache::ChainCache;
use scope_node::{Grabber, NodeConfig, RocksStore, RpcClient};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "scope-grabber",
    version,
    about = "Imports blocks from a chain node into the Scope block store"
)]
struct Args {
    /// Data directory for the block store
    #[arg(long, default_value = None)]
    data_dir: Option<PathBuf>,

    /// JSON-RPC endpoint of the chain node
    #[arg(long, default_value = scope_node::config::DEFAULT_RPC_URL)]
    rpc_url: String,

    /// Milliseconds between polls of the node's latest block number
    #[arg(long, default_value_t = 1_000)]
    poll_interval_ms: u64,

    /// Deadline in milliseconds for each node call
    #[arg(long, default_value_t = 2_000)]
    rpc_timeout_ms: u64,

    /// Number of blocks kept in memory while importing
    #[arg(long, default_value_t = scope_cache::DEFAULT_CAPACITY)]
    window_capacity: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,
}

impl Args {
    /// Convert CLI args into a NodeConfig.
    fn into_config(self) -> (NodeConfig, String) {
        let defaults = NodeConfig::default();
        let config = NodeConfig {
            data_dir: self.data_dir.unwrap_or(defaults.data_dir.clone()),
            rpc_url: self.rpc_url,
            window_capacity: self.window_capacity.max(1),
            tier_timeout: Duration::from_millis(self.rpc_timeout_ms.max(1)),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            log_level: self.log_level,
        };
        (config, self.log_format)
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let (config, log_format) = args.into_config();

    init_logging(&config.log_level, &log_format);

    info!("Scope grabber v{}", env!("CARGO_PKG_VERSION"));
    info!("data_dir: {:?}", config.data_dir);
    info!("rpc_url: {}", config.rpc_url);
    info!("poll_interval: {:?}", config.poll_interval);

    if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
        error!("failed to create data_dir: {}", e);
        process::exit(1);
    }

    let store = match RocksStore::open(config.db_path()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("failed to open block store: {}", e);
            process::exit(1);
        }
    };
    let node = match RpcClient::new(&config.rpc_url, config.tier_timeout) {
        Ok(node) => Arc::new(node),
        Err(e) => {
            error!("failed to build RPC client: {}", e);
            process::exit(1);
        }
    };
    let cache = Arc::new(ChainCache::new(config.window_capacity));
    let grabber = Grabber::new(cache, store.clone(), node, config.poll_interval);

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C, shutting down..."),
            Err(e) => error!("failed to listen for Ctrl+C: {}", e),
        }
        stop.cancel();
    });

    info!("Scope grabber running (Ctrl+C to stop)");
    grabber.run(cancel).await;

    if let Err(e) = store.flush() {
        error!("failed to flush block store: {}", e);
        process::exit(1);
    }
    info!("Scope grabber shutdown complete");
}

/// Initialize tracing subscriber with the given log level and output format.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_node_config() {
        let args = Args::parse_from(["scope-grabber"]);
        let (config, format) = args.into_config();
        let defaults = NodeConfig::default();
        assert_eq!(config.data_dir, defaults.data_dir);
        assert_eq!(config.rpc_url, defaults.rpc_url);
        assert_eq!(config.poll_interval, defaults.poll_interval);
        assert_eq!(config.tier_timeout, defaults.tier_timeout);
        assert_eq!(config.window_capacity, defaults.window_capacity);
        assert_eq!(format, "text");
    }

    #[test]
    fn flags_override_defaults() {
        let args = Args::parse_from([
            "scope-grabber",
            "--data-dir",
            "/tmp/scope",
            "--poll-interval-ms",
            "250",
            "--window-capacity",
            "0",
            "--log-format",
            "json",
        ]);
        let (config, format) = args.into_config();
        assert_eq!(config.db_path(), PathBuf::from("/tmp/scope/blockdata"));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.window_capacity, 1);
        assert_eq!(format, "json");
    }
}
