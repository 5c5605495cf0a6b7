use std::path::PathBuf;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use scope_node::NodeConfig;

/// API server configuration, read from `SCOPE_*` environment variables.
///
/// The window lives in this process, so the ingestion loop runs embedded by
/// default; `SCOPE_INGEST=false` serves from the database and node only.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub node: NodeConfig,
    pub ingest: bool,
    pub log_format: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut node = NodeConfig::default();
        if let Some(dir) = var("SCOPE_DATA_DIR") {
            node.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = var("SCOPE_RPC_URL") {
            node.rpc_url = url;
        }
        if let Some(raw) = var("SCOPE_WINDOW_CAPACITY") {
            node.window_capacity = raw
                .parse()
                .with_context(|| format!("invalid SCOPE_WINDOW_CAPACITY: {raw}"))?;
            ensure!(node.window_capacity > 0, "SCOPE_WINDOW_CAPACITY must be positive");
        }
        if let Some(raw) = var("SCOPE_TIER_TIMEOUT_MS") {
            node.tier_timeout = parse_millis("SCOPE_TIER_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = var("SCOPE_POLL_INTERVAL_MS") {
            node.poll_interval = parse_millis("SCOPE_POLL_INTERVAL_MS", &raw)?;
        }
        if let Some(level) = var("SCOPE_LOG_LEVEL") {
            node.log_level = level;
        }

        let ingest = match var("SCOPE_INGEST").as_deref() {
            None => true,
            Some("1" | "true" | "yes") => true,
            Some("0" | "false" | "no") => false,
            Some(other) => anyhow::bail!("invalid SCOPE_INGEST: {other}"),
        };

        Ok(Self {
            bind_addr: var("SCOPE_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            node,
            ingest,
            log_format: var("SCOPE_LOG_FORMAT").unwrap_or_else(|| "text".into()),
        })
    }
}

fn parse_millis(key: &str, raw: &str) -> Result<Duration> {
    let ms: u64 = raw.parse().with_context(|| format!("invalid {key}: {raw}"))?;
    ensure!(ms > 0, "{key} must be positive");
    Ok(Duration::from_millis(ms))
}
