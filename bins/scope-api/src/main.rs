mod config;
mod routes;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use scope_cache::ChainCache;
use scope_node::{Explorer, Grabber, RocksStore, RpcClient};

#[derive(Clone)]
pub struct AppState {
    pub explorer: Arc<Explorer>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;
    init_logging(&config.node.log_level, &config.log_format);

    info!(
        rpc = %config.node.rpc_url,
        bind = %config.bind_addr,
        data_dir = ?config.node.data_dir,
        window = config.node.window_capacity,
        ingest = config.ingest,
        "Starting scope-api"
    );

    std::fs::create_dir_all(&config.node.data_dir)
        .with_context(|| format!("creating data dir {:?}", config.node.data_dir))?;
    let store = Arc::new(RocksStore::open(config.node.db_path())?);
    let node = Arc::new(RpcClient::new(&config.node.rpc_url, config.node.tier_timeout)?);
    let cache = Arc::new(ChainCache::new(config.node.window_capacity));
    let shutdown = CancellationToken::new();

    let ingest = config.ingest.then(|| {
        let grabber = Grabber::new(
            Arc::clone(&cache),
            store.clone(),
            node.clone(),
            config.node.poll_interval,
        );
        let cancel = shutdown.clone();
        tokio::spawn(async move { grabber.run(cancel).await })
    });

    let explorer = Arc::new(Explorer::new(
        cache,
        store.clone(),
        node,
        config.node.tier_timeout,
        shutdown.clone(),
    ));
    let app = routes::router(AppState { explorer });

    tokio::spawn(cancel_on_ctrl_c(shutdown.clone()));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("API listening on http://{}", config.bind_addr);
    let stop = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { stop.cancelled().await })
        .await?;

    if let Some(handle) = ingest {
        if let Err(e) = handle.await {
            error!(error = %e, "ingestion task panicked");
        }
    }
    store.flush()?;
    info!("scope-api shutdown complete");
    Ok(())
}

async fn cancel_on_ctrl_c(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C, shutting down..."),
        Err(e) => error!(error = %e, "failed to listen for Ctrl+C, shutting down"),
    }
    shutdown.cancel();
}

/// Initialize tracing with the given filter and output format.
///
/// `format = "json"` emits structured JSON; anything else is human-readable
/// text. `RUST_LOG` overrides `level_str` when set.
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
