//! Ingestion into a RocksDB store and the window, read back through the
//! explorer service.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use scope_cache::ChainCache;
use scope_core::pagination::Pagination;
use scope_core::traits::BlockStore;
use scope_node::{Explorer, Grabber, PollOutcome, RocksStore};
use scope_tests::helpers::*;

struct Harness {
    cache: Arc<ChainCache>,
    store: Arc<RocksStore>,
    node: Arc<MockNode>,
    grabber: Grabber,
    explorer: Explorer,
    _dir: tempfile::TempDir,
}

fn harness(node: MockNode, capacity: usize) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RocksStore::open(dir.path().join("blockdata")).unwrap());
    let cache = Arc::new(ChainCache::new(capacity));
    let node = Arc::new(node);
    let grabber = Grabber::new(
        Arc::clone(&cache),
        store.clone(),
        node.clone(),
        Duration::from_millis(10),
    );
    let explorer = Explorer::new(
        Arc::clone(&cache),
        store.clone(),
        node.clone(),
        Duration::from_secs(2),
        CancellationToken::new(),
    );
    Harness {
        cache,
        store,
        node,
        grabber,
        explorer,
        _dir: dir,
    }
}

#[tokio::test]
async fn evicted_blocks_are_served_from_database() {
    let h = harness(MockNode::with_chain(1..=5, 2), 3);

    let mut prev = None;
    for height in 1..=5 {
        h.node.set_latest(height);
        let outcome = h.grabber.poll_once(prev).await.unwrap();
        assert_eq!(outcome, PollOutcome::Imported(height));
        prev = Some(height);
    }
    assert_eq!(h.cache.len(), 3);
    assert!(h.cache.block_by_height(1).is_err());
    assert!(h.cache.tx_by_hash(&tx_hash(1, 0)).is_err());

    let calls = h.node.calls();
    let block = h.explorer.block_by_height(1).await.unwrap();
    assert_eq!(block.hash, block_hash(1));
    let tx = h.explorer.tx_by_hash(&tx_hash(1, 1)).await.unwrap();
    assert_eq!(tx.tx_fee, "42000");
    assert_eq!(h.node.calls(), calls, "database answered without the node");
}

#[tokio::test]
async fn gap_is_backfilled_into_database_only() {
    let h = harness(MockNode::with_chain(1..=6, 1), 8);

    h.node.set_latest(2);
    h.grabber.poll_once(None).await.unwrap();
    h.node.set_latest(6);
    h.grabber.poll_once(Some(2)).await.unwrap();
    assert_eq!(h.cache.error_heights(), vec![5, 4, 3]);

    assert_eq!(h.grabber.retry_error_blocks(10).await, 3);
    assert!(h.cache.error_heights().is_empty());

    let (blocks, total) = h.explorer.latest_blocks(&Pagination::new(1, 10)).await.unwrap();
    // The window holds only the polled tips.
    assert_eq!(blocks.iter().map(|b| b.height).collect::<Vec<_>>(), vec![6, 2]);
    assert_eq!(total, 6);

    let stored = h.store.blocks(&Pagination::new(1, 10)).await.unwrap();
    assert_eq!(stored.iter().map(|b| b.height).collect::<Vec<_>>(), vec![6, 5, 4, 3, 2]);
    let block = h.explorer.block_by_height(4).await.unwrap();
    assert_eq!(block.hash, block_hash(4));
}

#[tokio::test]
async fn outage_lands_in_persistent_errors() {
    let h = harness(MockNode::with_chain(1..=3, 1), 8);

    h.node.set_latest(1);
    h.grabber.poll_once(None).await.unwrap();
    h.node.set_latest(3);
    h.node.set_down(true);
    assert!(h.grabber.poll_once(Some(1)).await.is_err());

    h.node.set_down(false);
    assert_eq!(h.grabber.poll_once(Some(1)).await.unwrap(), PollOutcome::Imported(3));

    h.node.set_down(true);
    assert_eq!(h.grabber.retry_error_blocks(10).await, 0);
    assert_eq!(h.explorer.persistent_error_blocks(), vec![2]);
}

#[tokio::test]
async fn address_history_accumulates_across_imports() {
    let h = harness(MockNode::with_chain(1..=4, 5), 2);

    let mut prev = None;
    for height in 1..=4 {
        h.node.set_latest(height);
        h.grabber.poll_once(prev).await.unwrap();
        prev = Some(height);
    }

    let (txs, total) = h
        .explorer
        .txs_by_address(&account(10), &Pagination::new(1, 3))
        .await
        .unwrap();
    // Each block sends to account 10 from transactions 0 and 3.
    assert_eq!(total, 8);
    assert_eq!(
        txs.iter().map(|t| t.hash.clone()).collect::<Vec<_>>(),
        vec![tx_hash(4, 3), tx_hash(4, 0), tx_hash(3, 3)]
    );
}
