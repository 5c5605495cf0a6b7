//! Criterion benchmarks for the RocksDB store.
//!
//! Covers: block upsert with transactions and address indexing, and the
//! paged address lookup.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::TempDir;

use scope_core::pagination::Pagination;
use scope_core::traits::BlockStore;
use scope_core::types::{Block, Transaction};
use scope_node::storage::RocksStore;

fn make_block(height: u64, txs: u64) -> Block {
    let hash = format!("0x{height:064x}");
    Block {
        height,
        hash: hash.clone(),
        tx_count: txs,
        txs: (0..txs)
            .map(|i| Transaction {
                hash: format!("0x{height:032x}{i:032x}"),
                block_number: height,
                block_hash: hash.clone(),
                transaction_index: i,
                from: format!("0x{:040x}", i % 7),
                to: format!("0x{:040x}", 100 + i % 11),
                ..Transaction::default()
            })
            .collect(),
        ..Block::default()
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

fn bench_upsert(c: &mut Criterion) {
    let rt = runtime();
    let block = make_block(1, 50);
    c.bench_function("upsert_block_50_txs", |b| {
        b.iter_with_setup(
            || {
                let dir = TempDir::new().unwrap();
                let store = RocksStore::open(dir.path()).unwrap();
                (dir, store)
            },
            |(_dir, store)| rt.block_on(store.upsert_block(black_box(&block))).unwrap(),
        )
    });
}

fn bench_address_lookup(c: &mut Criterion) {
    let rt = runtime();
    let dir = TempDir::new().unwrap();
    let store = RocksStore::open(dir.path()).unwrap();
    for h in 1..=100 {
        rt.block_on(store.insert_block(&make_block(h, 20))).unwrap();
    }
    let address = format!("0x{:040x}", 3);
    let page = Pagination::new(2, 25);

    c.bench_function("txs_by_address_page_2", |b| {
        b.iter(|| rt.block_on(store.txs_by_address(black_box(&address), &page)))
    });

    c.bench_function("latest_txs_page_2", |b| {
        b.iter(|| rt.block_on(store.latest_txs(black_box(&page))))
    });
}

criterion_group!(benches, bench_upsert, bench_address_lookup);
criterion_main!(benches);
