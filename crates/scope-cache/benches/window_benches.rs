//! Criterion benchmarks for the block window.
//!
//! Covers: steady-state insert with eviction, lookup by height and hash,
//! and paging over the flattened transaction stream.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use scope_cache::BlockWindow;
use scope_core::pagination::Pagination;
use scope_core::types::{Block, Transaction};

fn make_block(height: u64, txs: u64) -> Block {
    let hash = format!("0x{height:064x}");
    Block {
        height,
        hash: hash.clone(),
        parent_hash: format!("0x{:064x}", height.saturating_sub(1)),
        tx_count: txs,
        txs: (0..txs)
            .map(|i| Transaction {
                hash: format!("{hash}{i:04}"),
                block_number: height,
                block_hash: hash.clone(),
                transaction_index: i,
                nonce: i,
                ..Transaction::default()
            })
            .collect(),
        ..Block::default()
    }
}

/// A full window of `capacity` blocks at heights `1..=capacity`.
fn full_window(capacity: usize, txs: u64) -> BlockWindow {
    let mut window = BlockWindow::new(capacity);
    for h in 1..=capacity as u64 {
        let block = make_block(h, txs);
        window.insert_block(&block).unwrap();
        window.insert_transactions_of_block(&block).unwrap();
    }
    window
}

fn bench_insert_with_eviction(c: &mut Criterion) {
    // Blocks are pre-built so only insert + evict is timed.
    let blocks: Vec<Block> = (1_001..=2_000).map(|h| make_block(h, 0)).collect();
    c.bench_function("insert_with_eviction", |b| {
        b.iter_with_setup(
            || full_window(1_000, 0),
            |mut window| {
                for block in &blocks {
                    window.insert_block(black_box(block)).unwrap();
                }
            },
        )
    });
}

fn bench_lookup(c: &mut Criterion) {
    let window = full_window(1_000, 4);
    let hash = format!("0x{:064x}", 500u64);

    c.bench_function("block_by_height", |b| {
        b.iter(|| window.block_by_height(black_box(500)))
    });

    c.bench_function("block_by_hash", |b| {
        b.iter(|| window.block_by_hash(black_box(&hash)))
    });

    c.bench_function("block_by_height_miss", |b| {
        b.iter(|| window.block_by_height(black_box(5_000)))
    });
}

fn bench_latest_transactions(c: &mut Criterion) {
    let window = full_window(1_000, 10);
    let page = Pagination::new(50, 100);
    c.bench_function("latest_transactions_page_50", |b| {
        b.iter(|| window.latest_transactions(black_box(&page)))
    });
}

criterion_group!(
    benches,
    bench_insert_with_eviction,
    bench_lookup,
    bench_latest_transactions
);
criterion_main!(benches);
