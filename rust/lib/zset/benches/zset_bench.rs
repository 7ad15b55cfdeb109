use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::TempDir;

use feedline_zset::{MemoryZSet, RedbZSet, WriteBatch, ZSetStore};

/// One fan-out chunk: 1000 timelines receive the same member.
fn chunk_batch(seq: i64) -> WriteBatch {
    let mut batch = WriteBatch::with_capacity(3000);
    let member = format!("post:author:{seq}");
    for u in 0..1000 {
        let key = format!("timeline:user-{u:04}");
        batch.add(key.clone(), member.clone(), seq);
        batch.trim_to_top(key.clone(), 500);
        batch.expire(key, Duration::from_secs(30 * 24 * 3600));
    }
    batch
}

fn bench_redb_chunk(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    let store = RedbZSet::open(&tmp.path().join("bench.redb")).unwrap();

    c.bench_function("redb_apply_chunk_1000", |b| {
        let mut seq = 0i64;
        b.iter(|| {
            store.apply(black_box(&chunk_batch(seq))).unwrap();
            seq += 1;
        });
    });
}

fn bench_memory_chunk(c: &mut Criterion) {
    let store = MemoryZSet::new();

    c.bench_function("memory_apply_chunk_1000", |b| {
        let mut seq = 0i64;
        b.iter(|| {
            store.apply(black_box(&chunk_batch(seq))).unwrap();
            seq += 1;
        });
    });
}

fn bench_redb_rev_range(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    let store = RedbZSet::open(&tmp.path().join("bench.redb")).unwrap();

    let mut batch = WriteBatch::new();
    for i in 0..500 {
        batch.add("timeline:reader", format!("post:a:{i}"), i);
    }
    store.apply(&batch).unwrap();

    c.bench_function("redb_rev_range_page_20", |b| {
        b.iter(|| {
            let _ = store.rev_range(black_box("timeline:reader"), 100, 119).unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_redb_chunk,
    bench_memory_chunk,
    bench_redb_rev_range
);
criterion_main!(benches);
