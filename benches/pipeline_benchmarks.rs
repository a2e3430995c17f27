//! Pipeline benchmarks

use criterion::{criterion_group, criterion_main, Criterion};
use pluggable_cache::prelude::*;
use serde_json::json;
use std::hint::black_box;
use std::sync::Arc;

fn benchmark_single_items(c: &mut Criterion) {
    let storage = CacheStorage::new(MemoryAdapter::new()).unwrap();
    storage.set_item("key", json!({"payload": [1, 2, 3]})).unwrap();

    c.bench_function("get_item_no_listeners", |b| {
        b.iter(|| black_box(storage.get_item(black_box("key")).unwrap()))
    });

    c.bench_function("set_item_no_listeners", |b| {
        b.iter(|| black_box(storage.set_item(black_box("key"), json!(1)).unwrap()))
    });
}

fn benchmark_with_plugins(c: &mut Criterion) {
    let mut storage = CacheStorage::new(MemoryAdapter::new()).unwrap();
    storage.add_plugin(Arc::new(ClearExpiredByFactor::with_factor(100))).unwrap();
    storage.add_plugin(Arc::new(ExceptionHandler::default())).unwrap();

    c.bench_function("set_item_with_plugins", |b| {
        b.iter(|| black_box(storage.set_item(black_box("key"), json!(1)).unwrap()))
    });
}

fn benchmark_batches(c: &mut Criterion) {
    let storage = CacheStorage::new(MemoryAdapter::new()).unwrap();
    let pairs: Vec<(String, Value)> = (0..100).map(|i| (format!("key{}", i), json!(i))).collect();
    let keys: Vec<String> = pairs.iter().map(|(key, _)| key.clone()).collect();

    c.bench_function("set_items_100", |b| {
        b.iter(|| black_box(storage.set_items(pairs.clone()).unwrap()))
    });

    c.bench_function("get_items_100", |b| {
        b.iter(|| black_box(storage.get_items(&keys).unwrap()))
    });
}

criterion_group!(benches, benchmark_single_items, benchmark_with_plugins, benchmark_batches);
criterion_main!(benches);
