//! Garbage collector tick benchmarks.

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use std::sync::Arc;
use std::time::Duration;
use strata_core::{Collection, CollectionKind, Collections, JournalConfig};
use strata_segment::MemoryBackend;
use strata_server::run_tick;

fn create_collections(count: usize, capacity: u64) -> (Collections, Vec<Arc<Collection>>) {
    let backend = Arc::new(MemoryBackend::new());
    let collections = Collections::new();
    let mut loaded = Vec::with_capacity(count);

    for i in 0..count {
        let name = format!("collection-{:04}", i);
        let collection = Collection::new(
            name.as_str(),
            CollectionKind::Document,
            JournalConfig::new(format!("mem/{}", name)).with_capacity(capacity),
            backend.clone(),
        )
        .unwrap();
        loaded.push(collections.load(collection).unwrap());
    }

    // First tick creates the open segments.
    run_tick(&collections);
    (collections, loaded)
}

fn bench_idle_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("gc_tick_idle");

    for count in [1usize, 16, 256] {
        let (collections, _loaded) = create_collections(count, 64 * 1024);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| black_box(run_tick(&collections)));
        });
    }

    group.finish();
}

fn bench_tick_with_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("gc_tick_with_writes");
    let record = vec![0x5Au8; 4096];

    for count in [1usize, 16, 64] {
        group.throughput(Throughput::Bytes((count * record.len()) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || {
                    // Each record fills its journal, so the tick flushes,
                    // seals, and creates a replacement in every collection.
                    let (collections, loaded) = create_collections(count, record.len() as u64);
                    for collection in &loaded {
                        collection
                            .journals()
                            .append(&record, Duration::ZERO)
                            .unwrap();
                    }
                    collections
                },
                |collections| black_box(run_tick(&collections)),
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_idle_tick, bench_tick_with_writes);
criterion_main!(benches);
