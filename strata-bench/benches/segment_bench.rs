//! Segment benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use strata_segment::{MemoryBackend, MmapBackend, Segment, StorageBackend};
use tempfile::TempDir;

const CAPACITY: u64 = 64 * 1024 * 1024;

struct Writer {
    dir: TempDir,
    backend: Arc<dyn StorageBackend>,
    segment: Segment,
}

impl Writer {
    fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let dir = TempDir::new().unwrap();
        let segment = Segment::create(backend.as_ref(), dir.path(), 1, CAPACITY).unwrap();
        Self {
            dir,
            backend,
            segment,
        }
    }

    fn append(&mut self, data: &[u8]) -> u64 {
        if !self.segment.can_fit(data.len() as u64) {
            let id = self.segment.id() + 1;
            self.segment =
                Segment::create(self.backend.as_ref(), self.dir.path(), id, CAPACITY).unwrap();
        }
        self.segment.append(data).unwrap()
    }
}

fn backends() -> Vec<(&'static str, Arc<dyn StorageBackend>)> {
    let memory: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    let mmap: Arc<dyn StorageBackend> = Arc::new(MmapBackend);
    vec![("memory", memory), ("mmap", mmap)]
}

fn bench_segment_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_append");

    for (name, backend) in backends() {
        for size in [64usize, 1024, 16 * 1024] {
            let mut writer = Writer::new(backend.clone());
            let record = vec![0xABu8; size];

            group.throughput(Throughput::Bytes(size as u64));
            group.bench_with_input(BenchmarkId::new(name, size), &record, |b, record| {
                b.iter(|| black_box(writer.append(record)));
            });
        }
    }

    group.finish();
}

fn bench_segment_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_append_flush");

    for (name, backend) in backends() {
        for size in [1024usize, 64 * 1024] {
            let mut writer = Writer::new(backend.clone());
            let record = vec![0xCDu8; size];

            group.throughput(Throughput::Bytes(size as u64));
            group.bench_with_input(BenchmarkId::new(name, size), &record, |b, record| {
                b.iter(|| {
                    writer.append(record);
                    black_box(writer.segment.flush().unwrap())
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_segment_append, bench_segment_flush);
criterion_main!(benches);
