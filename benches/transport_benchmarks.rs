//! Throughput benchmarks for the two worker transports
//!
//! Workers are forked once per benchmark; each iteration pulls a batch of
//! records through the running coordinator.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dataflow_prefetch::codec::{write_frame, Codec, JsonCodec};
use dataflow_prefetch::{Coordinator, PrefetchConfig, RangeSource};
use std::hint::black_box;
use tempfile::TempDir;

const BATCH: usize = 1000;

fn bench_pull(c: &mut Criterion) {
    let mut group = c.benchmark_group("pull_records");
    group.throughput(Throughput::Elements(BATCH as u64));

    for workers in [1, 4] {
        group.bench_with_input(BenchmarkId::new("queue", workers), &workers, |b, &workers| {
            let mut coordinator = Coordinator::spawn(
                RangeSource::without_size(0, 10_000),
                PrefetchConfig::queue(workers, 64),
            )
            .unwrap();
            b.iter(|| {
                for _ in 0..BATCH {
                    black_box(coordinator.next_record().unwrap());
                }
            });
            coordinator.close();
        });

        group.bench_with_input(BenchmarkId::new("message", workers), &workers, |b, &workers| {
            let dir = TempDir::new().unwrap();
            let config = PrefetchConfig::message(workers, dir.path())
                .with_buffer_depth(64)
                .with_send_hwm(8);
            let mut coordinator =
                Coordinator::spawn(RangeSource::without_size(0, 10_000), config).unwrap();
            b.iter(|| {
                for _ in 0..BATCH {
                    black_box(coordinator.next_record().unwrap());
                }
            });
            coordinator.close();
        });
    }

    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    let codec = JsonCodec;
    let record: Vec<u32> = (0..256).collect();

    group.bench_function("encode_frame", |b| {
        let mut out = Vec::with_capacity(4096);
        b.iter(|| {
            out.clear();
            let payload = codec.encode(black_box(&record)).unwrap();
            write_frame(&mut out, &payload).unwrap();
        });
    });

    let payload = codec.encode(&record).unwrap();
    group.bench_function("decode", |b| {
        b.iter(|| {
            let decoded: Vec<u32> = codec.decode(black_box(&payload)).unwrap();
            black_box(decoded);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_pull, bench_codec);
criterion_main!(benches);
