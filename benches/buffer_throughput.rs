//! Buffer Throughput Benchmarks
//!
//! Measures end-to-end transfer throughput through the coordinator
//! (producer thread → queue → pull reads) and the raw queue split path.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::io::Write;
use std::time::Duration;

use lamco_clipboard_vfile::clipboard::{
    BackpressurePolicy, BufferCoordinator, CoordinatorConfig, PendingQueue,
};

/// Generate test file content with a repeating pattern
fn generate_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Benchmark a full transfer at various consumer read sizes
fn bench_transfer(c: &mut Criterion) {
    let mut group = c.benchmark_group("transfer");
    group.sample_size(10);

    let data = generate_data(8 * 1024 * 1024);
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(&data).expect("write source");
    file.flush().expect("flush source");

    group.throughput(Throughput::Bytes(data.len() as u64));

    // Typical file-manager request sizes
    for read_size in [4 * 1024, 64 * 1024, 512 * 1024, 1024 * 1024] {
        group.bench_with_input(
            BenchmarkId::new("read_size", read_size),
            &read_size,
            |b, &read_size| {
                let coordinator = BufferCoordinator::new(CoordinatorConfig {
                    backpressure: BackpressurePolicy::Block,
                    producer_interval: Duration::ZERO,
                    wait_slice: Duration::from_millis(1),
                    ..Default::default()
                });
                let mut buf = vec![0u8; read_size];

                b.iter(|| {
                    coordinator.start_transfer(file.path(), "bench.bin", data.len() as u64);
                    let mut total = 0;
                    loop {
                        let n = coordinator.read(&mut buf);
                        if n == 0 {
                            break;
                        }
                        total += n;
                    }
                    black_box(total)
                })
            },
        );
    }

    group.finish();
}

/// Benchmark head splitting when reads are smaller than chunks
fn bench_queue_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_split");
    let chunk = Bytes::from(generate_data(512 * 1024));

    for read_size in [4 * 1024, 64 * 1024] {
        group.throughput(Throughput::Bytes(chunk.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("read_size", read_size),
            &read_size,
            |b, &read_size| {
                b.iter(|| {
                    let mut queue = PendingQueue::new(4);
                    queue.push_back(chunk.clone());
                    while let Some(piece) = queue.take(read_size) {
                        black_box(piece);
                    }
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_transfer, bench_queue_split);
criterion_main!(benches);
