//! PCM conversion benchmarks.
//!
//! Run with: cargo bench
//! Or for specific benchmarks: cargo bench -- <filter>

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use voxcall::audio::pcm;

/// Buffer sizes spanning one capture chunk up to a long synthesized reply.
const BUFFER_SIZES: &[usize] = &[256, 4096, 65536];

fn float_buffer(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| ((i as f32) * 0.013).sin())
        .collect()
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("pcm_encode");
    for &size in BUFFER_SIZES {
        let samples = float_buffer(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &samples, |b, samples| {
            b.iter(|| pcm::encode(black_box(samples)));
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("pcm_decode");
    for &size in BUFFER_SIZES {
        let frame = pcm::encode(&float_buffer(size));
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &frame, |b, frame| {
            b.iter(|| pcm::decode(black_box(frame)));
        });
    }
    group.finish();
}

fn bench_le_bytes(c: &mut Criterion) {
    let mut group = c.benchmark_group("pcm_le_bytes");
    for &size in BUFFER_SIZES {
        let frame = pcm::encode(&float_buffer(size));
        let bytes = pcm::to_le_bytes(&frame);
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::new("pack", size), &frame, |b, frame| {
            b.iter(|| pcm::to_le_bytes(black_box(frame)));
        });
        group.bench_with_input(BenchmarkId::new("unpack", size), &bytes, |b, bytes| {
            b.iter(|| pcm::from_le_bytes(black_box(bytes)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_le_bytes);
criterion_main!(benches);
