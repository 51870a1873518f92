use bintext::{base64_hex, Converter, ASCII85_B_TO_A, BASE128, BASE32, BASE64, HEX};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

fn sample(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    for size in [64usize, 1024, 16384] {
        group.throughput(Throughput::Bytes(size as u64));
        let data = sample(size);

        group.bench_with_input(BenchmarkId::new("hex", size), &data, |b, data| {
            b.iter(|| HEX.encode(black_box(data)));
        });
        group.bench_with_input(BenchmarkId::new("base32", size), &data, |b, data| {
            b.iter(|| BASE32.encode(black_box(data)));
        });
        group.bench_with_input(BenchmarkId::new("base64", size), &data, |b, data| {
            b.iter(|| BASE64.encode(black_box(data)));
        });
        group.bench_with_input(BenchmarkId::new("base64hex", size), &data, |b, data| {
            b.iter(|| base64_hex::encode_to_string(black_box(data)));
        });
        group.bench_with_input(BenchmarkId::new("base128", size), &data, |b, data| {
            b.iter(|| BASE128.encode(black_box(data)));
        });
        group.bench_with_input(BenchmarkId::new("ascii85", size), &data, |b, data| {
            b.iter(|| ASCII85_B_TO_A.encode(black_box(data)));
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for size in [64usize, 1024, 16384] {
        group.throughput(Throughput::Bytes(size as u64));
        let data = sample(size);

        let encoded = HEX.encode(&data);
        group.bench_with_input(BenchmarkId::new("hex", size), &encoded, |b, encoded| {
            b.iter(|| HEX.decode(black_box(encoded)).unwrap());
        });
        let encoded = BASE32.encode(&data);
        group.bench_with_input(BenchmarkId::new("base32", size), &encoded, |b, encoded| {
            b.iter(|| BASE32.decode(black_box(encoded)).unwrap());
        });
        let encoded = BASE64.encode(&data);
        group.bench_with_input(BenchmarkId::new("base64", size), &encoded, |b, encoded| {
            b.iter(|| BASE64.decode(black_box(encoded)).unwrap());
        });
        let encoded = ASCII85_B_TO_A.encode(&data);
        group.bench_with_input(BenchmarkId::new("ascii85", size), &encoded, |b, encoded| {
            b.iter(|| ASCII85_B_TO_A.decode(black_box(encoded)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
