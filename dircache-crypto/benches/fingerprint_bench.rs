//! Criterion benchmarks for dircache hashing: fingerprints and snapshot checksums.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dircache_crypto::{fingerprint, snapshot_checksum};

fn bench_fingerprint(c: &mut Criterion) {
    let mut g = c.benchmark_group("fingerprint");
    g.throughput(Throughput::Elements(1));
    g.bench_function("fingerprint", |b| {
        b.iter(|| {
            black_box(fingerprint(
                black_box("ldap.example.org"),
                black_box(389),
                black_box("uid"),
                black_box("u501565"),
            ))
        });
    });
    g.finish();
}

fn bench_checksum(c: &mut Criterion) {
    let mut g = c.benchmark_group("snapshot_checksum");
    for size in [1024usize, 64 * 1024, 1024 * 1024] {
        let payload = vec![0x42u8; size];
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| black_box(snapshot_checksum(payload)));
        });
    }
    g.finish();
}

criterion_group!(benches, bench_fingerprint, bench_checksum);
criterion_main!(benches);
