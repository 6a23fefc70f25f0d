//! Performance benchmarks for hashcash search and address derivation

use alloy_primitives::Address;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hashcash_approval::crypto::KeccakHasher;
use hashcash_approval::{
    derive_address, Difficulty, HashcashSearch, InitCode, ProxyDeployment, Salt, SearchParams, SenderNonce,
    TrialNonce,
};
use std::hint::black_box;

fn bench_hash_computation(c: &mut Criterion) {
    let mut hasher = KeccakHasher::new(Address::repeat_byte(0x11), SenderNonce::from(1));
    let mut nonce = TrialNonce::default();

    let mut group = c.benchmark_group("keccak");
    group.throughput(Throughput::Elements(1));
    group.bench_function("hash_and_check", |b| {
        b.iter(|| {
            nonce.increment();
            black_box(hasher.hash_and_check(nonce, Difficulty::new(16)));
        });
    });
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    group.sample_size(20);

    for bits in [4u8, 8, 12] {
        let params = SearchParams::new(Address::repeat_byte(0x11), SenderNonce::from(1), Difficulty::new(bits));
        group.bench_with_input(BenchmarkId::new("solve", bits), &params, |b, params| {
            b.iter(|| black_box(HashcashSearch::new(*params).solve()));
        });
    }
    group.finish();
}

fn bench_derivation(c: &mut Criterion) {
    let init_code = InitCode::new(vec![0x60u8; 512]);
    let salt = Salt::from(42u64);

    c.bench_function("derive_address", |b| {
        b.iter(|| black_box(derive_address(Address::repeat_byte(0xfa), &salt, &init_code)));
    });

    let deployment = ProxyDeployment::new(Address::repeat_byte(0xfa), vec![0x60u8; 512]);
    c.bench_function("proxy_address", |b| {
        b.iter(|| black_box(deployment.proxy_address(Address::repeat_byte(0x01))));
    });
}

criterion_group!(benches, bench_hash_computation, bench_search, bench_derivation);
criterion_main!(benches);
