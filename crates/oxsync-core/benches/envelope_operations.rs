use std::hint::black_box;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use oxsync_core::crypto::wallet::NameKeys;
use oxsync_core::fs::{envelope, hash_relative_name, encrypt_relative_name};
use oxsync_core::{CryptoIdentity, REFERENCE_SEED};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

fn generate_test_data(size: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; size];
    rng.fill_bytes(&mut data);
    data
}

fn bench_name_operations(c: &mut Criterion) {
    let identity = CryptoIdentity::from_seed(REFERENCE_SEED).expect("seeded identity");
    let keys = NameKeys::derive(&identity).expect("name keys");
    let names = ["a.txt", "notes/todo.md", "very_long_file_name_that_shows_up_in_real_trees.json"];

    let mut group = c.benchmark_group("name_operations");
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(4));

    group.bench_function("hash", |b| {
        b.iter(|| {
            for name in &names {
                black_box(hash_relative_name(&keys, black_box(name)));
            }
        });
    });
    group.bench_function("encrypt", |b| {
        b.iter(|| {
            for name in &names {
                black_box(encrypt_relative_name(&keys, black_box(name)).expect("encrypt"));
            }
        });
    });
    group.finish();
}

fn bench_envelope(c: &mut Criterion) {
    let sender = CryptoIdentity::from_seed(REFERENCE_SEED).expect("seeded identity");
    let recipient = CryptoIdentity::random();
    let recipient_public = recipient.public_identity();

    let mut group = c.benchmark_group("envelope");
    for size in [1024usize, 8 * 1024, 32 * 1024] {
        let data = generate_test_data(size, 42);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("seal", size), &data, |b, data| {
            b.iter(|| {
                black_box(
                    envelope::seal(
                        sender.private_key(),
                        sender.did(),
                        &recipient_public,
                        b"hdr",
                        data,
                    )
                    .expect("seal"),
                )
            });
        });

        let sealed = envelope::seal(
            sender.private_key(),
            sender.did(),
            &recipient_public,
            b"hdr",
            &data,
        )
        .expect("seal");
        group.bench_with_input(BenchmarkId::new("open", size), &sealed, |b, sealed| {
            b.iter(|| {
                black_box(
                    envelope::open(sealed, recipient.private_key(), sender.public_key(), b"hdr")
                        .expect("open"),
                )
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_name_operations, bench_envelope);
criterion_main!(benches);
