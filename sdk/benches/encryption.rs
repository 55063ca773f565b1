#![allow(
    clippy::unwrap_used,
    clippy::default_numeric_fallback,
    reason = "benchmark"
)]

use {
    criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main},
    futures::TryStreamExt,
    sealdrop_protocol::{ObjectContext, ObjectIndex, SharedSecret},
    sealdrop_sdk::crypto::{BLOCK_SIZE, ObjectCipher, encrypt},
};

fn context() -> ObjectContext {
    ObjectContext {
        bucket: "bench".parse().unwrap(),
        index: ObjectIndex::from_bytes([5; 32]),
    }
}

fn criterion_benchmark(c: &mut Criterion) {
    let secret = SharedSecret::generate().unwrap();
    let context = context();
    let cipher = ObjectCipher::derive(&secret, &context).unwrap();

    let mut group = c.benchmark_group("encrypt_block");
    for size in [1024, BLOCK_SIZE] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || (0..size).map(|_| rand::random::<u8>()).collect::<Vec<u8>>(),
                |input| cipher.encrypt_block(0, &input).unwrap(),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("encrypt_stream");
    group.sample_size(10);
    for size in [BLOCK_SIZE, 8 * BLOCK_SIZE] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || (0..size).map(|_| rand::random::<u8>()).collect::<Vec<u8>>(),
                |input| {
                    let len = u64::try_from(input.len()).unwrap();
                    runtime.block_on(async {
                        encrypt(std::io::Cursor::new(input), len, &secret, &context)
                            .unwrap()
                            .try_for_each(|_| async { Ok(()) })
                            .await
                            .unwrap();
                    });
                },
                BatchSize::LargeInput,
            );
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
