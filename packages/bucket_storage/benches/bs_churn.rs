//! Benchmarks of mixed insert and erase workloads, where slot reuse and the free block index
//! matter, compared against the same workload on a `Vec`.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::time::Instant;

use bucket_storage::{BucketStorage, Cursor};
use criterion::{Criterion, criterion_group, criterion_main};
use new_zealand::nz;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

const OPERATIONS: usize = 1_000;
const ERASE_PROBABILITY: f64 = 0.2;

/// Pre-decided erase positions (as a fraction of the length at erase time), or `None` for an
/// insert, so every measured iteration does identical work.
fn workload() -> Vec<Option<f64>> {
    let mut rng = StdRng::seed_from_u64(1234);

    (0..OPERATIONS)
        .map(|_| (rng.random::<f64>() <= ERASE_PROBABILITY).then(|| rng.random::<f64>()))
        .collect()
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    reason = "scaling a fraction to a position only needs to be approximately right"
)]
fn position_in(len: usize, fraction: f64) -> usize {
    ((len as f64 * fraction) as usize).min(len.saturating_sub(1))
}

fn entrypoint(c: &mut Criterion) {
    let operations = workload();

    let mut group = c.benchmark_group("bs_churn");

    group.bench_function("insert_erase_iter", |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                let mut storage = BucketStorage::with_block_capacity(nz!(64));

                for (value, operation) in operations.iter().enumerate() {
                    match operation {
                        Some(fraction) if !storage.is_empty() => {
                            let position = position_in(storage.len(), *fraction);
                            let cursor = storage.advance_by(storage.begin(), position);
                            storage.erase(cursor);
                        }
                        Some(_) => {}
                        None => {
                            storage.insert(black_box(value));
                        }
                    }
                }

                drop(black_box(storage));
            }

            start.elapsed()
        });
    });

    group.bench_function("insert_erase_iter_vec", |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                let mut items = Vec::new();

                for (value, operation) in operations.iter().enumerate() {
                    match operation {
                        Some(fraction) if !items.is_empty() => {
                            let position = position_in(items.len(), *fraction);
                            items.remove(position);
                        }
                        Some(_) => {}
                        None => items.push(black_box(value)),
                    }
                }

                drop(black_box(items));
            }

            start.elapsed()
        });
    });

    group.bench_function("erase_reinsert_full", |b| {
        b.iter_custom(|iters| {
            let mut storage = BucketStorage::with_block_capacity(nz!(64));
            let mut cursors: Vec<Cursor> =
                (0..10_000_usize).map(|value| storage.insert(value)).collect();

            let start = Instant::now();

            for index in 0..iters {
                let slot = usize::try_from(index).unwrap() % cursors.len();

                // The only vacancy is the one we just made, so the insert reuses it.
                storage.erase(cursors[slot]);
                cursors[slot] = black_box(storage.insert(black_box(slot)));
            }

            start.elapsed()
        });
    });

    group.finish();
}
