//! A relative benchmark of a workload mixing inserts, positional erases and the traversal
//! needed to reach the erased position, run against both `BucketStorage` and `Vec`.
//!
//! Set `RUST_LOG=bucket_storage=trace` to see block allocations as they happen.

use std::hint::black_box;
use std::num::NonZero;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use argh::FromArgs;
use bucket_storage::{BucketStorage, DEFAULT_BLOCK_CAPACITY};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

/// Runs the same random insert/erase/iterate workload on a bucket storage and a vector.
#[derive(FromArgs)]
struct Args {
    /// how many operations to perform
    #[argh(option, default = "10_000")]
    iterations: usize,

    /// probability that an operation is an erase instead of an insert
    #[argh(option, default = "0.2")]
    delete_probability: f64,

    /// number of slots per storage block
    #[argh(option)]
    block_capacity: Option<usize>,

    /// seed for the operation sequence, so both containers see the same workload
    #[argh(option, default = "0")]
    seed: u64,
}

/// One step of the workload, decided up front so both containers do identical work.
#[derive(Clone, Copy, Debug)]
enum Operation {
    Insert(u64),
    EraseAt(f64),
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Args = argh::from_env();

    if !(0.0..=1.0).contains(&args.delete_probability) {
        eprintln!("--delete-probability must be between 0 and 1");
        return ExitCode::FAILURE;
    }

    let block_capacity = match args.block_capacity.map(NonZero::new) {
        None => DEFAULT_BLOCK_CAPACITY,
        Some(Some(block_capacity)) => block_capacity,
        Some(None) => {
            eprintln!("--block-capacity must be greater than zero");
            return ExitCode::FAILURE;
        }
    };

    let operations = generate(&args);

    println!(
        "Workload: {} operations, delete probability {}, block capacity {block_capacity}",
        args.iterations, args.delete_probability
    );

    let (storage_elapsed, storage_len) = run_storage(&operations, block_capacity);
    println!("BucketStorage: {storage_elapsed:?} ({storage_len} items remain)");

    let (vec_elapsed, vec_len) = run_vec(&operations);
    println!("Vec:           {vec_elapsed:?} ({vec_len} items remain)");

    if storage_len != vec_len {
        eprintln!("containers disagree on the final item count");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn generate(args: &Args) -> Vec<Operation> {
    let mut rng = StdRng::seed_from_u64(args.seed);

    (0_u64..)
        .take(args.iterations)
        .map(|index| {
            if rng.random::<f64>() <= args.delete_probability {
                // The position is a fraction of the length at the time of the erase.
                Operation::EraseAt(rng.random::<f64>())
            } else {
                Operation::Insert(index)
            }
        })
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

fn run_storage(operations: &[Operation], block_capacity: NonZero<usize>) -> (Duration, usize) {
    let mut storage = BucketStorage::with_block_capacity(block_capacity);

    let start = Instant::now();

    for operation in operations {
        match *operation {
            Operation::Insert(value) => {
                storage.insert(value);
            }
            Operation::EraseAt(fraction) if !storage.is_empty() => {
                let position = position_in(storage.len(), fraction);

                let mut cursor = storage.begin();
                for _ in 0..position {
                    cursor = storage.next(cursor);
                }

                storage.erase(cursor);
            }
            Operation::EraseAt(_) => {}
        }
    }

    (start.elapsed(), storage.len())
}

fn run_vec(operations: &[Operation]) -> (Duration, usize) {
    let mut items = Vec::new();

    let start = Instant::now();

    for operation in operations {
        match *operation {
            Operation::Insert(value) => items.push(value),
            Operation::EraseAt(fraction) if !items.is_empty() => {
                let position = position_in(items.len(), fraction);

                // Walk to the position the same way the storage has to.
                let mut iter = items.iter();
                for _ in 0..position {
                    black_box(iter.next());
                }

                items.remove(position);
            }
            Operation::EraseAt(_) => {}
        }
    }

    (start.elapsed(), items.len())
}
