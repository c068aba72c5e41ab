use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// How long a test may run before the watchdog gives up on it.
#[cfg(not(miri))]
const TIMEOUT: Duration = Duration::from_secs(30);

/// Miri runs orders of magnitude slower, so it gets a generous allowance.
#[cfg(miri)]
const TIMEOUT: Duration = Duration::from_secs(600);

/// Runs `test_fn` on a separate thread and panics if it does not finish in time.
///
/// Long randomized tests use this so that a bug that makes a traversal loop forever shows up
/// as a failed test instead of a hung test run. Setting `MUTATION_TESTING=1` disables the
/// watchdog so that mutation testing can observe the hang itself.
///
/// # Panics
///
/// Panics if the test exceeds the timeout, or re-raises the panic of the test itself.
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let handle = thread::spawn(move || {
        let result = test_fn();

        // The receiver is gone only if we already timed out, in which case nobody cares.
        _ = tx.send(());

        result
    });

    // A disconnect means the test panicked, which the join below reports.
    if rx.recv_timeout(TIMEOUT) == Err(RecvTimeoutError::Timeout) {
        panic!("test did not complete within {TIMEOUT:?}");
    }

    match handle.join() {
        Ok(result) => result,
        Err(payload) => std::panic::resume_unwind(payload),
    }
}
