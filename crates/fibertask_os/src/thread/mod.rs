//! Thread helpers: `sleep` and an estimate of available hardware parallelism,
//! used to size the scheduler's default worker count.

use std::num::NonZero;

pub use std::thread::sleep;

/// Returns an estimate of the default amount of parallelism a program should use.
///
/// Thin wrapper over [`std::thread::available_parallelism`] that falls back
/// to `1` if the platform cannot report a figure. We guarantee `result > 0`.
pub fn available_parallelism() -> NonZero<usize> {
    std::thread::available_parallelism().unwrap_or(NonZero::new(1).unwrap())
}
