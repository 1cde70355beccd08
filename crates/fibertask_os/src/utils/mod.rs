//! Low-level synchronization primitives and concurrent data structures
//! built on atomic operations.
//!
//! ## Primitives
//!
//! - [`OnceFlag`] : A lightweight flag ensuring true appears only once. Useful for
//!   one-time initialization patterns.
//! - [`Futex`] : A resource-free spinlock, serving as the most basic synchronization primitive.
//! - [`SpinLock`] : A spinlock similar to Mutex, but threads busy-wait instead of sleeping.
//! - [`CachePadded`] : Pads and aligns a value to the size of a cache line, to avoid false sharing.
//!
//! ## Concurrent Queues
//!
//! - [`ArrayQueue`] : A bounded queue implementation (from crossbeam-queue) using a fixed-size
//!   circular array. Suitable for producer-consumer patterns with known capacity limits.

// -----------------------------------------------------------------------------
// Modules

mod array_queue;
mod backoff;
mod cache_padded;
mod futex;
mod once_flag;
mod spin_lock;

// -----------------------------------------------------------------------------
// Exports

pub use array_queue::ArrayQueue;
pub use backoff::Backoff;
pub use cache_padded::CachePadded;
pub use futex::Futex;
pub use once_flag::OnceFlag;
pub use spin_lock::{SpinLock, SpinLockGuard};

// -----------------------------------------------------------------------------
// Utils for test

#[cfg(test)]
#[allow(dead_code, reason = "tests")]
pub(crate) mod tests {
    use std::any::Any;
    use std::panic::AssertUnwindSafe;
    use std::sync::atomic;
    use std::{panic, thread};

    pub(crate) fn test_unwind_panic<R>(f: impl FnOnce() -> R) -> Result<R, Box<dyn Any + Send>> {
        let prev_hook = panic::take_hook();
        panic::set_hook(Box::new(|_| {}));

        let result = panic::catch_unwind(AssertUnwindSafe(f));

        panic::set_hook(prev_hook);
        result
    }

    pub(crate) fn test_thread_panic<F, T>(f: F) -> Result<T, Box<dyn Any + Send>>
    where
        F: FnOnce() -> T,
        F: Send + 'static,
        T: Send + 'static,
    {
        let prev_hook = panic::take_hook();
        panic::set_hook(Box::new(|_| {}));
        atomic::fence(atomic::Ordering::SeqCst);
        let result = thread::spawn(f).join();
        panic::set_hook(prev_hook);
        result
    }
}
