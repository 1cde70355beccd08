//! Synchronization primitives.
//!
//! This is a thin re-export of [`std::sync`] plus one addition the scheduler
//! needs that the standard library doesn't provide: [`Event`], a manual/
//! automatic-reset signal used for group completion and worker wake-up.
//!
//! See the [standard library] for further details on the re-exported types.
//!
//! [standard library]: https://doc.rust-lang.org/std/sync/index.html

pub mod atomic;
mod event;

pub use std::sync::{
    Arc, Barrier, BarrierWaitResult, Condvar, LazyLock, LockResult, Mutex, MutexGuard, Once,
    OnceLock, OnceState, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError,
    TryLockResult, WaitTimeoutResult, Weak, mpsc,
};

pub use event::{Event, EventReset};
