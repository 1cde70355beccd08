//! Platform primitives for the scheduler: atomics, a scoped mutex and
//! manual/automatic-reset event, thread helpers, and a handful of
//! lock-free utility types used as building blocks for the worker queues.

pub mod sync;
pub mod thread;
pub mod time;
pub mod utils;
