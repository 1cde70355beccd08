//! Atomic integer and flag types with acquire/release semantics.
//!
//! A native host with real OS threads always has full hardware atomic
//! support, so this is a plain re-export of [`core::sync::atomic`] rather
//! than the teacher's `portable_atomic`-fallback dispatch.

pub use core::sync::atomic::{
    AtomicBool, AtomicI8, AtomicI16, AtomicI32, AtomicI64, AtomicIsize, AtomicPtr, AtomicU8,
    AtomicU16, AtomicU32, AtomicU64, AtomicUsize, Ordering, compiler_fence, fence,
};
