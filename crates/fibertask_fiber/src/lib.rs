//! Fiber allocation and stack-switch primitives.
//!
//! A [`Fiber`] pairs a guarded stack with a suspended point of execution.
//! Switching into a fiber for the first time runs its entry closure; the
//! closure is expected to suspend itself (by switching back out) at one of
//! its own suspension points rather than returning normally. Switching into
//! a fiber that already suspended itself resumes it exactly where it left
//! off.
//!
//! This crate only provides the raw switch mechanism (POSIX `ucontext` on
//! Unix, the native Fiber API on Windows). It has no notion of scheduling,
//! task queues, or groups; that lives above it.
#![expect(unsafe_code, reason = "stack switching cannot be expressed safely")]

mod stack;
#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

pub use stack::{Stack, MIN_STACK_SIZE};

#[cfg(unix)]
use unix as imp;
#[cfg(windows)]
use windows as imp;

/// A point execution can be switched to and, later, switched back from.
pub struct Context(imp::Context);

impl Context {
    /// Captures the calling thread as a context other fibers can switch back
    /// into. Call this once per worker thread before ever switching into a
    /// fiber on it.
    pub fn capture() -> Self {
        Self(imp::Context::capture())
    }

    /// Switches execution from `from` to `to`. Returns once some other
    /// context switches back into `from`.
    ///
    /// # Safety
    /// `from` must be the context currently executing on the calling thread,
    /// and both contexts' stacks must outlive the switch.
    pub unsafe fn switch(from: &Context, to: &Context) {
        // Safety: upheld by the caller.
        unsafe { imp::switch(&from.0, &to.0) };
    }
}

/// A fiber: a guarded stack plus the context that runs on it.
pub struct Fiber {
    context: Context,
}

impl Fiber {
    /// Allocates a stack of at least `stack_size` bytes and prepares it to
    /// run `entry` the first time this fiber is switched into.
    pub fn new(stack_size: usize, entry: impl FnOnce() + 'static) -> std::io::Result<Self> {
        let stack = Stack::new(stack_size)?;
        Ok(Self {
            context: Context(imp::Context::new(stack, Box::new(entry))),
        })
    }

    /// The context to pass to [`Context::switch`] to resume this fiber.
    pub fn context(&self) -> &Context {
        &self.context
    }
}
