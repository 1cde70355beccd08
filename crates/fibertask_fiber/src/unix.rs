#![expect(unsafe_code, reason = "ucontext is inherently unsafe")]

use crate::stack::Stack;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

/// A suspended point of execution: either a bare thread context captured with
/// `getcontext`, or a fresh context set up with `makecontext` to run a
/// boxed closure the first time it is switched to.
pub struct Context {
    ucontext: Box<UnsafeCell<libc::ucontext_t>>,
    // Kept alive for as long as the fiber may still be switched to; dropped
    // together with the context.
    _stack: Option<Stack>,
}

type BoxedEntry = Box<dyn FnOnce() + 'static>;

impl Context {
    /// Captures the calling thread's current state. Used once per worker to
    /// create the context the scheduler fiber switches back to.
    pub fn capture() -> Self {
        let mut ucontext = Box::new(UnsafeCell::new(unsafe { zeroed_ucontext() }));
        // Safety: `ucontext` points at valid, owned storage.
        unsafe { libc::getcontext(ucontext.get_mut()) };
        Self {
            ucontext,
            _stack: None,
        }
    }

    /// Builds a context that, the first time it is switched to, runs `entry`
    /// on `stack` and then never returns (the entry is responsible for
    /// switching away before it would fall off the end of the closure).
    pub fn new(stack: Stack, entry: BoxedEntry) -> Self {
        let mut ucontext = Box::new(UnsafeCell::new(unsafe { zeroed_ucontext() }));

        // Safety: `ucontext` is valid storage; `getcontext` fills in a
        // baseline we then edit before calling `makecontext`.
        unsafe { libc::getcontext(ucontext.get_mut()) };

        {
            let uc = ucontext.get_mut();
            uc.uc_stack.ss_sp = stack.top().cast();
            uc.uc_stack.ss_size = stack.usable_size();
            uc.uc_stack.ss_flags = 0;
            uc.uc_link = std::ptr::null_mut();
        }

        // `makecontext` only accepts `int` arguments, so a 64-bit pointer to
        // the boxed entry is split into two 32-bit halves.
        let raw = Box::into_raw(Box::new(entry)) as usize;
        let hi = (raw >> 32) as u32;
        let lo = (raw & 0xFFFF_FFFF) as u32;

        // Safety: `uc_stack` was just set to a valid, writable region above;
        // `trampoline` matches the two-`u32`-argument calling convention
        // `makecontext` expects on this platform.
        unsafe {
            let func: extern "C" fn() = std::mem::transmute(trampoline as extern "C" fn(u32, u32));
            libc::makecontext(ucontext.get_mut(), func, 2, hi, lo);
        }

        Self {
            ucontext,
            _stack: Some(stack),
        }
    }

    fn ptr(&self) -> *mut libc::ucontext_t {
        self.ucontext.get()
    }
}

// Safety: a `Context` is only ever switched into or out of by the one OS
// thread that currently owns its fiber slot, never touched concurrently by
// two threads; moving it (and its `Box<UnsafeCell<ucontext_t>>`) to another
// thread before that thread switches into it is exactly how a worker thread
// installs fiber contexts built on the thread that constructed the pool.
unsafe impl Send for Context {}
unsafe impl Sync for Context {}

unsafe fn zeroed_ucontext() -> libc::ucontext_t {
    // Safety: ucontext_t is a plain-old-data struct; `getcontext`/`makecontext`
    // fill in every field that matters before it is ever switched to.
    unsafe { MaybeUninit::zeroed().assume_init() }
}

extern "C" fn trampoline(hi: u32, lo: u32) {
    let raw = ((hi as usize) << 32) | lo as usize;
    // Safety: `raw` was produced by `Box::into_raw(Box::new(entry))` above
    // and is only ever handed to this trampoline once.
    let entry = unsafe { Box::from_raw(raw as *mut BoxedEntry) };
    (*entry)();
    // A fiber's body must suspend itself (yield / wait_group / return) before
    // its closure returns; reaching this point means it didn't.
    std::process::abort();
}

/// Switches execution from `from` to `to`. Returns once some other context
/// switches back into `from`.
///
/// # Safety
/// Both contexts must belong to stacks that are still live, and `from` must
/// be the context actually running on the calling thread right now.
pub unsafe fn switch(from: &Context, to: &Context) {
    // Safety: upheld by the caller's contract above.
    unsafe { libc::swapcontext(from.ptr(), to.ptr()) };
}
