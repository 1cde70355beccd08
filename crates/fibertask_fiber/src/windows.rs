#![expect(unsafe_code, reason = "the Win32 fiber API has no safe wrapper")]

use crate::stack::Stack;
use std::ffi::c_void;
use windows_sys::Win32::System::Threading::{
    ConvertThreadToFiber, CreateFiberEx, DeleteFiber, SwitchToFiber,
};

type BoxedEntry = Box<dyn FnOnce() + 'static>;

pub struct Context {
    handle: *mut c_void,
    owned: bool,
    // Kept alive for as long as the fiber may still be switched to.
    _stack: Option<Stack>,
}

// Safety: a fiber handle is only ever switched into or out of by the one
// worker thread that owns it at a time; shared references across threads
// (e.g. `FiberPool::fiber_context`) never switch concurrently, only the
// owning thread ever calls `switch` on it.
unsafe impl Send for Context {}
unsafe impl Sync for Context {}

impl Context {
    /// Converts the calling thread into a fiber so it can be switched away
    /// from and back to. Used once per worker to create the context the
    /// scheduler fiber switches back to.
    pub fn capture() -> Self {
        // Safety: valid to call from any thread not already a fiber.
        let handle = unsafe { ConvertThreadToFiber(std::ptr::null()) };
        assert!(!handle.is_null(), "ConvertThreadToFiber failed");
        Self {
            handle,
            owned: false,
            _stack: None,
        }
    }

    /// Creates a fiber that, the first time it is switched to, runs `entry`
    /// on `stack` and then never returns.
    pub fn new(stack: Stack, entry: BoxedEntry) -> Self {
        let raw = Box::into_raw(Box::new(entry)).cast::<c_void>();
        // Safety: `stack.usable_size()` bytes starting at the fiber's
        // reserved region are committed and writable; `trampoline` matches
        // `LPFIBER_START_ROUTINE`.
        let handle = unsafe {
            CreateFiberEx(
                stack.usable_size(),
                stack.usable_size(),
                0,
                Some(trampoline),
                raw,
            )
        };
        assert!(!handle.is_null(), "CreateFiberEx failed");
        Self {
            handle,
            owned: true,
            _stack: Some(stack),
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if self.owned {
            // Safety: `handle` was created by `CreateFiberEx` above and is
            // not the fiber currently running.
            unsafe { DeleteFiber(self.handle) };
        }
    }
}

unsafe extern "system" fn trampoline(param: *mut c_void) {
    // Safety: `param` was produced by `Box::into_raw(Box::new(entry))` above
    // and is only ever handed to this trampoline once.
    let entry = unsafe { Box::from_raw(param.cast::<BoxedEntry>()) };
    (*entry)();
    // A fiber's body must suspend itself (yield / wait_group / return) before
    // its closure returns; reaching this point means it didn't.
    std::process::abort();
}

/// Switches execution from `from` to `to`. Returns once some other context
/// switches back into `from`.
///
/// # Safety
/// `from` must be the fiber actually running on the calling thread right now.
pub unsafe fn switch(_from: &Context, to: &Context) {
    // Safety: `to.handle` was created by `Context::new`/`Context::capture`.
    unsafe { SwitchToFiber(to.handle) };
}
