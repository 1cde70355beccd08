#![expect(unsafe_code, reason = "fiber slots are shared across threads by protocol, not by the type system")]

use std::cell::UnsafeCell;

use fibertask_fiber::{Context, Fiber};
use fibertask_os::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use fibertask_os::sync::{Mutex, PoisonError};

use crate::desc::TaskDesc;
use crate::group::GroupIndex;

const FREE: u8 = 0;
const EXECUTING: u8 = 1;
const SUSPENDED: u8 = 2;

/// A task bound to a fiber slot, written by a worker immediately before it
/// switches into that slot for the first time, and consumed by the fiber's
/// own entry loop.
///
/// `'static` here does not claim `user_data` truly lives forever; callers
/// (`Scheduler::run_tasks`) are responsible for not returning from a
/// `wait_group` round-trip while tasks referencing shorter-lived data are
/// still outstanding, the same contract the teacher's `Scope` enforces with
/// an explicit lifetime transmute.
pub(crate) struct PendingAssignment {
    pub(crate) desc: TaskDesc<'static>,
    pub(crate) group: GroupIndex,
}

// Safety: `desc.user_data` is a type-erased `Ptr` into the submitter's stack
// frame, not owned by this struct. It crosses to whichever worker thread
// dispatches it and back by the same contract that justifies the
// `TaskDesc<'_> -> TaskDesc<'static>` transmute at the `run_tasks` boundary:
// the submitter does not return from the matching `wait_group` round-trip
// while the pointee is still referenced, so no two threads ever observe it
// concurrently in a way that depends on `Ptr` itself being `Sync`.
unsafe impl Send for PendingAssignment {}

struct FiberSlot {
    fiber: Fiber,
    state: AtomicU8,
    current_worker: AtomicUsize,
    current_group: AtomicU8,
    timed_out: AtomicBool,
    pending: UnsafeCell<Option<PendingAssignment>>,
}

// Safety: `pending` is written by exactly one worker (the one about to
// switch into this slot) before the switch, and read by exactly one thread
// (whichever OS thread is currently running this fiber) at the top of its
// entry loop; never touched by any third party while a switch is in
// flight. `fiber` itself is switched into by at most one OS thread at a
// time, enforced by the same invariant. Both impls are needed regardless of
// the underlying `Context`'s own `Send`/`Sync`: the pool itself is built on
// one thread and then shared (`Sync`) across every worker thread, each of
// which only ever touches the slots it currently owns.
unsafe impl Send for FiberSlot {}
unsafe impl Sync for FiberSlot {}

/// A fixed-size pool of pre-allocated fibers with lease/return semantics.
///
/// `try_acquire` never blocks: when the pool is exhausted it returns `None`
/// and the caller (a worker's scheduling loop) leaves the task queued and
/// moves on to other runnable work instead of parking an OS thread. A
/// worker thread blocking inside the pool would risk a system-wide
/// deadlock the moment every fiber is held by fibers suspended on each
/// other (see the exhaustion scenario this pool sizing is meant to survive
/// without a hang); the scheduling loop's idle-wait tick is this system's
/// real backpressure mechanism instead.
pub(crate) struct FiberPool {
    slots: Box<[FiberSlot]>,
    free: Mutex<Vec<u32>>,
}

impl FiberPool {
    pub(crate) fn new(
        count: usize,
        stack_size: usize,
        mut make_entry: impl FnMut(u32) -> Box<dyn FnOnce() + 'static>,
    ) -> std::io::Result<Self> {
        let mut slots = Vec::with_capacity(count);
        for idx in 0..count {
            let entry = make_entry(idx as u32);
            let fiber = Fiber::new(stack_size, move || entry())?;
            slots.push(FiberSlot {
                fiber,
                state: AtomicU8::new(FREE),
                current_worker: AtomicUsize::new(0),
                current_group: AtomicU8::new(0),
                timed_out: AtomicBool::new(false),
                pending: UnsafeCell::new(None),
            });
        }
        Ok(Self {
            slots: slots.into_boxed_slice(),
            free: Mutex::new((0..count as u32).rev().collect()),
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Number of fibers currently `FREE`, i.e. not leased to any task.
    pub(crate) fn idle_count(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Marks a free fiber `EXECUTING` and returns its slot index, or `None`
    /// if the pool is currently exhausted.
    pub(crate) fn try_acquire(&self) -> Option<u32> {
        let mut guard = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        let idx = guard.pop()?;
        self.slots[idx as usize].state.store(EXECUTING, Ordering::Release);
        Some(idx)
    }

    /// Marks a fiber `FREE` and returns it to the pool.
    pub(crate) fn release(&self, idx: u32) {
        self.slots[idx as usize].state.store(FREE, Ordering::Release);
        let mut guard = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        guard.push(idx);
    }

    pub(crate) fn mark_suspended(&self, idx: u32) {
        self.slots[idx as usize].state.store(SUSPENDED, Ordering::Release);
    }

    pub(crate) fn mark_executing(&self, idx: u32) {
        self.slots[idx as usize].state.store(EXECUTING, Ordering::Release);
    }

    /// Records which worker currently has this fiber mounted, so a
    /// suspension from within the fiber knows which scheduler context to
    /// switch back into.
    pub(crate) fn set_current_worker(&self, idx: u32, worker: usize) {
        self.slots[idx as usize].current_worker.store(worker, Ordering::Release);
    }

    pub(crate) fn current_worker(&self, idx: u32) -> usize {
        self.slots[idx as usize].current_worker.load(Ordering::Acquire)
    }

    pub(crate) fn set_current_group(&self, idx: u32, group: GroupIndex) {
        self.slots[idx as usize]
            .current_group
            .store(group.get(), Ordering::Release);
    }

    pub(crate) fn current_group(&self, idx: u32) -> GroupIndex {
        GroupIndex::new(self.slots[idx as usize].current_group.load(Ordering::Acquire))
            .expect("current_group only ever stores a value produced by GroupIndex::get")
    }

    pub(crate) fn set_timed_out(&self, idx: u32, value: bool) {
        self.slots[idx as usize].timed_out.store(value, Ordering::Release);
    }

    pub(crate) fn take_timed_out(&self, idx: u32) -> bool {
        self.slots[idx as usize].timed_out.swap(false, Ordering::AcqRel)
    }

    /// Writes the task a fiber slot should run next. Must happen-before the
    /// worker switches into that slot.
    pub(crate) fn set_pending(&self, idx: u32, assignment: PendingAssignment) {
        // Safety: the caller is about to switch into `idx` and nothing else
        // touches `pending` for this slot until the fiber's entry loop reads
        // it back out below.
        unsafe { *self.slots[idx as usize].pending.get() = Some(assignment) };
    }

    /// Reads back the task a fiber slot has just been switched into to run.
    /// Called only from inside that slot's own entry loop.
    pub(crate) fn take_pending(&self, idx: u32) -> PendingAssignment {
        // Safety: called only by the fiber body running in slot `idx`,
        // immediately after being switched into by the worker that called
        // `set_pending` for this same activation.
        unsafe { (*self.slots[idx as usize].pending.get()).take() }
            .expect("fiber resumed without a pending assignment")
    }

    pub(crate) fn fiber_context(&self, idx: u32) -> &Context {
        self.slots[idx as usize].fiber.context()
    }
}
