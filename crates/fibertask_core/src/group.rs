use std::fmt;

use fibertask_os::sync::atomic::{AtomicI32, Ordering};
use fibertask_os::sync::{Event, EventReset, Mutex, PoisonError};
use fibertask_os::time::Instant;

/// Size of the closed group-id set, matching the scale the original
/// `TaskGroup` enumeration fixes.
pub const GROUP_COUNT: usize = 32;

/// A resolved index into the scheduler's fixed group table, `0..GROUP_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupIndex(u8);

impl GroupIndex {
    pub const fn new(id: u8) -> Option<Self> {
        if (id as usize) < GROUP_COUNT {
            Some(Self(id))
        } else {
            None
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }
}

/// A group identifier as accepted at the public API boundary: either one of
/// the closed `GROUP_0..GROUP_31` constants, or `ASSIGN_FROM_CONTEXT`, which
/// resolves to the submitting task's own group at submit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupId {
    Group(GroupIndex),
    AssignFromContext,
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(idx) => write!(f, "GROUP_{}", idx.get()),
            Self::AssignFromContext => write!(f, "ASSIGN_FROM_CONTEXT"),
        }
    }
}

macro_rules! group_consts {
    ($($n:literal => $name:ident),* $(,)?) => {
        impl GroupId {
            $(
                pub const $name: GroupId = GroupId::Group(GroupIndex($n));
            )*
        }
    };
}

group_consts! {
    0 => GROUP_0, 1 => GROUP_1, 2 => GROUP_2, 3 => GROUP_3,
    4 => GROUP_4, 5 => GROUP_5, 6 => GROUP_6, 7 => GROUP_7,
    8 => GROUP_8, 9 => GROUP_9, 10 => GROUP_10, 11 => GROUP_11,
    12 => GROUP_12, 13 => GROUP_13, 14 => GROUP_14, 15 => GROUP_15,
    16 => GROUP_16, 17 => GROUP_17, 18 => GROUP_18, 19 => GROUP_19,
    20 => GROUP_20, 21 => GROUP_21, 22 => GROUP_22, 23 => GROUP_23,
    24 => GROUP_24, 25 => GROUP_25, 26 => GROUP_26, 27 => GROUP_27,
    28 => GROUP_28, 29 => GROUP_29, 30 => GROUP_30, 31 => GROUP_31,
}

/// A fiber parked on a group, waiting for its outstanding count to reach
/// zero (or, for timed waits, for a deadline to pass).
pub(crate) struct ParkedFiber {
    pub(crate) fiber_idx: u32,
    pub(crate) deadline: Option<Instant>,
}

/// Per-group record: outstanding task count, completion event, and the
/// fibers currently parked on this group.
pub(crate) struct GroupSlot {
    pub(crate) outstanding: AtomicI32,
    pub(crate) completion: Event,
    pub(crate) parked: Mutex<Vec<ParkedFiber>>,
}

impl GroupSlot {
    fn new() -> Self {
        Self {
            outstanding: AtomicI32::new(0),
            completion: Event::new(EventReset::Manual),
            parked: Mutex::new(Vec::new()),
        }
    }

    /// Adds `count` to the outstanding counter. If it was previously zero
    /// (completion was signalled or never raised), clears `completion` so
    /// a subsequent wait blocks again.
    pub(crate) fn add_outstanding(&self, count: i32) {
        if count == 0 {
            return;
        }
        let prev = self.outstanding.fetch_add(count, Ordering::AcqRel);
        if prev == 0 {
            self.completion.reset();
        }
    }

    /// Decrements the outstanding counter by one. If this observes the
    /// transition to zero, signals completion and atomically drains every
    /// fiber parked on this group (under the same lock `park_if_pending`
    /// checks), returning them to be rewoken. Returns `None` when the group
    /// did not just complete.
    ///
    /// Draining under the same lock `park_if_pending` uses to recheck
    /// completion closes the race between "task finishes, group completes"
    /// and "another task starts waiting on the same group": whichever of
    /// the two reaches the lock first observes a consistent outcome.
    pub(crate) fn complete_one(&self) -> Option<Vec<ParkedFiber>> {
        let prev = self.outstanding.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "outstanding count underflowed");
        if prev != 1 {
            return None;
        }
        self.completion.set();
        let mut parked = self.parked.lock().unwrap_or_else(PoisonError::into_inner);
        Some(std::mem::take(&mut *parked))
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.outstanding.load(Ordering::Acquire) <= 0
    }

    /// Like [`Self::complete_one`], but subtracts `n` at once. Used to roll
    /// back the outstanding count for descriptors a submission failed to
    /// enqueue.
    pub(crate) fn complete_n(&self, n: i32) -> Option<Vec<ParkedFiber>> {
        if n == 0 {
            return None;
        }
        let prev = self.outstanding.fetch_sub(n, Ordering::AcqRel);
        debug_assert!(prev >= n, "outstanding count underflowed");
        if prev != n {
            return None;
        }
        self.completion.set();
        let mut parked = self.parked.lock().unwrap_or_else(PoisonError::into_inner);
        Some(std::mem::take(&mut *parked))
    }

    /// Parks `fiber_idx` on this group unless it has already completed.
    /// Returns `true` if actually parked, `false` if the group was already
    /// complete (the caller should treat this identically to a woken wait).
    pub(crate) fn park_if_pending(&self, fiber_idx: u32, deadline: Option<Instant>) -> bool {
        let mut parked = self.parked.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_complete() {
            return false;
        }
        parked.push(ParkedFiber { fiber_idx, deadline });
        true
    }

    /// Removes and returns parked fibers whose deadline has passed.
    pub(crate) fn take_timed_out(&self, now: Instant) -> Vec<ParkedFiber> {
        let mut parked = self.parked.lock().unwrap_or_else(PoisonError::into_inner);
        let mut timed_out = Vec::new();
        parked.retain(|p| match p.deadline {
            Some(deadline) if deadline <= now => {
                timed_out.push(ParkedFiber {
                    fiber_idx: p.fiber_idx,
                    deadline: p.deadline,
                });
                false
            }
            _ => true,
        });
        timed_out
    }
}

/// The scheduler's fixed `GROUP_0..GROUP_31` table.
pub(crate) struct GroupTable {
    slots: [GroupSlot; GROUP_COUNT],
}

impl GroupTable {
    pub(crate) fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| GroupSlot::new()),
        }
    }

    pub(crate) fn slot(&self, idx: GroupIndex) -> &GroupSlot {
        &self.slots[idx.get() as usize]
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &GroupSlot> {
        self.slots.iter()
    }
}
