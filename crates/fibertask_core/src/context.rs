use std::cell::Cell;
use std::time::Duration;

use fibertask_os::sync::Arc;

use crate::group::GroupId;
use crate::scheduler::SchedulerInner;

thread_local! {
    /// The group the task currently running on this OS thread was submitted
    /// to, if any. Set by the worker loop around a fiber switch-in, read by
    /// `run_tasks`/`wait_group` to resolve `GroupId::AssignFromContext` and
    /// to distinguish an external caller from a task calling back in.
    static CURRENT_GROUP: Cell<Option<crate::group::GroupIndex>> = const { Cell::new(None) };
    /// The fiber slot currently executing on this OS thread, if any.
    static CURRENT_FIBER: Cell<Option<u32>> = const { Cell::new(None) };
}

/// Installs ambient per-thread state for the duration of running a fiber,
/// restoring the previous values on drop (covers nested nothing today, but
/// keeps the worker loop's switch-in/switch-out symmetric).
pub(crate) struct AmbientGuard {
    prev_group: Option<crate::group::GroupIndex>,
    prev_fiber: Option<u32>,
}

impl AmbientGuard {
    pub(crate) fn install(group: crate::group::GroupIndex, fiber: u32) -> Self {
        let prev_group = CURRENT_GROUP.with(|c| c.replace(Some(group)));
        let prev_fiber = CURRENT_FIBER.with(|c| c.replace(Some(fiber)));
        Self { prev_group, prev_fiber }
    }
}

impl Drop for AmbientGuard {
    fn drop(&mut self) {
        CURRENT_GROUP.with(|c| c.set(self.prev_group));
        CURRENT_FIBER.with(|c| c.set(self.prev_fiber));
    }
}

pub(crate) fn current_group() -> Option<crate::group::GroupIndex> {
    CURRENT_GROUP.with(Cell::get)
}

pub(crate) fn current_fiber() -> Option<u32> {
    CURRENT_FIBER.with(Cell::get)
}

/// Handle given to a task's entry function, used to cooperatively suspend.
///
/// Lives on the fiber's own stack for the lifetime of one task activation;
/// a task must not retain it past its entry function returning.
pub struct FiberContext {
    pub(crate) inner: Arc<SchedulerInner>,
    pub(crate) fiber_idx: u32,
}

impl FiberContext {
    pub(crate) fn new(inner: Arc<SchedulerInner>, fiber_idx: u32) -> Self {
        Self { inner, fiber_idx }
    }

    /// Re-queues the calling fiber at the tail of its worker's ready queue
    /// and switches back to the scheduling loop. Returns once some worker
    /// picks this fiber back up.
    pub fn yield_now(&mut self) {
        self.inner.suspend_yield(self.fiber_idx);
    }

    /// Parks the calling fiber on `group` until its outstanding count
    /// reaches zero or `timeout` elapses (`Duration::MAX` waits forever).
    /// Returns `true` if the group completed, `false` on timeout.
    pub fn wait_group(&mut self, group: GroupId, timeout: Duration) -> bool {
        self.inner.suspend_wait_group(self.fiber_idx, group, timeout)
    }

    /// Submits `descs` to `group` (or, if `GroupId::AssignFromContext`, to
    /// this task's own group) without leaving the fiber.
    pub fn run_tasks(&self, group: GroupId, descs: &[crate::desc::TaskDesc<'_>]) -> crate::error::Result<()> {
        let group = self.resolve_for_self(group);
        self.inner.run_tasks(group, descs)
    }

    /// Resolves `GroupId::AssignFromContext` against this fiber's own slot
    /// index rather than the ambient thread-locals, which only reflect
    /// whichever fiber a worker most recently dispatched and are not
    /// refreshed when a different, previously-suspended fiber resumes on
    /// the same OS thread.
    fn resolve_for_self(&self, group: GroupId) -> GroupId {
        GroupId::Group(self.inner.resolve_group_for_fiber(group, self.fiber_idx))
    }
}
