use std::sync::OnceLock;
use std::time::Duration;

use fibertask_fiber::Context;
use fibertask_os::sync::Event;
use fibertask_os::sync::atomic::{AtomicBool, Ordering};
use fibertask_os::utils::ArrayQueue;

use crate::fiber_pool::PendingAssignment;
use crate::queue::ConcurrentLifo;

/// Upper bound on a worker's task queue capacity. `ArrayDeque`'s capacity is
/// fixed at compile time, so `SchedulerBuilder::max_tasks_per_worker_queue`
/// can only select a runtime cap up to this ceiling; larger requests fail
/// `SchedulerBuilder::build` with `InvalidConfig`.
pub(crate) const MAX_TASKS_PER_WORKER_QUEUE: usize = 4096;

/// How long a worker's idle wait blocks before it wakes up anyway to sweep
/// for timed-out `wait_group` deadlines across every group.
pub(crate) const IDLE_TICK: Duration = Duration::from_millis(5);

pub(crate) struct Worker {
    pub(crate) index: usize,
    pub(crate) task_queue: ConcurrentLifo<PendingAssignment, MAX_TASKS_PER_WORKER_QUEUE>,
    pub(crate) ready_fibers: ArrayQueue<u32>,
    pub(crate) wake_event: Event,
    scheduler_context: OnceLock<Context>,
    parked: AtomicBool,
}

impl Worker {
    pub(crate) fn new(index: usize, fiber_count: usize) -> Self {
        Self {
            index,
            task_queue: ConcurrentLifo::new(),
            ready_fibers: ArrayQueue::new(fiber_count),
            wake_event: Event::new(fibertask_os::sync::EventReset::Automatic),
            scheduler_context: OnceLock::new(),
            parked: AtomicBool::new(false),
        }
    }

    /// Records this worker OS thread's own context, captured once at
    /// thread start. Every dispatch switches away from and back into it.
    pub(crate) fn install_scheduler_context(&self, ctx: Context) {
        self.scheduler_context
            .set(ctx)
            .unwrap_or_else(|_| panic!("worker {} started twice", self.index));
    }

    pub(crate) fn scheduler_context(&self) -> &Context {
        self.scheduler_context
            .get()
            .expect("worker loop has not installed its scheduler context yet")
    }

    /// Marks this worker parked in its idle wait, so `wake()` calls from
    /// other threads know whether a signal is actually needed.
    pub(crate) fn mark_parked(&self, parked: bool) {
        self.parked.store(parked, Ordering::Release);
    }

    pub(crate) fn wake(&self) {
        if self.parked.load(Ordering::Acquire) {
            self.wake_event.set();
        }
    }
}
