#![expect(unsafe_code, reason = "fiber context switches and the TaskDesc lifetime extension at the submission boundary cannot be expressed safely")]

use std::thread::{self, JoinHandle};
use std::time::Duration;

use fibertask_fiber::Context;
use fibertask_os::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use fibertask_os::sync::{Arc, Mutex, PoisonError, Weak};
use fibertask_os::time::Instant;
use tracing::{debug, trace, warn};

use crate::context::{AmbientGuard, FiberContext};
use crate::desc::TaskDesc;
use crate::error::{Result, SchedulerError};
use crate::fiber_pool::{FiberPool, PendingAssignment};
use crate::group::{GroupId, GroupIndex, GroupTable, ParkedFiber};
use crate::lcg::Lcg;
use crate::worker::{IDLE_TICK, MAX_TASKS_PER_WORKER_QUEUE, Worker};

const DEFAULT_FIBER_COUNT: usize = 128;
const DEFAULT_STACK_SIZE: usize = 64 * 1024;
const DEFAULT_QUEUE_CAPACITY: usize = MAX_TASKS_PER_WORKER_QUEUE;
/// Mixed into each worker's LCG seed so sibling workers don't steal in
/// lockstep with an identical sequence.
const STEAL_SEED: u32 = 0x9E37_79B9;

/// The scheduler's shared state, held behind an `Arc` so every worker
/// thread and every leased fiber can reach it without a lifetime.
pub(crate) struct SchedulerInner {
    workers: Box<[Worker]>,
    fiber_pool: FiberPool,
    groups: GroupTable,
    submit_cursor: AtomicUsize,
    shutdown: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SchedulerInner {
    /// Resolves a group id at the genuinely-external API boundary (a call
    /// arriving on a thread that isn't currently running any fiber). Uses
    /// the per-thread ambient group, which is only ever meaningful there:
    /// a fiber that has suspended and resumed on a worker thread no longer
    /// matches whatever this thread-local happens to hold, since resuming a
    /// fiber via the ready queue does not reinstall it (see
    /// `FiberContext::resolve_for_self`, which every in-task caller uses
    /// instead).
    fn resolve_group(&self, group: GroupId) -> Result<GroupIndex> {
        match group {
            GroupId::Group(idx) => Ok(idx),
            GroupId::AssignFromContext => {
                crate::context::current_group().ok_or(SchedulerError::InvalidConfig {
                    reason: "ASSIGN_FROM_CONTEXT used outside a running task",
                })
            }
        }
    }

    /// Resolves a group id against the fiber actually executing right now,
    /// identified by its stable slot index rather than thread-local state.
    /// Used by every `FiberContext` method, since the calling fiber may have
    /// suspended and been resumed on a different dispatch than the one that
    /// last updated this worker thread's ambient thread-locals.
    pub(crate) fn resolve_group_for_fiber(&self, group: GroupId, fiber_idx: u32) -> GroupIndex {
        match group {
            GroupId::Group(idx) => idx,
            GroupId::AssignFromContext => self.fiber_pool.current_group(fiber_idx),
        }
    }

    /// Submits `descs` to `group`, round-robin across worker queues from a
    /// shared rotating cursor. Adds `descs.len()` to the group's outstanding
    /// count up front; any desc that fails to enqueue has its share of that
    /// count rolled back before the error is returned.
    pub(crate) fn run_tasks(&self, group: GroupId, descs: &[TaskDesc<'_>]) -> Result<()> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(SchedulerError::ShuttingDown);
        }
        if descs.is_empty() {
            return Ok(());
        }
        let group_idx = self.resolve_group(group)?;
        let slot = self.groups.slot(group_idx);
        slot.add_outstanding(descs.len() as i32);

        let worker_count = self.workers.len();
        for (enqueued, desc) in descs.iter().enumerate() {
            // Safety: the caller (`Scheduler::run_tasks` / `FiberContext::run_tasks`)
            // does not return from the matching `wait_group` round-trip while any
            // submitted task's `user_data` is still referenced; this mirrors the
            // lifetime contract a scoped task API enforces by construction.
            let desc: TaskDesc<'static> =
                unsafe { std::mem::transmute::<TaskDesc<'_>, TaskDesc<'static>>(*desc) };
            let cursor = self.submit_cursor.fetch_add(1, Ordering::Relaxed) % worker_count;
            let assignment = PendingAssignment { desc, group: group_idx };
            if self.workers[cursor].task_queue.push(assignment).is_err() {
                let not_enqueued = (descs.len() - enqueued) as i32;
                if let Some(parked) = slot.complete_n(not_enqueued) {
                    self.requeue_parked(parked);
                }
                warn!(worker = cursor, %group, "task queue full, rejecting submission");
                return Err(SchedulerError::QueueFull { worker: cursor, group });
            }
            self.workers[cursor].wake();
        }
        Ok(())
    }

    /// Blocks the calling (non-task) thread until `group` completes or
    /// `timeout` elapses. Calls from inside a running task delegate to the
    /// fiber suspension path instead.
    pub(crate) fn wait_group(&self, group: GroupId, timeout: Duration) -> Result<bool> {
        let group_idx = self.resolve_group(group)?;
        if let Some(fiber_idx) = crate::context::current_fiber() {
            return Ok(self.suspend_wait_group(fiber_idx, GroupId::Group(group_idx), timeout));
        }
        let slot = self.groups.slot(group_idx);
        let wait_timeout = (timeout != Duration::MAX).then_some(timeout);
        Ok(slot.completion.wait(wait_timeout))
    }

    /// Re-queues the calling fiber at the tail of its worker's ready queue
    /// and switches back into that worker's scheduling loop.
    pub(crate) fn suspend_yield(&self, fiber_idx: u32) {
        let worker_idx = self.fiber_pool.current_worker(fiber_idx);
        self.fiber_pool.mark_suspended(fiber_idx);
        self.workers[worker_idx]
            .ready_fibers
            .push(fiber_idx)
            .unwrap_or_else(|_| panic!("worker {worker_idx}'s ready queue overflowed on yield"));
        self.switch_to_scheduler(fiber_idx, worker_idx);
        self.fiber_pool.mark_executing(fiber_idx);
    }

    /// Parks the calling fiber on `group` until it completes or `timeout`
    /// elapses, switching back into the scheduling loop meanwhile. Returns
    /// `true` if the group completed, `false` on timeout.
    pub(crate) fn suspend_wait_group(&self, fiber_idx: u32, group: GroupId, timeout: Duration) -> bool {
        let group_idx = self.resolve_group_for_fiber(group, fiber_idx);
        let slot = self.groups.slot(group_idx);
        if slot.is_complete() {
            return true;
        }
        let deadline = (timeout != Duration::MAX).then(|| Instant::now() + timeout);
        let worker_idx = self.fiber_pool.current_worker(fiber_idx);
        self.fiber_pool.mark_suspended(fiber_idx);
        if !slot.park_if_pending(fiber_idx, deadline) {
            self.fiber_pool.mark_executing(fiber_idx);
            return true;
        }
        self.switch_to_scheduler(fiber_idx, worker_idx);
        self.fiber_pool.mark_executing(fiber_idx);
        !self.fiber_pool.take_timed_out(fiber_idx)
    }

    fn switch_to_scheduler(&self, fiber_idx: u32, worker_idx: usize) {
        let my_ctx = self.fiber_pool.fiber_context(fiber_idx);
        let sched_ctx = self.workers[worker_idx].scheduler_context();
        // Safety: `fiber_idx` is the fiber currently running on this OS
        // thread; `worker_idx` is the worker that dispatched it, so its
        // scheduler context is the one waiting to be switched back into.
        unsafe { Context::switch(my_ctx, sched_ctx) };
    }

    /// Moves every given parked fiber onto its owning worker's ready queue
    /// and wakes that worker.
    fn requeue_parked(&self, parked: Vec<ParkedFiber>) {
        for p in parked {
            let worker_idx = self.fiber_pool.current_worker(p.fiber_idx);
            self.workers[worker_idx]
                .ready_fibers
                .push(p.fiber_idx)
                .unwrap_or_else(|_| panic!("worker {worker_idx}'s ready queue overflowed on group completion"));
            self.workers[worker_idx].wake();
        }
    }

    /// Scans every group for parked fibers whose deadline has passed,
    /// marks them timed out, and requeues them as ready. Called from any
    /// worker's idle path.
    fn sweep_timeouts(&self) {
        let now = Instant::now();
        for slot in self.groups.iter() {
            let timed_out = slot.take_timed_out(now);
            for p in timed_out {
                self.fiber_pool.set_timed_out(p.fiber_idx, true);
                let worker_idx = self.fiber_pool.current_worker(p.fiber_idx);
                self.workers[worker_idx]
                    .ready_fibers
                    .push(p.fiber_idx)
                    .unwrap_or_else(|_| panic!("worker {worker_idx}'s ready queue overflowed on timeout"));
                self.workers[worker_idx].wake();
            }
        }
    }

    /// Attempts to steal one task from another worker's queue, visiting
    /// the others in an LCG-randomized order.
    fn try_steal(&self, worker_idx: usize, rng: &Lcg) -> Option<PendingAssignment> {
        let n = self.workers.len();
        if n <= 1 {
            return None;
        }
        let start = rng.next_below(n - 1);
        for step in 0..n - 1 {
            let victim = (worker_idx + 1 + (start + step) % (n - 1)) % n;
            if let Some(assignment) = self.workers[victim].task_queue.try_steal() {
                return Some(assignment);
            }
        }
        None
    }

    /// Leases a fiber for `assignment` and switches into it, or, if the
    /// pool is exhausted, puts `assignment` back on `worker_idx`'s own
    /// queue and returns `false` without blocking.
    fn dispatch_new(&self, worker_idx: usize, assignment: PendingAssignment) -> bool {
        let Some(fiber_idx) = self.fiber_pool.try_acquire() else {
            let _ = self.workers[worker_idx].task_queue.push(assignment);
            return false;
        };
        self.fiber_pool.set_current_worker(fiber_idx, worker_idx);
        self.fiber_pool.set_pending(fiber_idx, assignment);
        trace!(worker = worker_idx, fiber = fiber_idx, "dispatching new task");
        self.switch_into(worker_idx, fiber_idx);
        true
    }

    fn dispatch_ready(&self, worker_idx: usize, fiber_idx: u32) {
        self.fiber_pool.set_current_worker(fiber_idx, worker_idx);
        self.fiber_pool.mark_executing(fiber_idx);
        trace!(worker = worker_idx, fiber = fiber_idx, "resuming ready fiber");
        self.switch_into(worker_idx, fiber_idx);
    }

    fn switch_into(&self, worker_idx: usize, fiber_idx: u32) {
        let sched_ctx = self.workers[worker_idx].scheduler_context();
        let fiber_ctx = self.fiber_pool.fiber_context(fiber_idx);
        // Safety: this worker thread owns `sched_ctx`, and `fiber_idx` was
        // just bound to it above, so nothing else will switch into either
        // context concurrently.
        unsafe { Context::switch(sched_ctx, fiber_ctx) };
    }

    fn is_idle(&self) -> bool {
        self.fiber_pool.idle_count() == self.fiber_pool.len()
            && self
                .workers
                .iter()
                .all(|w| w.task_queue.is_empty() && w.ready_fibers.is_empty())
    }
}

fn worker_main(inner: Arc<SchedulerInner>, index: usize) {
    inner.workers[index].install_scheduler_context(Context::capture());
    let rng = Lcg::new(STEAL_SEED.wrapping_add(index as u32).wrapping_mul(2_654_435_761));

    loop {
        if let Some(fiber_idx) = inner.workers[index].ready_fibers.pop() {
            inner.dispatch_ready(index, fiber_idx);
            continue;
        }

        if let Some(assignment) = inner.workers[index].task_queue.pop() {
            inner.dispatch_new(index, assignment);
            continue;
        }

        if let Some(assignment) = inner.try_steal(index, &rng) {
            inner.dispatch_new(index, assignment);
            continue;
        }

        inner.sweep_timeouts();

        if inner.shutdown.load(Ordering::Acquire) && inner.is_idle() {
            debug!(worker = index, "shutting down");
            return;
        }

        inner.workers[index].mark_parked(true);
        inner.workers[index].wake_event.wait(Some(IDLE_TICK));
        inner.workers[index].mark_parked(false);
    }
}

/// Runs on a leased fiber's stack for as long as that fiber exists: reads
/// back the task it was just bound to, runs it, then releases the fiber
/// and switches back to the worker that dispatched it. Loops forever, so a
/// `Fiber`'s stack and native handle are reused across every task leased
/// to this slot.
fn fiber_body(weak: Weak<SchedulerInner>, slot_idx: u32) {
    loop {
        let inner = weak.upgrade().expect("scheduler dropped while a fiber was still bound");
        let PendingAssignment { desc, group } = inner.fiber_pool.take_pending(slot_idx);
        inner.fiber_pool.set_current_group(slot_idx, group);
        let mut ctx = FiberContext::new(Arc::clone(&inner), slot_idx);
        drop(inner);

        {
            let _ambient = AmbientGuard::install(group, slot_idx);
            (desc.entry)(&mut ctx, desc.user_data);
        }

        let inner = ctx.inner;
        let worker_idx = inner.fiber_pool.current_worker(slot_idx);
        let slot = inner.groups.slot(group);
        let became_zero = slot.complete_one();
        inner.fiber_pool.release(slot_idx);
        if let Some(parked) = became_zero {
            inner.requeue_parked(parked);
        }

        let sched_ctx = inner.workers[worker_idx].scheduler_context();
        let my_ctx = inner.fiber_pool.fiber_context(slot_idx);
        // Safety: `slot_idx` just finished running on `worker_idx`; its
        // scheduler context is the one waiting to be switched back into.
        // When this slot is leased again, execution resumes right here and
        // the enclosing loop carries it back to `take_pending`.
        unsafe { Context::switch(my_ctx, sched_ctx) };
    }
}

/// The fiber-based work-stealing scheduler.
///
/// Cheap to clone: internally an `Arc` over the worker pool, fiber pool,
/// and group table, shared with every worker thread.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Starts building a scheduler with the defaults from [`SchedulerBuilder`].
    #[must_use]
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::default()
    }

    /// Submits `descs` to `group` and returns promptly; does not wait for
    /// completion.
    pub fn run_tasks(&self, group: GroupId, descs: &[TaskDesc<'_>]) -> Result<()> {
        self.inner.run_tasks(group, descs)
    }

    /// Blocks until `group`'s outstanding count reaches zero or `timeout`
    /// elapses (`Duration::MAX` waits forever). Returns `true` on
    /// completion, `false` on timeout.
    pub fn wait_group(&self, group: GroupId, timeout: Duration) -> Result<bool> {
        self.inner.wait_group(group, timeout)
    }

    /// Signals every worker to exit once idle and joins its thread. Any
    /// `run_tasks`/`wait_group` call made after this returns `ShuttingDown`.
    pub fn shutdown(self) {
        self.inner.shutdown.store(true, Ordering::Release);
        for worker in self.inner.workers.iter() {
            worker.wake_event.set();
        }
        let mut handles = self
            .inner
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for handle in handles.drain(..) {
            if let Err(payload) = handle.join() {
                warn!("worker thread panicked during shutdown: {payload:?}");
            }
        }
        for (idx, slot) in self.inner.groups.iter().enumerate() {
            debug_assert!(
                slot.outstanding.load(Ordering::Acquire) == 0,
                "group {idx} still has outstanding tasks at shutdown"
            );
        }
    }
}

/// Builds a [`Scheduler`], mirroring the defaults §6 documents:
/// `worker_count = available_parallelism`, `fiber_count = 128`,
/// `stack_size = 64 KiB`, `max_tasks_per_worker_queue` a power of two.
pub struct SchedulerBuilder {
    worker_count: usize,
    fiber_count: usize,
    stack_size: usize,
    max_tasks_per_worker_queue: usize,
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self {
            worker_count: fibertask_os::thread::available_parallelism().get(),
            fiber_count: DEFAULT_FIBER_COUNT,
            stack_size: DEFAULT_STACK_SIZE,
            max_tasks_per_worker_queue: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl SchedulerBuilder {
    #[must_use]
    pub fn worker_count(mut self, n: usize) -> Self {
        self.worker_count = n;
        self
    }

    #[must_use]
    pub fn fiber_count(mut self, n: usize) -> Self {
        self.fiber_count = n;
        self
    }

    #[must_use]
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    #[must_use]
    pub fn max_tasks_per_worker_queue(mut self, n: usize) -> Self {
        self.max_tasks_per_worker_queue = n;
        self
    }

    /// Validates the configuration and starts every worker thread.
    pub fn build(self) -> Result<Scheduler> {
        if self.worker_count == 0 {
            return Err(SchedulerError::InvalidConfig { reason: "worker_count must be >= 1" });
        }
        if self.fiber_count < self.worker_count {
            return Err(SchedulerError::InvalidConfig {
                reason: "fiber_count must be >= worker_count",
            });
        }
        if self.stack_size < fibertask_fiber::MIN_STACK_SIZE {
            return Err(SchedulerError::InvalidConfig { reason: "stack_size is below the minimum fiber stack size" });
        }
        if !self.max_tasks_per_worker_queue.is_power_of_two() {
            return Err(SchedulerError::InvalidConfig {
                reason: "max_tasks_per_worker_queue must be a power of two",
            });
        }
        if self.max_tasks_per_worker_queue > MAX_TASKS_PER_WORKER_QUEUE {
            return Err(SchedulerError::InvalidConfig {
                reason: "max_tasks_per_worker_queue exceeds the compiled-in queue capacity",
            });
        }

        let workers: Box<[Worker]> = (0..self.worker_count)
            .map(|i| Worker::new(i, self.fiber_count))
            .collect();

        let stack_size = self.stack_size;
        let inner = Arc::new_cyclic(|weak: &Weak<SchedulerInner>| {
            let weak = weak.clone();
            let fiber_pool = FiberPool::new(self.fiber_count, stack_size, move |slot_idx| {
                let weak = weak.clone();
                Box::new(move || fiber_body(weak, slot_idx))
            })
            .expect("failed to allocate a guarded fiber stack");
            SchedulerInner {
                workers,
                fiber_pool,
                groups: GroupTable::new(),
                submit_cursor: AtomicUsize::new(0),
                shutdown: AtomicBool::new(false),
                handles: Mutex::new(Vec::new()),
            }
        });

        let mut handles = Vec::with_capacity(self.worker_count);
        for index in 0..self.worker_count {
            let inner = Arc::clone(&inner);
            handles.push(
                thread::Builder::new()
                    .name(format!("fibertask-worker-{index}"))
                    .spawn(move || worker_main(inner, index))
                    .expect("failed to spawn worker thread"),
            );
        }
        *inner.handles.lock().unwrap_or_else(PoisonError::into_inner) = handles;

        Ok(Scheduler { inner })
    }
}
