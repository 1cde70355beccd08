//! Work-stealing fiber scheduler: a fixed pool of worker threads, each
//! cooperatively multiplexing a pool of fibers, submitting and awaiting
//! work through task groups.
//!
//! Tasks never preempt each other: a fiber only yields control at three
//! points — [`FiberContext::yield_now`], [`FiberContext::wait_group`], and
//! returning from its entry function.

mod context;
mod desc;
mod error;
mod fiber_pool;
mod group;
mod lcg;
mod queue;
mod scheduler;
mod worker;

pub use context::FiberContext;
pub use desc::{TaskDesc, TaskEntryPoint};
pub use error::{Result, SchedulerError};
pub use group::{GROUP_COUNT, GroupId, GroupIndex};
pub use scheduler::{Scheduler, SchedulerBuilder};
