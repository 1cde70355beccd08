//! Fiber-based work-stealing task scheduler for fine-grained, fork/join
//! parallelism on shared-memory multiprocessors.
//!
//! ```no_run
//! use fibertask::{Scheduler, TaskDesc, GroupId, Ptr};
//! use std::time::Duration;
//!
//! fn say_hello(_ctx: &mut fibertask::FiberContext, _user: Ptr<'_>) {
//!     println!("hello from a fiber");
//! }
//!
//! let scheduler = Scheduler::builder().build().unwrap();
//! let desc = TaskDesc::new(say_hello, Ptr::from_ref(&()));
//! scheduler.run_tasks(GroupId::GROUP_0, &[desc]).unwrap();
//! scheduler.wait_group(GroupId::GROUP_0, Duration::MAX).unwrap();
//! ```

pub use fibertask_core::*;
pub use fibertask_ptr::{OwningPtr, Ptr, PtrMut};

pub mod os {
    pub use fibertask_os::*;
}

pub mod fiber {
    pub use fibertask_fiber::*;
}

pub mod utils {
    pub use fibertask_utils::*;
}
