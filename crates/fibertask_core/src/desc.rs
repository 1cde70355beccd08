use fibertask_ptr::Ptr;

use crate::context::FiberContext;

/// A task's entry point: runs on a leased fiber, with access to the
/// [`FiberContext`] used to `yield`/`wait_group`, and the opaque user
/// payload it was submitted with.
pub type TaskEntryPoint = fn(&mut FiberContext, Ptr<'_>);

/// A trivially copyable description of one unit of work.
///
/// `TaskDesc` carries no ownership of `user_data`; the pointee must outlive
/// every task submitted with it (typically a stack frame borrowed for the
/// duration of a `run_tasks` + `wait_group` round-trip).
#[derive(Clone, Copy)]
pub struct TaskDesc<'a> {
    pub(crate) entry: TaskEntryPoint,
    pub(crate) user_data: Ptr<'a>,
    pub(crate) debug_name: &'static str,
    pub(crate) debug_color: u32,
}

impl<'a> TaskDesc<'a> {
    /// Builds a task description. `debug_name`/`debug_color` default to
    /// `"task"` / `0` when omitted and are only ever used for diagnostics
    /// (tracing span fields), never for scheduling decisions.
    pub fn new(entry: TaskEntryPoint, user_data: Ptr<'a>) -> Self {
        Self {
            entry,
            user_data,
            debug_name: "task",
            debug_color: 0,
        }
    }

    #[must_use]
    pub fn with_debug_name(mut self, name: &'static str) -> Self {
        self.debug_name = name;
        self
    }

    #[must_use]
    pub fn with_debug_color(mut self, color: u32) -> Self {
        self.debug_color = color;
        self
    }

    pub fn debug_name(&self) -> &'static str {
        self.debug_name
    }

    pub fn debug_color(&self) -> u32 {
        self.debug_color
    }
}
