use std::fmt;

use crate::group::GroupId;

/// Errors surfaced to the caller at submission time.
///
/// Per the scheduler's error model, only submission-class conditions are
/// `Result`s. Failures that leave the scheduler unable to continue safely
/// (stack allocation failure, fiber handle creation failure, an invariant
/// violation) panic or abort instead of returning an error here.
#[derive(Debug)]
pub enum SchedulerError {
    /// A worker's task queue was full after round-robin placement.
    QueueFull { worker: usize, group: GroupId },
    /// `run_tasks`/`wait_group` was called after `Scheduler::shutdown`.
    ShuttingDown,
    /// A `SchedulerBuilder` configuration was invalid.
    InvalidConfig { reason: &'static str },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull { worker, group } => {
                write!(f, "worker {worker}'s task queue is full (group {group:?})")
            }
            Self::ShuttingDown => write!(f, "scheduler is shutting down"),
            Self::InvalidConfig { reason } => write!(f, "invalid scheduler configuration: {reason}"),
        }
    }
}

impl std::error::Error for SchedulerError {}

/// Convenience alias for the scheduler's fallible, submission-class results.
pub type Result<T> = std::result::Result<T, SchedulerError>;
