//! Temporal quantification.
//!
//! A thin re-export of [`std::time`]; the scheduler only ever needs a
//! monotonic clock for `wait_group` deadlines and worker wake timeouts.

pub use std::time::{Duration, Instant, SystemTime, SystemTimeError, TryFromFloatSecsError};
