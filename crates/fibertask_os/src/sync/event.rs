use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Reset behavior of an [`Event`], mirroring the two modes the original
/// scheduler's `EventReset` enumeration distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventReset {
    /// Releases exactly one waiter per `set`, then auto-resets to unsignalled.
    Automatic,
    /// Releases every current and future waiter until `reset` is called explicitly.
    Manual,
}

/// A futex-like signal with AUTOMATIC or MANUAL reset semantics.
///
/// Used for a group's completion signal (MANUAL: every waiter observes
/// completion, and it stays observable until the group is resubmitted) and
/// for a worker's wake event (AUTOMATIC: one parked worker wakes per signal).
pub struct Event {
    signalled: Mutex<bool>,
    condvar: Condvar,
    reset: EventReset,
}

impl Event {
    /// Creates a new, initially unsignalled event.
    #[must_use]
    pub fn new(reset: EventReset) -> Self {
        Self {
            signalled: Mutex::new(false),
            condvar: Condvar::new(),
            reset,
        }
    }

    /// Signals the event, waking waiters per the configured reset mode.
    pub fn set(&self) {
        let mut signalled = self.signalled.lock().unwrap();
        *signalled = true;
        match self.reset {
            EventReset::Automatic => self.condvar.notify_one(),
            EventReset::Manual => self.condvar.notify_all(),
        }
    }

    /// Clears the event. A no-op for AUTOMATIC events between signals, since
    /// a successful `wait` already consumes the signal.
    pub fn reset(&self) {
        *self.signalled.lock().unwrap() = false;
    }

    /// Returns whether the event is currently signalled, without waiting.
    #[must_use]
    pub fn is_set(&self) -> bool {
        *self.signalled.lock().unwrap()
    }

    /// Blocks until signalled or `timeout` elapses; `None` waits indefinitely.
    /// Returns `true` iff the event was observed signalled.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut guard = self.signalled.lock().unwrap();
        let deadline = timeout.map(|d| Instant::now() + d);

        loop {
            if *guard {
                if self.reset == EventReset::Automatic {
                    *guard = false;
                }
                return true;
            }

            guard = match deadline {
                None => self.condvar.wait(guard).unwrap(),
                Some(deadline) => {
                    let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                        return *guard;
                    };
                    let (guard, result) = self.condvar.wait_timeout(guard, remaining).unwrap();
                    if result.timed_out() && !*guard {
                        return false;
                    }
                    guard
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn manual_reset_releases_all_waiters() {
        let event = Arc::new(Event::new(EventReset::Manual));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let event = event.clone();
                thread::spawn(move || event.wait(Some(Duration::from_secs(2))))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        event.set();

        for h in handles {
            assert!(h.join().unwrap());
        }
        assert!(event.is_set());
    }

    #[test]
    fn automatic_reset_releases_one_waiter() {
        let event = Arc::new(Event::new(EventReset::Automatic));
        event.set();
        assert!(event.wait(Some(Duration::from_millis(10))));
        assert!(!event.is_set());
    }

    #[test]
    fn wait_times_out_when_never_signalled() {
        let event = Event::new(EventReset::Manual);
        assert!(!event.wait(Some(Duration::from_millis(20))));
    }

    #[test]
    fn wait_returns_immediately_when_already_set() {
        let event = Event::new(EventReset::Manual);
        event.set();
        assert!(event.wait(Some(Duration::from_millis(0))));
    }
}
