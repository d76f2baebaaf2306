//! Virtual-time scheduler for deterministic testing of the duration-based
//! operators.
//!
//! Time never moves on its own; it advances only when a test calls
//! [`advance_by`]. Timers due at or before the new time run synchronously,
//! in (due time, registration order). The scheduler also keeps counters so a
//! test can assert that an operator registered a timer and, crucially, that
//! it cancelled the timer on early termination.
//!
//! ```
//! use std::time::Duration;
//! use rxsieve::scheduler::{Scheduler, TestScheduler};
//!
//! let scheduler = TestScheduler::new();
//! let token = scheduler.schedule(Duration::from_millis(100), Box::new(|| {}));
//! token.cancel();
//! scheduler.advance_by(Duration::from_millis(100));
//! assert_eq!(scheduler.cancelled_count(), 1);
//! ```
//!
//! [`advance_by`]: TestScheduler::advance_by

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use super::{CancelToken, Scheduler};

struct TimerEntry {
    due: Duration,
    id: usize,
    action: Option<Box<dyn FnOnce() + Send>>,
    cancelled: bool,
}

struct TestSchedulerState {
    now: Duration,
    next_id: usize,
    scheduled: usize,
    cancelled: usize,
    timers: Vec<TimerEntry>,
}

/// A clonable handle to a shared virtual clock and timer queue.
///
/// All clones observe the same virtual time, so a test can hand one clone to
/// an operator and keep another to drive time forward.
#[derive(Clone)]
pub struct TestScheduler {
    epoch: Instant,
    state: Arc<Mutex<TestSchedulerState>>,
}

impl TestScheduler {
    /// Creates a scheduler with virtual time at zero.
    #[must_use]
    pub fn new() -> Self {
        TestScheduler {
            epoch: Instant::now(),
            state: Arc::new(Mutex::new(TestSchedulerState {
                now: Duration::ZERO,
                next_id: 0,
                scheduled: 0,
                cancelled: 0,
                timers: Vec::new(),
            })),
        }
    }

    /// Moves virtual time forward by `d`, synchronously running every
    /// pending timer that becomes due, in due-time order. Timers registered
    /// by a running action participate in the same pass when they fall
    /// within the window.
    pub fn advance_by(&self, d: Duration) {
        let target = self.state.lock().unwrap().now + d;
        loop {
            let due_action = {
                let mut state = self.state.lock().unwrap();
                let next = state
                    .timers
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| !t.cancelled && t.action.is_some() && t.due <= target)
                    .min_by_key(|(_, t)| (t.due, t.id))
                    .map(|(i, _)| i);
                match next {
                    Some(i) => {
                        let due = state.timers[i].due;
                        if due > state.now {
                            state.now = due;
                        }
                        state.timers[i].action.take()
                    }
                    None => None,
                }
            };
            // Run outside the lock so the action can schedule or cancel.
            match due_action {
                Some(action) => action(),
                None => break,
            }
        }
        self.state.lock().unwrap().now = target;
    }

    /// Number of timers ever registered.
    #[must_use]
    pub fn scheduled_count(&self) -> usize {
        self.state.lock().unwrap().scheduled
    }

    /// Number of timers cancelled before firing.
    #[must_use]
    pub fn cancelled_count(&self) -> usize {
        self.state.lock().unwrap().cancelled
    }

    /// Number of timers still waiting to fire.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state
            .timers
            .iter()
            .filter(|t| !t.cancelled && t.action.is_some())
            .count()
    }
}

impl Default for TestScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TestScheduler {
    fn now(&self) -> Instant {
        self.epoch + self.state.lock().unwrap().now
    }

    fn schedule(&self, delay: Duration, action: Box<dyn FnOnce() + Send>) -> CancelToken {
        let id = {
            let mut state = self.state.lock().unwrap();
            let id = state.next_id;
            state.next_id += 1;
            state.scheduled += 1;
            let due = state.now + delay;
            state.timers.push(TimerEntry {
                due,
                id,
                action: Some(action),
                cancelled: false,
            });
            id
        };
        let state = Arc::clone(&self.state);
        CancelToken::new(Box::new(move || {
            let mut state = state.lock().unwrap();
            if let Some(entry) = state.timers.iter_mut().find(|t| t.id == id) {
                if entry.action.take().is_some() {
                    entry.cancelled = true;
                } else {
                    return;
                }
            } else {
                return;
            }
            state.cancelled += 1;
        }))
    }
}
