//! Time source and timer capability used by the duration-based operators.
//!
//! Operators such as [`take_for`], [`skip_for`], [`take_last_for`] and
//! [`skip_last_for`] never poll and never reach for an ambient clock; they
//! receive a [`Scheduler`] explicitly and register at most one cancellable
//! timer with it. Two runtime implementations are provided, one backed by OS
//! threads and one backed by `Tokio` tasks, plus a deterministic virtual-time
//! scheduler for tests in [`test_scheduler`].
//!
//! [`take_for`]: crate::ObservableExt::take_for
//! [`skip_for`]: crate::ObservableExt::skip_for
//! [`take_last_for`]: crate::ObservableExt::take_last_for
//! [`skip_last_for`]: crate::ObservableExt::skip_last_for

pub mod test_scheduler;

use std::{
    sync::{mpsc, Mutex},
    time::{Duration, Instant},
};

pub use test_scheduler::TestScheduler;

/// Supplies the current time and one-shot cancellable timers.
pub trait Scheduler {
    /// Current time according to this scheduler.
    fn now(&self) -> Instant;

    /// Runs `action` once after `delay`. The returned token cancels the
    /// timer; a cancelled timer never runs its action.
    fn schedule(&self, delay: Duration, action: Box<dyn FnOnce() + Send>) -> CancelToken;
}

/// Cancellation handle for a scheduled timer.
///
/// `cancel` is idempotent: the underlying teardown runs at most once no
/// matter how many times, or from how many clones of an owning `Arc`, it is
/// invoked. Dropping the token does not cancel the timer.
pub struct CancelToken {
    cancel_fn: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl CancelToken {
    /// Wraps a teardown function into a token.
    #[must_use]
    pub fn new(cancel_fn: Box<dyn FnOnce() + Send>) -> Self {
        CancelToken {
            cancel_fn: Mutex::new(Some(cancel_fn)),
        }
    }

    /// A token whose cancellation does nothing.
    #[must_use]
    pub fn noop() -> Self {
        CancelToken {
            cancel_fn: Mutex::new(None),
        }
    }

    /// Cancels the timer this token was issued for.
    pub fn cancel(&self) {
        let fnc = self.cancel_fn.lock().unwrap().take();
        if let Some(fnc) = fnc {
            fnc();
        }
    }
}

/// Scheduler that dedicates one OS thread to each timer.
///
/// The thread parks on a channel with `recv_timeout`; a cancel message
/// arriving before the timeout wins and the action is never run.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule(&self, delay: Duration, action: Box<dyn FnOnce() + Send>) -> CancelToken {
        let (tx, rx) = mpsc::channel::<()>();
        std::thread::spawn(move || {
            if let Err(mpsc::RecvTimeoutError::Timeout) = rx.recv_timeout(delay) {
                action();
            }
        });
        CancelToken::new(Box::new(move || {
            // A send error means the timer already fired and dropped the
            // receiver; nothing left to cancel.
            let _ = tx.send(());
        }))
    }
}

/// Scheduler that runs each timer on a `Tokio` task.
///
/// # Panics
///
/// `schedule` panics if called outside of a `Tokio` runtime.
#[derive(Clone, Copy, Debug, Default)]
pub struct TaskScheduler;

impl Scheduler for TaskScheduler {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule(&self, delay: Duration, action: Box<dyn FnOnce() + Send>) -> CancelToken {
        let handle = tokio::task::spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        });
        CancelToken::new(Box::new(move || handle.abort()))
    }
}
