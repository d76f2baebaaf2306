//! `rxsieve` is a library of filtering and truncating operators for
//! push-based observable streams.
//!
//! An [`Observable`] describes how to produce a sequence of values for one
//! subscriber; the operators on [`ObservableExt`] wrap it into a new
//! observable that filters out values ([`filter`], [`distinct`],
//! [`ignore_elements`]), truncates the front or back of the stream by count
//! ([`take`], [`skip`], [`take_last`], [`skip_last`]), by predicate
//! ([`take_while`], [`take_until_match`] and friends), by elapsed time
//! ([`take_for`], [`skip_for`], [`take_last_for`], [`skip_last_for`]), or by
//! the emissions of a second observable ([`take_until`], [`skip_until`]).
//!
//! Observables are cold: every subscribe runs the production logic again and
//! every subscriber gets independent operator state. Operators that end the
//! stream early cancel their upstream subscription as soon as the outcome is
//! settled, and time-based operators take the clock and timers from an
//! explicit [`Scheduler`] so they can run against real threads, `Tokio`
//! tasks, or virtual time in tests.
//!
//! A panic inside a user-supplied predicate or key selector is caught and
//! delivered downstream as a [`CallbackError`] instead of unwinding through
//! the producer.
//!
//! [`filter`]: ObservableExt::filter
//! [`distinct`]: ObservableExt::distinct
//! [`ignore_elements`]: ObservableExt::ignore_elements
//! [`take`]: ObservableExt::take
//! [`skip`]: ObservableExt::skip
//! [`take_last`]: ObservableExt::take_last
//! [`skip_last`]: ObservableExt::skip_last
//! [`take_while`]: ObservableExt::take_while
//! [`take_until_match`]: ObservableExt::take_until_match
//! [`take_for`]: ObservableExt::take_for
//! [`skip_for`]: ObservableExt::skip_for
//! [`take_last_for`]: ObservableExt::take_last_for
//! [`skip_last_for`]: ObservableExt::skip_last_for
//! [`take_until`]: ObservableExt::take_until
//! [`skip_until`]: ObservableExt::skip_until
//! [`Scheduler`]: scheduler::Scheduler

mod errors;
mod observable;
mod observer;
pub mod scheduler;
mod subscription;

pub use errors::CallbackError;
pub use observable::{Observable, ObservableExt};
pub use observer::Observer;
pub use subscription::subscribe;
pub use subscription::subscribe::{Subscribeable, Unsubscribeable};
