//! The `Observer` trait: the consumer side of an observable stream.

use std::{error::Error, sync::Arc};

/// The three-channel sink that consumes values emitted by an observable
/// stream.
///
/// An observer receives any number of `next` calls followed by at most one
/// terminal signal, either `complete` or `error`. Producers must never call
/// `next`, `complete` or `error` again after a terminal signal has been
/// delivered; [`Subscriber`] enforces this contract on the consuming side as
/// well, so a misbehaving producer cannot leak events past termination.
///
/// [`Subscriber`]: crate::subscribe::Subscriber
pub trait Observer {
    /// The type of items this observer accepts through `next`.
    type NextFnType;

    /// Receive the next value from the stream.
    fn next(&mut self, _: Self::NextFnType);

    /// Receive the completion signal. Terminal; no further events may follow.
    fn complete(&mut self);

    /// Receive an error signal. Terminal; no further events may follow.
    fn error(&mut self, _: Arc<dyn Error + Send + Sync>);
}
