use std::{
    any::Any,
    error::Error,
    future::Future,
    pin::Pin,
    sync::Arc,
    thread::JoinHandle as ThreadJoinHandle,
};

use tokio::runtime;
use tokio::task::JoinHandle;

use crate::observer::Observer;

/// A trait for types that can be subscribed to, allowing consumers to receive
/// values emitted by an observable stream.
pub trait Subscribeable {
    /// The type of items emitted by the observable stream.
    type ObsType;

    /// Subscribes to the observable stream and specifies how to handle emitted
    /// values.
    ///
    /// The `Subscriber` parameter defines the behavior for processing values
    /// emitted by the observable stream. The returned `Subscription` allows
    /// the caller to cancel delivery and to await asynchronous producers.
    fn subscribe(&mut self, s: Subscriber<Self::ObsType>) -> Subscription;
}

/// A trait for types that can be unsubscribed, releasing the resources
/// associated with a subscription.
pub trait Unsubscribeable {
    /// Unsubscribes from a subscription and releases associated resources.
    ///
    /// Calling this signals the producer to stop emitting and tears down any
    /// state the operator chain holds for this subscription: upstream
    /// subscriptions, companion subscriptions and scheduler timers. The
    /// `Subscription` is consumed, so cancellation cannot run twice.
    fn unsubscribe(self);
}

type NextFn<T> = Box<dyn FnMut(T) + Send>;
type CompleteFn = Box<dyn FnMut() + Send + Sync>;
type ErrorFn = Box<dyn FnMut(Arc<dyn Error + Send + Sync>) + Send + Sync>;

/// A type that acts as an observer, allowing users to handle emitted values,
/// errors, and completion when subscribing to an `Observable`.
///
/// A `Subscriber` guards the terminal-once contract: once `complete` or
/// `error` has been delivered, every further `next`, `complete` or `error`
/// call is dropped. Operators rely on this as a backstop; their own cutoff
/// flags keep events from being produced in the first place.
pub struct Subscriber<NextFnType> {
    next_fn: NextFn<NextFnType>,
    complete_fn: Option<CompleteFn>,
    error_fn: Option<ErrorFn>,
    completed: bool,
    errored: bool,
}

impl<NextFnType> Subscriber<NextFnType> {
    /// Creates a new `Subscriber` with handling functions for emitted values,
    /// errors, and completion.
    pub fn new(
        next_fn: impl FnMut(NextFnType) + 'static + Send,
        error_fn: impl FnMut(Arc<dyn Error + Send + Sync>) + 'static + Send + Sync,
        complete_fn: impl FnMut() + 'static + Send + Sync,
    ) -> Self {
        Subscriber {
            next_fn: Box::new(next_fn),
            complete_fn: Some(Box::new(complete_fn)),
            error_fn: Some(Box::new(error_fn)),
            completed: false,
            errored: false,
        }
    }

    /// Creates a new `Subscriber` with only a `next` function; errors and
    /// completion are ignored unless handlers are added afterwards.
    pub fn on_next(next_fn: impl FnMut(NextFnType) + 'static + Send) -> Self {
        Subscriber {
            next_fn: Box::new(next_fn),
            complete_fn: None,
            error_fn: None,
            completed: false,
            errored: false,
        }
    }

    /// Sets the completion function, called when the stream completes.
    pub fn on_complete(&mut self, complete_fn: impl FnMut() + 'static + Send + Sync) {
        self.complete_fn = Some(Box::new(complete_fn));
    }

    /// Sets the error function, called when the stream signals an error.
    pub fn on_error(
        &mut self,
        error_fn: impl FnMut(Arc<dyn Error + Send + Sync>) + 'static + Send + Sync,
    ) {
        self.error_fn = Some(Box::new(error_fn));
    }

    fn is_terminated(&self) -> bool {
        self.completed || self.errored
    }
}

impl<T> Observer for Subscriber<T> {
    type NextFnType = T;

    fn next(&mut self, v: Self::NextFnType) {
        if self.is_terminated() {
            return;
        }
        (self.next_fn)(v);
    }

    fn complete(&mut self) {
        if self.is_terminated() {
            return;
        }
        self.completed = true;
        if let Some(cfn) = &mut self.complete_fn {
            (cfn)();
        }
    }

    fn error(&mut self, observable_error: Arc<dyn Error + Send + Sync>) {
        if self.is_terminated() {
            return;
        }
        self.errored = true;
        if let Some(efn) = &mut self.error_fn {
            (efn)(observable_error);
        }
    }
}

/// Handles used by `Subscription` to await asynchronous producers.
pub enum SubscriptionHandle {
    /// No task or thread to await.
    Nil,

    /// Join handle for a producer running on a `Tokio` task.
    JoinTask(JoinHandle<()>),

    /// Join handle for a producer running on an OS thread.
    JoinThread(ThreadJoinHandle<()>),
}

/// Represents an active subscription to an observable, allowing control over
/// the subscription.
///
/// Subscribing to an observable returns a `Subscription` which can cancel
/// further delivery via [`unsubscribe`] and, for asynchronous producers,
/// await their completion via [`join`] or [`join_concurrent`].
///
/// [`unsubscribe`]: trait.Unsubscribeable.html#tymethod.unsubscribe
/// [`join`]: struct.Subscription.html#method.join
/// [`join_concurrent`]: struct.Subscription.html#method.join_concurrent
pub struct Subscription {
    pub(crate) unsubscribe_logic: UnsubscribeLogic,
    pub(crate) subscription_future: SubscriptionHandle,
    pub(crate) runtime_handle: Result<runtime::Handle, runtime::TryCurrentError>,
}

impl Subscription {
    /// Creates a new `Subscription` with the given unsubscribe logic and
    /// producer handle.
    ///
    /// The ambient `Tokio` runtime handle, if any, is captured here so that
    /// [`UnsubscribeLogic::Future`] teardown can be spawned even when
    /// `unsubscribe` is later called from a non-async context.
    #[must_use]
    pub fn new(
        unsubscribe_logic: UnsubscribeLogic,
        subscription_future: SubscriptionHandle,
    ) -> Self {
        let runtime_handle = tokio::runtime::Handle::try_current();
        Subscription {
            unsubscribe_logic,
            subscription_future,
            runtime_handle,
        }
    }

    /// Awaits the completion of the producer task or thread associated with
    /// this subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if joining the producer thread or awaiting the
    /// producer task fails.
    pub async fn join_concurrent(self) -> Result<(), Box<dyn Any + Send>> {
        match self.subscription_future {
            SubscriptionHandle::JoinTask(task_handle) => {
                let r = task_handle.await;
                r.map_err(|e| Box::new(e) as Box<dyn Any + Send>)
            }
            SubscriptionHandle::JoinThread(thread_handle) => thread_handle.join(),
            SubscriptionHandle::Nil => Ok(()),
        }
    }

    /// Awaits the completion of the producer OS thread associated with this
    /// subscription, blocking the current thread.
    ///
    /// # Errors
    ///
    /// Returns an error if joining the producer thread fails.
    ///
    /// # Panics
    ///
    /// Panics if the producer runs on a `Tokio` task; await those with
    /// `join_concurrent().await` instead.
    pub fn join(self) -> Result<(), Box<dyn Any + Send>> {
        match self.subscription_future {
            SubscriptionHandle::JoinThread(thread_handle) => thread_handle.join(),
            SubscriptionHandle::Nil => Ok(()),
            SubscriptionHandle::JoinTask(_) => {
                panic!("subscription holds a Tokio task handle; use `join_concurrent().await` to await it")
            }
        }
    }
}

impl Unsubscribeable for Subscription {
    fn unsubscribe(self) {
        self.unsubscribe_logic.unsubscribe(self.runtime_handle);
    }
}

/// Unsubscribe strategies a subscription can carry.
pub enum UnsubscribeLogic {
    /// No unsubscribe logic.
    Nil,

    /// This subscription wraps another; unsubscribing propagates to it.
    Wrapped(Box<Subscription>),

    /// Unsubscribe logic defined by a function.
    Logic(Box<dyn FnOnce() + Send>),

    /// Asynchronous unsubscribe logic represented by a future. Use when the
    /// teardown needs to spawn `Tokio` tasks or `.await`.
    Future(Pin<Box<dyn Future<Output = ()> + Send>>),
}

impl UnsubscribeLogic {
    fn unsubscribe(
        mut self,
        runtime_handle: Result<runtime::Handle, runtime::TryCurrentError>,
    ) -> Self {
        match self {
            UnsubscribeLogic::Nil => (),
            UnsubscribeLogic::Logic(fnc) => {
                fnc();
                self = Self::Nil;
            }
            UnsubscribeLogic::Wrapped(subscription) => {
                subscription.unsubscribe();
                self = Self::Nil;
            }
            UnsubscribeLogic::Future(future) => {
                match runtime_handle {
                    Ok(handle) => {
                        handle.spawn(async {
                            future.await;
                        });
                    }
                    e @ Err(_) => {
                        e.expect(
                            "observable that uses Tokio tasks is called outside of Tokio runtime",
                        );
                    }
                }
                self = Self::Nil;
            }
        }
        self
    }
}
