//! The `observable` module provides the observable stream abstraction and the
//! filtering and truncating operators that bound it.
//!
//! An [`Observable`] is a cold description of how to produce a sequence for
//! one observer; subscribing runs the production logic and returns a
//! [`Subscription`]. Operators on [`ObservableExt`] wrap an observable into a
//! new one that filters, deduplicates, or truncates the stream for each
//! subscriber independently.

mod until;

use std::{
    collections::{HashSet, VecDeque},
    hash::Hash,
    mem,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use crate::errors::CallbackError;
use crate::observer::Observer;
use crate::scheduler::{CancelToken, Scheduler};
use crate::subscription::subscribe::{
    Subscribeable, Subscriber, Subscription, SubscriptionHandle, UnsubscribeLogic, Unsubscribeable,
};

use until::{cancel_slot, new_slot, DecisionCell, SubscriptionSlot};

/// A cold source of values that can be observed and transformed.
///
/// The observable owns no state itself; every call to [`subscribe`] runs the
/// stored production logic again, so two subscribers each get an independent
/// execution with independent operator state.
///
/// # Example
///
/// ```
/// use rxsieve::subscribe::{Subscriber, Subscription, SubscriptionHandle, UnsubscribeLogic};
/// use rxsieve::{Observable, ObservableExt, Observer, Subscribeable};
///
/// let mut evens = Observable::new(|mut subscriber: Subscriber<i32>| {
///     for i in 0..10 {
///         subscriber.next(i);
///     }
///     subscriber.complete();
///     Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::Nil)
/// })
/// .filter(|v| v % 2 == 0)
/// .take(3);
///
/// let observer = Subscriber::new(
///     |v| println!("got {}", v),
///     |_observable_error| {},
///     || println!("done"),
/// );
///
/// evens.subscribe(observer);
/// ```
///
/// [`subscribe`]: trait.Subscribeable.html#tymethod.subscribe
pub struct Observable<T> {
    subscribe_fn: Box<dyn FnMut(Subscriber<T>) -> Subscription + Send + Sync>,
}

impl<T> Observable<T> {
    /// Creates a new `Observable` from a subscribe function.
    ///
    /// The closure is invoked once per subscriber. It receives the
    /// `Subscriber` to push values into and returns a `Subscription` whose
    /// unsubscribe logic must stop the production and release any resources
    /// it holds.
    pub fn new(sf: impl FnMut(Subscriber<T>) -> Subscription + Send + Sync + 'static) -> Self {
        Observable {
            subscribe_fn: Box::new(sf),
        }
    }
}

impl<T: 'static> Subscribeable for Observable<T> {
    type ObsType = T;

    fn subscribe(&mut self, v: Subscriber<Self::ObsType>) -> Subscription {
        (self.subscribe_fn)(v)
    }
}

/// Takes the producer handle out of an upstream subscription so it can be
/// re-attached to the subscription returned to the downstream subscriber.
fn detach_handle(s: &mut Subscription) -> SubscriptionHandle {
    mem::replace(&mut s.subscription_future, SubscriptionHandle::Nil)
}

/// Common tail of every early-terminating operator: park the upstream
/// subscription in its slot (or cancel it if the cutoff already fell) and
/// build the downstream subscription whose unsubscribe tears down the
/// cutoff state, the optional timer, and the upstream.
fn guard_upstream(
    cell: &Arc<DecisionCell>,
    slot: &SubscriptionSlot,
    timer: Option<Arc<CancelToken>>,
    mut upstream: Subscription,
) -> Subscription {
    let handle = detach_handle(&mut upstream);
    cell.park_or_cancel(slot, upstream);
    let cell = Arc::clone(cell);
    let slot = Arc::clone(slot);
    Subscription::new(
        UnsubscribeLogic::Logic(Box::new(move || {
            cell.try_decide();
            if let Some(token) = &timer {
                token.cancel();
            }
            cancel_slot(&slot);
        })),
        handle,
    )
}

/// Converts a panic caught in a user callback into a downstream error and
/// cancels the upstream, exactly once.
fn deliver_fault<T>(
    operator: &'static str,
    payload: Box<dyn std::any::Any + Send>,
    o: &Arc<Mutex<Subscriber<T>>>,
    cell: &DecisionCell,
    slot: &SubscriptionSlot,
) {
    if cell.try_decide() {
        o.lock()
            .unwrap()
            .error(Arc::new(CallbackError::from_panic(operator, payload)));
        cancel_slot(slot);
    }
}

/// Operators that filter, deduplicate, or truncate an observable stream.
///
/// Every operator is a pure transform: it consumes an observable (and
/// parameters) and returns a new one, leaving the input untouched. All
/// per-subscription state is allocated inside the subscribe call and dropped
/// when that subscription terminates or is unsubscribed: counters, seen-key
/// sets, ring buffers, cutoff flags, held subscriptions and timers.
///
/// A panic inside a user-supplied predicate or key selector is caught at the
/// call site, converted into a [`CallbackError`] on the downstream error
/// channel, and the upstream subscription is cancelled; see the crate's
/// error-handling notes.
pub trait ObservableExt<T: 'static>: Subscribeable<ObsType = T> {
    /// Emits only the values for which `predicate` returns `true`.
    ///
    /// Errors and completion pass through unchanged.
    fn filter<P>(mut self, predicate: P) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        P: FnMut(&T) -> bool + Send + 'static,
    {
        let predicate = Arc::new(Mutex::new(predicate));
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let cell = DecisionCell::new();
            let cell_next = Arc::clone(&cell);
            let cell_e = Arc::clone(&cell);
            let cell_c = Arc::clone(&cell);
            let upstream = new_slot();
            let upstream_next = Arc::clone(&upstream);
            let upstream_e = Arc::clone(&upstream);
            let upstream_c = Arc::clone(&upstream);
            let predicate = Arc::clone(&predicate);

            let u = Subscriber::new(
                move |v| {
                    if cell_next.is_decided() {
                        return;
                    }
                    let verdict = {
                        let mut p = predicate.lock().unwrap();
                        catch_unwind(AssertUnwindSafe(|| p(&v)))
                    };
                    match verdict {
                        Ok(true) => o_shared.lock().unwrap().next(v),
                        Ok(false) => (),
                        Err(payload) => {
                            deliver_fault("filter", payload, &o_shared, &cell_next, &upstream_next);
                        }
                    }
                },
                move |err| {
                    if cell_e.try_decide() {
                        o_cloned_e.lock().unwrap().error(err);
                        cancel_slot(&upstream_e);
                    }
                },
                move || {
                    if cell_c.try_decide() {
                        o_cloned_c.lock().unwrap().complete();
                        cancel_slot(&upstream_c);
                    }
                },
            );
            guard_upstream(&cell, &upstream, None, self.subscribe(u))
        })
    }

    /// Emits each distinct value once, suppressing later duplicates.
    ///
    /// The set of seen values grows without bound with the number of
    /// distinct values for the lifetime of the subscription; that is the
    /// documented cost of the operator, not a leak.
    fn distinct(mut self) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        T: Clone + Eq + Hash + Send,
    {
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let mut seen: HashSet<T> = HashSet::new();

            let u = Subscriber::new(
                move |v: T| {
                    if seen.insert(v.clone()) {
                        o_shared.lock().unwrap().next(v);
                    }
                },
                move |err| o_cloned_e.lock().unwrap().error(err),
                move || o_cloned_c.lock().unwrap().complete(),
            );
            self.subscribe(u)
        })
    }

    /// Like [`distinct`], but deduplicates by the key computed with
    /// `selector` instead of by the value itself.
    ///
    /// [`distinct`]: ObservableExt::distinct
    fn distinct_key<K, F>(mut self, selector: F) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        K: Eq + Hash + Send + 'static,
        F: FnMut(&T) -> K + Send + 'static,
    {
        let selector = Arc::new(Mutex::new(selector));
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let cell = DecisionCell::new();
            let cell_next = Arc::clone(&cell);
            let cell_e = Arc::clone(&cell);
            let cell_c = Arc::clone(&cell);
            let upstream = new_slot();
            let upstream_next = Arc::clone(&upstream);
            let upstream_e = Arc::clone(&upstream);
            let upstream_c = Arc::clone(&upstream);
            let selector = Arc::clone(&selector);
            let mut seen: HashSet<K> = HashSet::new();

            let u = Subscriber::new(
                move |v| {
                    if cell_next.is_decided() {
                        return;
                    }
                    let key = {
                        let mut f = selector.lock().unwrap();
                        catch_unwind(AssertUnwindSafe(|| f(&v)))
                    };
                    match key {
                        Ok(key) => {
                            if seen.insert(key) {
                                o_shared.lock().unwrap().next(v);
                            }
                        }
                        Err(payload) => {
                            deliver_fault(
                                "distinct_key",
                                payload,
                                &o_shared,
                                &cell_next,
                                &upstream_next,
                            );
                        }
                    }
                },
                move |err| {
                    if cell_e.try_decide() {
                        o_cloned_e.lock().unwrap().error(err);
                        cancel_slot(&upstream_e);
                    }
                },
                move || {
                    if cell_c.try_decide() {
                        o_cloned_c.lock().unwrap().complete();
                        cancel_slot(&upstream_c);
                    }
                },
            );
            guard_upstream(&cell, &upstream, None, self.subscribe(u))
        })
    }

    /// Suppresses a value only when it equals the immediately preceding
    /// forwarded value; the full history is never consulted.
    fn distinct_until_changed(mut self) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        T: Clone + PartialEq + Send,
    {
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let mut last: Option<T> = None;

            let u = Subscriber::new(
                move |v: T| {
                    if last.as_ref() != Some(&v) {
                        last = Some(v.clone());
                        o_shared.lock().unwrap().next(v);
                    }
                },
                move |err| o_cloned_e.lock().unwrap().error(err),
                move || o_cloned_c.lock().unwrap().complete(),
            );
            self.subscribe(u)
        })
    }

    /// Like [`distinct_until_changed`], comparing keys computed with
    /// `selector` instead of the values themselves.
    ///
    /// [`distinct_until_changed`]: ObservableExt::distinct_until_changed
    fn distinct_until_changed_key<K, F>(mut self, selector: F) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        K: PartialEq + Send + 'static,
        F: FnMut(&T) -> K + Send + 'static,
    {
        let selector = Arc::new(Mutex::new(selector));
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let cell = DecisionCell::new();
            let cell_next = Arc::clone(&cell);
            let cell_e = Arc::clone(&cell);
            let cell_c = Arc::clone(&cell);
            let upstream = new_slot();
            let upstream_next = Arc::clone(&upstream);
            let upstream_e = Arc::clone(&upstream);
            let upstream_c = Arc::clone(&upstream);
            let selector = Arc::clone(&selector);
            let mut last: Option<K> = None;

            let u = Subscriber::new(
                move |v| {
                    if cell_next.is_decided() {
                        return;
                    }
                    let key = {
                        let mut f = selector.lock().unwrap();
                        catch_unwind(AssertUnwindSafe(|| f(&v)))
                    };
                    match key {
                        Ok(key) => {
                            if last.as_ref() != Some(&key) {
                                last = Some(key);
                                o_shared.lock().unwrap().next(v);
                            }
                        }
                        Err(payload) => {
                            deliver_fault(
                                "distinct_until_changed_key",
                                payload,
                                &o_shared,
                                &cell_next,
                                &upstream_next,
                            );
                        }
                    }
                },
                move |err| {
                    if cell_e.try_decide() {
                        o_cloned_e.lock().unwrap().error(err);
                        cancel_slot(&upstream_e);
                    }
                },
                move || {
                    if cell_c.try_decide() {
                        o_cloned_c.lock().unwrap().complete();
                        cancel_slot(&upstream_c);
                    }
                },
            );
            guard_upstream(&cell, &upstream, None, self.subscribe(u))
        })
    }

    /// Drops every value and forwards only the terminal signal.
    fn ignore_elements(mut self) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
    {
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_c = Arc::clone(&o_shared);

            let u = Subscriber::new(
                move |_v| {},
                move |err| o_shared.lock().unwrap().error(err),
                move || o_cloned_c.lock().unwrap().complete(),
            );
            self.subscribe(u)
        })
    }

    /// Emits at most the first `n` values, then completes downstream and
    /// cancels the upstream subscription.
    ///
    /// An upstream terminal signal arriving before the n-th value passes
    /// through unchanged; fewer than `n` items is not an error. Anything
    /// the upstream does after the cutoff, including erroring, is ignored.
    /// `take(0)` completes immediately without evaluating any value.
    fn take(mut self, n: usize) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
    {
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let cell = DecisionCell::new();
            let cell_next = Arc::clone(&cell);
            let cell_e = Arc::clone(&cell);
            let cell_c = Arc::clone(&cell);
            let upstream = new_slot();
            let upstream_next = Arc::clone(&upstream);
            let upstream_e = Arc::clone(&upstream);
            let upstream_c = Arc::clone(&upstream);
            let mut taken = 0_usize;

            if n == 0 {
                cell.try_decide();
                o_shared.lock().unwrap().complete();
            }

            let u = Subscriber::new(
                move |v| {
                    if taken >= n || cell_next.is_decided() {
                        return;
                    }
                    taken += 1;
                    o_shared.lock().unwrap().next(v);
                    if taken == n && cell_next.try_decide() {
                        o_shared.lock().unwrap().complete();
                        cancel_slot(&upstream_next);
                    }
                },
                move |err| {
                    if cell_e.try_decide() {
                        o_cloned_e.lock().unwrap().error(err);
                        cancel_slot(&upstream_e);
                    }
                },
                move || {
                    if cell_c.try_decide() {
                        o_cloned_c.lock().unwrap().complete();
                        cancel_slot(&upstream_c);
                    }
                },
            );
            guard_upstream(&cell, &upstream, None, self.subscribe(u))
        })
    }

    /// Drops the first `n` values and forwards everything after, including
    /// the upstream's terminal signal. `skip(0)` is a pass-through.
    fn skip(mut self, n: usize) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
    {
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let mut remaining = n;

            let u = Subscriber::new(
                move |v| {
                    if remaining > 0 {
                        remaining -= 1;
                        return;
                    }
                    o_shared.lock().unwrap().next(v);
                },
                move |err| o_cloned_e.lock().unwrap().error(err),
                move || o_cloned_c.lock().unwrap().complete(),
            );
            self.subscribe(u)
        })
    }

    /// Forwards values while `predicate` holds; on the first failing value
    /// completes downstream and cancels upstream. The failing value itself
    /// is not forwarded.
    fn take_while<P>(mut self, predicate: P) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        P: FnMut(&T) -> bool + Send + 'static,
    {
        let predicate = Arc::new(Mutex::new(predicate));
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let cell = DecisionCell::new();
            let cell_next = Arc::clone(&cell);
            let cell_e = Arc::clone(&cell);
            let cell_c = Arc::clone(&cell);
            let upstream = new_slot();
            let upstream_next = Arc::clone(&upstream);
            let upstream_e = Arc::clone(&upstream);
            let upstream_c = Arc::clone(&upstream);
            let predicate = Arc::clone(&predicate);

            let u = Subscriber::new(
                move |v| {
                    if cell_next.is_decided() {
                        return;
                    }
                    let verdict = {
                        let mut p = predicate.lock().unwrap();
                        catch_unwind(AssertUnwindSafe(|| p(&v)))
                    };
                    match verdict {
                        Ok(true) => o_shared.lock().unwrap().next(v),
                        Ok(false) => {
                            if cell_next.try_decide() {
                                o_shared.lock().unwrap().complete();
                                cancel_slot(&upstream_next);
                            }
                        }
                        Err(payload) => {
                            deliver_fault(
                                "take_while",
                                payload,
                                &o_shared,
                                &cell_next,
                                &upstream_next,
                            );
                        }
                    }
                },
                move |err| {
                    if cell_e.try_decide() {
                        o_cloned_e.lock().unwrap().error(err);
                        cancel_slot(&upstream_e);
                    }
                },
                move || {
                    if cell_c.try_decide() {
                        o_cloned_c.lock().unwrap().complete();
                        cancel_slot(&upstream_c);
                    }
                },
            );
            guard_upstream(&cell, &upstream, None, self.subscribe(u))
        })
    }

    /// Drops values while `predicate` holds; from the first value for which
    /// it fails, forwards that value and everything after. The predicate is
    /// not evaluated again once it has failed.
    fn skip_while<P>(mut self, predicate: P) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        P: FnMut(&T) -> bool + Send + 'static,
    {
        let predicate = Arc::new(Mutex::new(predicate));
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let cell = DecisionCell::new();
            let cell_next = Arc::clone(&cell);
            let cell_e = Arc::clone(&cell);
            let cell_c = Arc::clone(&cell);
            let upstream = new_slot();
            let upstream_next = Arc::clone(&upstream);
            let upstream_e = Arc::clone(&upstream);
            let upstream_c = Arc::clone(&upstream);
            let predicate = Arc::clone(&predicate);
            let mut skipping = true;

            let u = Subscriber::new(
                move |v| {
                    if cell_next.is_decided() {
                        return;
                    }
                    if !skipping {
                        o_shared.lock().unwrap().next(v);
                        return;
                    }
                    let verdict = {
                        let mut p = predicate.lock().unwrap();
                        catch_unwind(AssertUnwindSafe(|| p(&v)))
                    };
                    match verdict {
                        Ok(true) => (),
                        Ok(false) => {
                            skipping = false;
                            o_shared.lock().unwrap().next(v);
                        }
                        Err(payload) => {
                            deliver_fault(
                                "skip_while",
                                payload,
                                &o_shared,
                                &cell_next,
                                &upstream_next,
                            );
                        }
                    }
                },
                move |err| {
                    if cell_e.try_decide() {
                        o_cloned_e.lock().unwrap().error(err);
                        cancel_slot(&upstream_e);
                    }
                },
                move || {
                    if cell_c.try_decide() {
                        o_cloned_c.lock().unwrap().complete();
                        cancel_slot(&upstream_c);
                    }
                },
            );
            guard_upstream(&cell, &upstream, None, self.subscribe(u))
        })
    }

    /// Forwards values until `predicate` first matches; the matching value is
    /// the last one forwarded, then the stream completes and upstream is
    /// cancelled.
    ///
    /// This is the inclusive counterpart of [`take_while`] with the
    /// predicate's polarity flipped.
    ///
    /// [`take_while`]: ObservableExt::take_while
    fn take_until_match<P>(mut self, predicate: P) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        P: FnMut(&T) -> bool + Send + 'static,
    {
        let predicate = Arc::new(Mutex::new(predicate));
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let cell = DecisionCell::new();
            let cell_next = Arc::clone(&cell);
            let cell_e = Arc::clone(&cell);
            let cell_c = Arc::clone(&cell);
            let upstream = new_slot();
            let upstream_next = Arc::clone(&upstream);
            let upstream_e = Arc::clone(&upstream);
            let upstream_c = Arc::clone(&upstream);
            let predicate = Arc::clone(&predicate);

            let u = Subscriber::new(
                move |v| {
                    if cell_next.is_decided() {
                        return;
                    }
                    let verdict = {
                        let mut p = predicate.lock().unwrap();
                        catch_unwind(AssertUnwindSafe(|| p(&v)))
                    };
                    match verdict {
                        Ok(matched) => {
                            o_shared.lock().unwrap().next(v);
                            if matched && cell_next.try_decide() {
                                o_shared.lock().unwrap().complete();
                                cancel_slot(&upstream_next);
                            }
                        }
                        Err(payload) => {
                            deliver_fault(
                                "take_until_match",
                                payload,
                                &o_shared,
                                &cell_next,
                                &upstream_next,
                            );
                        }
                    }
                },
                move |err| {
                    if cell_e.try_decide() {
                        o_cloned_e.lock().unwrap().error(err);
                        cancel_slot(&upstream_e);
                    }
                },
                move || {
                    if cell_c.try_decide() {
                        o_cloned_c.lock().unwrap().complete();
                        cancel_slot(&upstream_c);
                    }
                },
            );
            guard_upstream(&cell, &upstream, None, self.subscribe(u))
        })
    }

    /// Drops values until `predicate` first matches; forwards the matching
    /// value and everything after it. The predicate is not evaluated again
    /// once it has matched.
    fn skip_until_match<P>(mut self, predicate: P) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        P: FnMut(&T) -> bool + Send + 'static,
    {
        let predicate = Arc::new(Mutex::new(predicate));
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let cell = DecisionCell::new();
            let cell_next = Arc::clone(&cell);
            let cell_e = Arc::clone(&cell);
            let cell_c = Arc::clone(&cell);
            let upstream = new_slot();
            let upstream_next = Arc::clone(&upstream);
            let upstream_e = Arc::clone(&upstream);
            let upstream_c = Arc::clone(&upstream);
            let predicate = Arc::clone(&predicate);
            let mut gate_open = false;

            let u = Subscriber::new(
                move |v| {
                    if cell_next.is_decided() {
                        return;
                    }
                    if gate_open {
                        o_shared.lock().unwrap().next(v);
                        return;
                    }
                    let verdict = {
                        let mut p = predicate.lock().unwrap();
                        catch_unwind(AssertUnwindSafe(|| p(&v)))
                    };
                    match verdict {
                        Ok(true) => {
                            gate_open = true;
                            o_shared.lock().unwrap().next(v);
                        }
                        Ok(false) => (),
                        Err(payload) => {
                            deliver_fault(
                                "skip_until_match",
                                payload,
                                &o_shared,
                                &cell_next,
                                &upstream_next,
                            );
                        }
                    }
                },
                move |err| {
                    if cell_e.try_decide() {
                        o_cloned_e.lock().unwrap().error(err);
                        cancel_slot(&upstream_e);
                    }
                },
                move || {
                    if cell_c.try_decide() {
                        o_cloned_c.lock().unwrap().complete();
                        cancel_slot(&upstream_c);
                    }
                },
            );
            guard_upstream(&cell, &upstream, None, self.subscribe(u))
        })
    }

    /// Forwards values until the timer started at subscribe time fires, then
    /// completes downstream and cancels upstream.
    ///
    /// The timer is registered with the given scheduler; when the upstream
    /// terminates first, its terminal signal passes through and the timer is
    /// cancelled.
    fn take_for<S>(mut self, duration: Duration, scheduler: S) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        S: Scheduler + Send + Sync + 'static,
    {
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let cell = DecisionCell::new();
            let cell_next = Arc::clone(&cell);
            let cell_e = Arc::clone(&cell);
            let cell_c = Arc::clone(&cell);
            let upstream = new_slot();
            let upstream_e = Arc::clone(&upstream);
            let upstream_c = Arc::clone(&upstream);

            let token = {
                let o_timer = Arc::clone(&o_shared);
                let cell_timer = Arc::clone(&cell);
                let upstream_timer = Arc::clone(&upstream);
                Arc::new(scheduler.schedule(
                    duration,
                    Box::new(move || {
                        if cell_timer.try_decide() {
                            o_timer.lock().unwrap().complete();
                            cancel_slot(&upstream_timer);
                        }
                    }),
                ))
            };
            let token_e = Arc::clone(&token);
            let token_c = Arc::clone(&token);

            let u = Subscriber::new(
                move |v| {
                    if cell_next.is_decided() {
                        return;
                    }
                    o_shared.lock().unwrap().next(v);
                },
                move |err| {
                    if cell_e.try_decide() {
                        o_cloned_e.lock().unwrap().error(err);
                        token_e.cancel();
                        cancel_slot(&upstream_e);
                    }
                },
                move || {
                    if cell_c.try_decide() {
                        o_cloned_c.lock().unwrap().complete();
                        token_c.cancel();
                        cancel_slot(&upstream_c);
                    }
                },
            );
            guard_upstream(&cell, &upstream, Some(token), self.subscribe(u))
        })
    }

    /// Drops values until the timer started at subscribe time fires, then
    /// forwards every subsequent value and the terminal signal unchanged.
    ///
    /// When the upstream terminates before the timer fires, the terminal
    /// signal is forwarded and the timer cancelled.
    fn skip_for<S>(mut self, duration: Duration, scheduler: S) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        S: Scheduler + Send + Sync + 'static,
    {
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let gate = Arc::new(Mutex::new(false));
            let gate_timer = Arc::clone(&gate);

            let token = Arc::new(scheduler.schedule(
                duration,
                Box::new(move || {
                    *gate_timer.lock().unwrap() = true;
                }),
            ));
            let token_e = Arc::clone(&token);
            let token_c = Arc::clone(&token);

            let u = Subscriber::new(
                move |v| {
                    if *gate.lock().unwrap() {
                        o_shared.lock().unwrap().next(v);
                    }
                },
                move |err| {
                    token_e.cancel();
                    o_cloned_e.lock().unwrap().error(err);
                },
                move || {
                    token_c.cancel();
                    o_cloned_c.lock().unwrap().complete();
                },
            );

            let mut s = self.subscribe(u);
            let handle = detach_handle(&mut s);
            Subscription::new(
                UnsubscribeLogic::Logic(Box::new(move || {
                    token.cancel();
                    s.unsubscribe();
                })),
                handle,
            )
        })
    }

    /// Buffers the last `n` values and, when the upstream completes, emits
    /// them in original order as a burst before completing.
    ///
    /// On an upstream error the buffer is discarded and only the error is
    /// delivered; the buffered values are lost.
    fn take_last(mut self, n: usize) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        T: Send,
    {
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let buffer: Arc<Mutex<VecDeque<T>>> = Arc::new(Mutex::new(VecDeque::new()));
            let buffer_e = Arc::clone(&buffer);
            let buffer_c = Arc::clone(&buffer);

            let u = Subscriber::new(
                move |v| {
                    if n == 0 {
                        return;
                    }
                    let mut buf = buffer.lock().unwrap();
                    if buf.len() == n {
                        buf.pop_front();
                    }
                    buf.push_back(v);
                },
                move |err| {
                    buffer_e.lock().unwrap().clear();
                    o_cloned_e.lock().unwrap().error(err);
                },
                move || {
                    let drained: Vec<T> = buffer_c.lock().unwrap().drain(..).collect();
                    let mut o = o_cloned_c.lock().unwrap();
                    for v in drained {
                        o.next(v);
                    }
                    o.complete();
                },
            );
            self.subscribe(u)
        })
    }

    /// Suppresses the final `n` values: each value is emitted only once `n`
    /// further values have arrived behind it, and the still-buffered tail is
    /// discarded at completion.
    fn skip_last(mut self, n: usize) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        T: Send,
    {
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let buffer: Arc<Mutex<VecDeque<T>>> = Arc::new(Mutex::new(VecDeque::new()));
            let buffer_e = Arc::clone(&buffer);
            let buffer_c = Arc::clone(&buffer);

            let u = Subscriber::new(
                move |v| {
                    if n == 0 {
                        o_shared.lock().unwrap().next(v);
                        return;
                    }
                    let evicted = {
                        let mut buf = buffer.lock().unwrap();
                        buf.push_back(v);
                        if buf.len() > n {
                            buf.pop_front()
                        } else {
                            None
                        }
                    };
                    if let Some(oldest) = evicted {
                        o_shared.lock().unwrap().next(oldest);
                    }
                },
                move |err| {
                    buffer_e.lock().unwrap().clear();
                    o_cloned_e.lock().unwrap().error(err);
                },
                move || {
                    buffer_c.lock().unwrap().clear();
                    o_cloned_c.lock().unwrap().complete();
                },
            );
            self.subscribe(u)
        })
    }

    /// Time-based [`take_last`]: at completion, emits the values that
    /// arrived within the last `duration` according to the scheduler's
    /// clock, then completes.
    ///
    /// Only `now()` is consulted; no timer is registered.
    ///
    /// [`take_last`]: ObservableExt::take_last
    fn take_last_for<S>(mut self, duration: Duration, scheduler: S) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        S: Scheduler + Send + Sync + 'static,
        T: Send,
    {
        let scheduler = Arc::new(scheduler);
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let buffer: Arc<Mutex<VecDeque<(T, Instant)>>> = Arc::new(Mutex::new(VecDeque::new()));
            let buffer_e = Arc::clone(&buffer);
            let buffer_c = Arc::clone(&buffer);
            let scheduler_next = Arc::clone(&scheduler);
            let scheduler_c = Arc::clone(&scheduler);

            let u = Subscriber::new(
                move |v| {
                    let now = scheduler_next.now();
                    let mut buf = buffer.lock().unwrap();
                    buf.push_back((v, now));
                    // Aged-out entries can never be emitted; drop them early
                    // to keep the buffer bounded by the window.
                    while let Some((_, arrived)) = buf.front() {
                        if now.duration_since(*arrived) > duration {
                            buf.pop_front();
                        } else {
                            break;
                        }
                    }
                },
                move |err| {
                    buffer_e.lock().unwrap().clear();
                    o_cloned_e.lock().unwrap().error(err);
                },
                move || {
                    let now = scheduler_c.now();
                    let drained: Vec<T> = buffer_c
                        .lock()
                        .unwrap()
                        .drain(..)
                        .filter(|(_, arrived)| now.duration_since(*arrived) <= duration)
                        .map(|(v, _)| v)
                        .collect();
                    let mut o = o_cloned_c.lock().unwrap();
                    for v in drained {
                        o.next(v);
                    }
                    o.complete();
                },
            );
            self.subscribe(u)
        })
    }

    /// Time-based [`skip_last`]: a value is emitted only once it has aged
    /// beyond `duration` according to the scheduler's clock. Completion
    /// flushes the values that have already aged out and discards the tail
    /// still inside the window.
    ///
    /// [`skip_last`]: ObservableExt::skip_last
    fn skip_last_for<S>(mut self, duration: Duration, scheduler: S) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
        S: Scheduler + Send + Sync + 'static,
        T: Send,
    {
        let scheduler = Arc::new(scheduler);
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let buffer: Arc<Mutex<VecDeque<(T, Instant)>>> = Arc::new(Mutex::new(VecDeque::new()));
            let buffer_e = Arc::clone(&buffer);
            let buffer_c = Arc::clone(&buffer);
            let scheduler_next = Arc::clone(&scheduler);
            let scheduler_c = Arc::clone(&scheduler);

            let u = Subscriber::new(
                move |v| {
                    let now = scheduler_next.now();
                    let ready: Vec<T> = {
                        let mut buf = buffer.lock().unwrap();
                        buf.push_back((v, now));
                        let mut out = Vec::new();
                        while let Some((_, arrived)) = buf.front() {
                            if now.duration_since(*arrived) > duration {
                                // Guaranteed to be followed by at least the
                                // window's worth of later values.
                                let (old, _) = buf.pop_front().unwrap();
                                out.push(old);
                            } else {
                                break;
                            }
                        }
                        out
                    };
                    if !ready.is_empty() {
                        let mut o = o_shared.lock().unwrap();
                        for old in ready {
                            o.next(old);
                        }
                    }
                },
                move |err| {
                    buffer_e.lock().unwrap().clear();
                    o_cloned_e.lock().unwrap().error(err);
                },
                move || {
                    // Values that aged out before completion were followed by
                    // a full window's worth of stream; they still belong to
                    // the output even when no later arrival flushed them.
                    let now = scheduler_c.now();
                    let aged: Vec<T> = buffer_c
                        .lock()
                        .unwrap()
                        .drain(..)
                        .filter(|(_, arrived)| now.duration_since(*arrived) > duration)
                        .map(|(v, _)| v)
                        .collect();
                    let mut o = o_cloned_c.lock().unwrap();
                    for old in aged {
                        o.next(old);
                    }
                    o.complete();
                },
            );
            self.subscribe(u)
        })
    }

    /// Forwards the primary stream until `notifier` emits any event, whether
    /// a value, completion, or an error, then completes downstream and
    /// cancels both subscriptions.
    ///
    /// The notifier's payload is discarded; a notifier *error* is treated as
    /// an ordinary cutoff signal, not forwarded downstream. When the primary
    /// terminates naturally first, its terminal signal passes through and
    /// the notifier subscription is cancelled. Whichever side fires first in
    /// delivery order wins; callbacks from the losing side are ignored.
    fn take_until<U: 'static>(mut self, mut notifier: Observable<U>) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
    {
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let cell = DecisionCell::new();
            let primary = new_slot();
            let companion = new_slot();

            // Any event from the notifier is the same cutoff.
            let cutoff = {
                let o_cut = Arc::clone(&o_shared);
                let cell_cut = Arc::clone(&cell);
                let primary_cut = Arc::clone(&primary);
                let companion_cut = Arc::clone(&companion);
                move || {
                    if cell_cut.try_decide() {
                        o_cut.lock().unwrap().complete();
                        cancel_slot(&primary_cut);
                        cancel_slot(&companion_cut);
                    }
                }
            };
            let cutoff_e = cutoff.clone();
            let cutoff_c = cutoff.clone();

            let nu = Subscriber::new(
                move |_notification: U| cutoff(),
                move |_err| cutoff_e(),
                move || cutoff_c(),
            );
            let ns = notifier.subscribe(nu);
            cell.park_or_cancel(&companion, ns);

            let cell_next = Arc::clone(&cell);
            let cell_e = Arc::clone(&cell);
            let cell_c = Arc::clone(&cell);
            let primary_e = Arc::clone(&primary);
            let primary_c = Arc::clone(&primary);
            let companion_e = Arc::clone(&companion);
            let companion_c = Arc::clone(&companion);

            let u = Subscriber::new(
                move |v| {
                    if cell_next.is_decided() {
                        return;
                    }
                    o_shared.lock().unwrap().next(v);
                },
                move |err| {
                    if cell_e.try_decide() {
                        o_cloned_e.lock().unwrap().error(err);
                        cancel_slot(&companion_e);
                        cancel_slot(&primary_e);
                    }
                },
                move || {
                    if cell_c.try_decide() {
                        o_cloned_c.lock().unwrap().complete();
                        cancel_slot(&companion_c);
                        cancel_slot(&primary_c);
                    }
                },
            );

            let mut s = self.subscribe(u);
            let handle = detach_handle(&mut s);
            cell.park_or_cancel(&primary, s);

            let cell_out = Arc::clone(&cell);
            let primary_out = Arc::clone(&primary);
            let companion_out = Arc::clone(&companion);
            Subscription::new(
                UnsubscribeLogic::Logic(Box::new(move || {
                    cell_out.try_decide();
                    cancel_slot(&primary_out);
                    cancel_slot(&companion_out);
                })),
                handle,
            )
        })
    }

    /// Drops the primary stream's values until `notifier` emits any event,
    /// whether a value, completion, or an error, then forwards every
    /// subsequent primary value and the primary's terminal signal.
    ///
    /// The notifier subscription is cancelled as soon as it has fired once;
    /// a notifier error opens the gate like any other emission. The
    /// primary's terminal signal passes through at any time.
    fn skip_until<U: 'static>(mut self, mut notifier: Observable<U>) -> Observable<T>
    where
        Self: Sized + Send + Sync + 'static,
    {
        Observable::new(move |o| {
            let o_shared = Arc::new(Mutex::new(o));
            let o_cloned_e = Arc::clone(&o_shared);
            let o_cloned_c = Arc::clone(&o_shared);

            let gate = Arc::new(Mutex::new(false));
            let companion = new_slot();

            let open = {
                let gate_open = Arc::clone(&gate);
                let companion_open = Arc::clone(&companion);
                move || {
                    *gate_open.lock().unwrap() = true;
                    cancel_slot(&companion_open);
                }
            };
            let open_e = open.clone();
            let open_c = open.clone();

            let nu = Subscriber::new(
                move |_notification: U| open(),
                move |_err| open_e(),
                move || open_c(),
            );
            let ns = notifier.subscribe(nu);
            {
                // Hold the gate while parking so a notifier firing on another
                // thread cannot slip between the check and the store.
                let gate_now = gate.lock().unwrap();
                if *gate_now {
                    drop(gate_now);
                    ns.unsubscribe();
                } else {
                    *companion.lock().unwrap() = Some(ns);
                }
            }

            let gate_next = Arc::clone(&gate);
            let companion_e = Arc::clone(&companion);
            let companion_c = Arc::clone(&companion);

            let u = Subscriber::new(
                move |v| {
                    if *gate_next.lock().unwrap() {
                        o_shared.lock().unwrap().next(v);
                    }
                },
                move |err| {
                    cancel_slot(&companion_e);
                    o_cloned_e.lock().unwrap().error(err);
                },
                move || {
                    cancel_slot(&companion_c);
                    o_cloned_c.lock().unwrap().complete();
                },
            );

            let mut s = self.subscribe(u);
            let handle = detach_handle(&mut s);
            let companion_out = Arc::clone(&companion);
            Subscription::new(
                UnsubscribeLogic::Logic(Box::new(move || {
                    cancel_slot(&companion_out);
                    s.unsubscribe();
                })),
                handle,
            )
        })
    }
}

impl<O, T: 'static> ObservableExt<T> for O where O: Subscribeable<ObsType = T> {}
