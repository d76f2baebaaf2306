//! Shared cutoff machinery for operators that terminate a subscription early.
//!
//! The take-family operators and the companion-observable variants all reach
//! a point where exactly one of several competing events must decide the
//! outcome: the n-th value, a failing predicate, a timer, a companion
//! emission, or the upstream's own terminal signal. Every event arriving
//! after the decision must be ignored. [`DecisionCell`] is that one-shot state
//! machine; [`SubscriptionSlot`] holds the upstream (or companion)
//! subscription so whichever side decides can cancel it.

use std::sync::{Arc, Mutex};

use crate::subscription::subscribe::{Subscription, Unsubscribeable};

/// Holder for a subscription an operator may need to cancel from a callback.
///
/// The slot starts empty and is filled once `subscribe` on the upstream has
/// returned. Draining the slot is idempotent; a synchronous upstream that
/// terminates before the slot is filled is handled by [`DecisionCell::park_or_cancel`].
pub(crate) type SubscriptionSlot = Arc<Mutex<Option<Subscription>>>;

pub(crate) fn new_slot() -> SubscriptionSlot {
    Arc::new(Mutex::new(None))
}

/// Takes and cancels the subscription in `slot`, if any.
pub(crate) fn cancel_slot(slot: &SubscriptionSlot) {
    let taken = slot.lock().unwrap().take();
    if let Some(s) = taken {
        s.unsubscribe();
    }
}

enum Decision {
    Undecided,
    Decided,
}

/// One-shot {Undecided, Decided} state machine guarding an operator's cutoff.
///
/// All callbacks racing to terminate a subscription funnel through
/// [`try_decide`]; exactly one caller observes the transition and performs
/// the terminal work, every later caller becomes a no-op. The internal mutex
/// is what makes this safe when primary and companion callbacks arrive from
/// different threads.
///
/// [`try_decide`]: DecisionCell::try_decide
pub(crate) struct DecisionCell {
    decided: Mutex<Decision>,
}

impl DecisionCell {
    pub(crate) fn new() -> Arc<DecisionCell> {
        Arc::new(DecisionCell {
            decided: Mutex::new(Decision::Undecided),
        })
    }

    /// Attempts the Undecided -> Decided transition. Returns `true` for the
    /// single caller that makes it.
    pub(crate) fn try_decide(&self) -> bool {
        let mut decision = self.decided.lock().unwrap();
        match *decision {
            Decision::Undecided => {
                *decision = Decision::Decided;
                true
            }
            Decision::Decided => false,
        }
    }

    pub(crate) fn is_decided(&self) -> bool {
        matches!(*self.decided.lock().unwrap(), Decision::Decided)
    }

    /// Parks `s` in `slot` so deciding callbacks can cancel it, or cancels
    /// `s` on the spot when the decision already fell while the upstream
    /// subscribe call was still running (synchronous sources).
    ///
    /// The decision lock is held across the store, so a decision made on
    /// another thread either sees the parked subscription or forces the
    /// cancel here; the subscription cannot slip through uncancelled.
    pub(crate) fn park_or_cancel(&self, slot: &SubscriptionSlot, s: Subscription) {
        let decision = self.decided.lock().unwrap();
        match *decision {
            Decision::Decided => {
                drop(decision);
                s.unsubscribe();
            }
            Decision::Undecided => {
                *slot.lock().unwrap() = Some(s);
            }
        }
    }
}
