//! Subscription management: attaching observers and cancelling delivery.
//!
//! This module provides the [`Subscriber`] type for handling observed values,
//! errors and completions, and the [`Subscription`] type for controlling an
//! active subscription, including unsubscribing and awaiting asynchronous
//! producers.
//!
//! [`Subscriber`]: subscribe::Subscriber
//! [`Subscription`]: subscribe::Subscription
pub mod subscribe;
