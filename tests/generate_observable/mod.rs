use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use rxsieve::{
    subscribe::{Subscriber, Subscription, SubscriptionHandle, UnsubscribeLogic},
    Observable, Observer,
};

/// Emits `0..=end` from a dedicated OS thread, pausing briefly between
/// emissions so unsubscribe signals have a chance to land mid-stream.
/// `last_emit_assert` is called with the last value actually emitted.
pub fn generate_u32_observable(
    end: u32,
    last_emit_assert: impl FnMut(u32) + Send + Sync + 'static,
) -> Observable<u32> {
    let last_emit_assert = Arc::new(Mutex::new(last_emit_assert));

    Observable::new(move |mut o: Subscriber<_>| {
        let done = Arc::new(Mutex::new(false));
        let done_c = Arc::clone(&done);
        let (tx, rx) = std::sync::mpsc::channel();

        std::thread::spawn(move || {
            if let Ok(stop) = rx.recv() {
                *done_c.lock().unwrap() = stop;
            }
        });

        let last_emit_assert = Arc::clone(&last_emit_assert);
        let jh = std::thread::spawn(move || {
            let mut last_emit = 0;

            for i in 0..=end {
                if *done.lock().unwrap() {
                    break;
                }
                last_emit = i;
                o.next(i);
                std::thread::sleep(Duration::from_millis(1));
            }
            o.complete();
            last_emit_assert.lock().unwrap()(last_emit);
        });

        Subscription::new(
            UnsubscribeLogic::Logic(Box::new(move || {
                if tx.send(true).is_err() {
                    eprintln!("receiver dropped");
                }
            })),
            SubscriptionHandle::JoinThread(jh),
        )
    })
}

/// `Tokio` task flavor of [`generate_u32_observable`]; unsubscribing sends a
/// stop signal through an async channel.
pub fn generate_u32_observable_async(
    end: u32,
    last_emit_assert: impl FnMut(u32) + Send + Sync + 'static,
) -> Observable<u32> {
    let last_emit_assert = Arc::new(Mutex::new(last_emit_assert));

    Observable::new(move |mut o: Subscriber<_>| {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<bool>(10);

        let last_emit_assert = Arc::clone(&last_emit_assert);
        let jh = tokio::task::spawn(async move {
            let mut last_emit = 0;

            for i in 0..=end {
                if rx.try_recv().is_ok() {
                    break;
                }
                last_emit = i;
                o.next(i);
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            o.complete();
            last_emit_assert.lock().unwrap()(last_emit);
        });

        Subscription::new(
            UnsubscribeLogic::Future(Box::pin(async move {
                if tx.send(true).await.is_err() {
                    eprintln!("receiver dropped");
                }
            })),
            SubscriptionHandle::JoinTask(jh),
        )
    })
}

/// Emits `0..=end` from an OS thread and then errors instead of completing.
pub fn generate_u32_observable_with_error(
    end: u32,
    error_message: &'static str,
) -> Observable<u32> {
    Observable::new(move |mut o: Subscriber<_>| {
        let jh = std::thread::spawn(move || {
            for i in 0..=end {
                o.next(i);
                std::thread::sleep(Duration::from_millis(1));
            }
            o.error(Arc::new(std::io::Error::new(
                std::io::ErrorKind::Other,
                error_message,
            )));
        });

        Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::JoinThread(jh))
    })
}
