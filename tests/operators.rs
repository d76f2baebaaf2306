mod generate_observable;

use generate_observable::{
    generate_u32_observable, generate_u32_observable_async, generate_u32_observable_with_error,
};

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use rxsieve::{
    scheduler::{TaskScheduler, ThreadScheduler},
    subscribe::{Subscriber, Subscription, SubscriptionHandle, UnsubscribeLogic},
    Observable, ObservableExt, Observer, Subscribeable, Unsubscribeable,
};

struct CheckFinished {
    last_value: u32,
    completed: bool,
}

#[test]
fn filter_observable() {
    let last = 100;
    let check = Arc::new(Mutex::new(CheckFinished {
        last_value: 0,
        completed: false,
    }));
    let check_c1 = Arc::clone(&check);
    let check_c2 = Arc::clone(&check);

    let mut odds = generate_u32_observable(last, move |last_emit| {
        assert_eq!(
            last_emit, last,
            "filter must not stop the producer, expected last emit {} but got {}",
            last, last_emit
        );
    })
    .filter(|v| v % 2 != 0);

    let o = Subscriber::new(
        move |v: u32| {
            assert!(v % 2 != 0, "even value {} passed the filter", v);
            check_c1.lock().unwrap().last_value = v;
        },
        |_observable_error| {},
        move || {
            check_c2.lock().unwrap().completed = true;
        },
    );

    let s = odds.subscribe(o);
    assert!(s.join().is_ok());
    assert_eq!(check.lock().unwrap().last_value, 99);
    assert!(
        check.lock().unwrap().completed,
        "filter did not complete the observable"
    );
}

#[test]
fn take_stops_producer_early() {
    let check = Arc::new(Mutex::new(CheckFinished {
        last_value: 0,
        completed: false,
    }));
    let check_c1 = Arc::clone(&check);
    let check_c2 = Arc::clone(&check);

    let mut first_seven = generate_u32_observable(1000, |last_emit| {
        assert!(
            last_emit < 1000,
            "take did not stop the producer, last emit was {}",
            last_emit
        );
    })
    .take(7);

    let o = Subscriber::new(
        move |v: u32| {
            assert!(v < 7, "value {} emitted past the cutoff", v);
            check_c1.lock().unwrap().last_value = v;
        },
        |_observable_error| {},
        move || {
            check_c2.lock().unwrap().completed = true;
        },
    );

    let s = first_seven.subscribe(o);
    assert!(s.join().is_ok());
    assert_eq!(check.lock().unwrap().last_value, 6);
    assert!(
        check.lock().unwrap().completed,
        "take did not complete the observable"
    );
}

#[test]
fn take_while_stops_producer_early() {
    let check = Arc::new(Mutex::new(CheckFinished {
        last_value: 0,
        completed: false,
    }));
    let check_c1 = Arc::clone(&check);
    let check_c2 = Arc::clone(&check);

    let mut prefix = generate_u32_observable(1000, |last_emit| {
        assert!(
            last_emit < 1000,
            "take_while did not stop the producer, last emit was {}",
            last_emit
        );
    })
    .take_while(|v| *v < 5);

    let o = Subscriber::new(
        move |v: u32| {
            assert!(v < 5, "value {} violates the predicate", v);
            check_c1.lock().unwrap().last_value = v;
        },
        |_observable_error| {},
        move || {
            check_c2.lock().unwrap().completed = true;
        },
    );

    let s = prefix.subscribe(o);
    assert!(s.join().is_ok());
    assert_eq!(check.lock().unwrap().last_value, 4);
    assert!(check.lock().unwrap().completed);
}

#[test]
fn take_until_match_is_inclusive() {
    let check = Arc::new(Mutex::new(CheckFinished {
        last_value: 0,
        completed: false,
    }));
    let check_c1 = Arc::clone(&check);
    let check_c2 = Arc::clone(&check);

    let mut through_five = generate_u32_observable(1000, |last_emit| {
        assert!(last_emit < 1000, "producer was not stopped");
    })
    .take_until_match(|v| *v == 5);

    let o = Subscriber::new(
        move |v: u32| {
            check_c1.lock().unwrap().last_value = v;
        },
        |_observable_error| {},
        move || {
            check_c2.lock().unwrap().completed = true;
        },
    );

    let s = through_five.subscribe(o);
    assert!(s.join().is_ok());
    assert_eq!(
        check.lock().unwrap().last_value,
        5,
        "matching value must be the last one emitted"
    );
    assert!(check.lock().unwrap().completed);
}

#[test]
fn skip_then_skip_last_trims_both_ends() {
    let collected = Arc::new(Mutex::new(Vec::new()));
    let collected_c = Arc::clone(&collected);
    let completed = Arc::new(Mutex::new(false));
    let completed_c = Arc::clone(&completed);

    let mut middle = generate_u32_observable(20, |_| {}).skip(5).skip_last(5);

    let o = Subscriber::new(
        move |v: u32| collected_c.lock().unwrap().push(v),
        |_observable_error| {},
        move || *completed_c.lock().unwrap() = true,
    );

    let s = middle.subscribe(o);
    assert!(s.join().is_ok());
    assert_eq!(*collected.lock().unwrap(), (5..=15).collect::<Vec<u32>>());
    assert!(*completed.lock().unwrap());
}

#[test]
fn take_last_emits_burst_on_completion() {
    let collected = Arc::new(Mutex::new(Vec::new()));
    let collected_c = Arc::clone(&collected);

    let mut tail = generate_u32_observable(50, |_| {}).take_last(3);

    let o = Subscriber::new(
        move |v: u32| collected_c.lock().unwrap().push(v),
        |_observable_error| {},
        move || {},
    );

    let s = tail.subscribe(o);
    assert!(s.join().is_ok());
    assert_eq!(*collected.lock().unwrap(), vec![48, 49, 50]);
}

#[test]
fn distinct_key_does_not_stop_producer() {
    let collected = Arc::new(Mutex::new(Vec::new()));
    let collected_c = Arc::clone(&collected);

    let last = 100;
    let mut residues = generate_u32_observable(last, move |last_emit| {
        assert_eq!(
            last_emit, last,
            "distinct_key must not cancel the producer"
        );
    })
    .distinct_key(|v| v % 3);

    let o = Subscriber::new(
        move |v: u32| collected_c.lock().unwrap().push(v),
        |_observable_error| {},
        move || {},
    );

    let s = residues.subscribe(o);
    assert!(s.join().is_ok());
    assert_eq!(*collected.lock().unwrap(), vec![0, 1, 2]);
}

#[test]
fn ignore_elements_emits_nothing() {
    let completed = Arc::new(Mutex::new(false));
    let completed_c = Arc::clone(&completed);

    let mut silent = generate_u32_observable(30, |_| {}).ignore_elements();

    let o = Subscriber::new(
        move |v: u32| panic!("ignore_elements leaked value {}", v),
        |_observable_error| {},
        move || *completed_c.lock().unwrap() = true,
    );

    let s = silent.subscribe(o);
    assert!(s.join().is_ok());
    assert!(*completed.lock().unwrap());
}

#[test]
fn upstream_error_reaches_subscriber() {
    let received = Arc::new(Mutex::new(String::new()));
    let received_c = Arc::clone(&received);

    let mut first = generate_u32_observable_with_error(5, "stream failed").take(100);

    let o = Subscriber::new(
        |_v: u32| {},
        move |observable_error| {
            *received_c.lock().unwrap() = observable_error.to_string();
        },
        move || panic!("errored stream must not complete"),
    );

    let s = first.subscribe(o);
    assert!(s.join().is_ok());
    assert_eq!(*received.lock().unwrap(), "stream failed");
}

#[test]
fn unsubscribe_stops_thread_producer() {
    let mut stream = generate_u32_observable(1000, |last_emit| {
        assert!(
            last_emit < 1000,
            "unsubscribe did not stop the producer, last emit was {}",
            last_emit
        );
    })
    .filter(|v| v % 2 == 0);

    let o = Subscriber::new(|_v: u32| {}, |_observable_error| {}, || {});

    let s = stream.subscribe(o);
    std::thread::sleep(Duration::from_millis(10));
    s.unsubscribe();
}

#[test]
fn take_for_cuts_off_with_thread_scheduler() {
    let check = Arc::new(Mutex::new(CheckFinished {
        last_value: 0,
        completed: false,
    }));
    let check_c1 = Arc::clone(&check);
    let check_c2 = Arc::clone(&check);

    let mut windowed = generate_u32_observable(1000, |last_emit| {
        assert!(
            last_emit < 1000,
            "take_for did not stop the producer, last emit was {}",
            last_emit
        );
    })
    .take_for(Duration::from_millis(50), ThreadScheduler);

    let o = Subscriber::new(
        move |v: u32| {
            check_c1.lock().unwrap().last_value = v;
        },
        |_observable_error| {},
        move || {
            check_c2.lock().unwrap().completed = true;
        },
    );

    let s = windowed.subscribe(o);
    assert!(s.join().is_ok());
    assert!(
        check.lock().unwrap().completed,
        "take_for did not complete the observable when the timer fired"
    );
    assert!(check.lock().unwrap().last_value < 1000);
}

#[test]
fn skip_for_drops_leading_window() {
    let collected = Arc::new(Mutex::new(Vec::new()));
    let collected_c = Arc::clone(&collected);
    let completed = Arc::new(Mutex::new(false));
    let completed_c = Arc::clone(&completed);

    let mut gated = generate_u32_observable(100, |_| {})
        .skip_for(Duration::from_millis(20), ThreadScheduler);

    let o = Subscriber::new(
        move |v: u32| collected_c.lock().unwrap().push(v),
        |_observable_error| {},
        move || *completed_c.lock().unwrap() = true,
    );

    let s = gated.subscribe(o);
    assert!(s.join().is_ok());
    assert!(*completed.lock().unwrap());
    let collected = collected.lock().unwrap();
    assert!(
        !collected.is_empty(),
        "values after the window should pass through"
    );
    assert!(
        collected[0] > 0,
        "values inside the window should have been dropped"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn take_until_companion_stops_task_producer() {
    let check = Arc::new(Mutex::new(CheckFinished {
        last_value: 0,
        completed: false,
    }));
    let check_c1 = Arc::clone(&check);
    let check_c2 = Arc::clone(&check);

    let notifier = Observable::new(|mut o: Subscriber<()>| {
        let jh = tokio::task::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            o.next(());
            o.complete();
        });
        Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::JoinTask(jh))
    });

    let mut bounded = generate_u32_observable_async(1000, |last_emit| {
        assert!(
            last_emit < 1000,
            "companion cutoff did not stop the producer, last emit was {}",
            last_emit
        );
    })
    .take_until(notifier);

    let o = Subscriber::new(
        move |v: u32| {
            check_c1.lock().unwrap().last_value = v;
        },
        |_observable_error| {},
        move || {
            check_c2.lock().unwrap().completed = true;
        },
    );

    let s = bounded.subscribe(o);
    assert!(s.join_concurrent().await.is_ok());
    assert!(
        check.lock().unwrap().completed,
        "companion cutoff must complete the downstream"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn skip_until_companion_opens_gate() {
    let collected = Arc::new(Mutex::new(Vec::new()));
    let collected_c = Arc::clone(&collected);
    let completed = Arc::new(Mutex::new(false));
    let completed_c = Arc::clone(&completed);

    let notifier = Observable::new(|mut o: Subscriber<()>| {
        let jh = tokio::task::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            o.next(());
        });
        Subscription::new(UnsubscribeLogic::Nil, SubscriptionHandle::JoinTask(jh))
    });

    let mut gated = generate_u32_observable_async(100, |_| {}).skip_until(notifier);

    let o = Subscriber::new(
        move |v: u32| collected_c.lock().unwrap().push(v),
        |_observable_error| {},
        move || *completed_c.lock().unwrap() = true,
    );

    let s = gated.subscribe(o);
    assert!(s.join_concurrent().await.is_ok());
    assert!(*completed.lock().unwrap());
    let collected = collected.lock().unwrap();
    assert!(!collected.is_empty());
    assert!(
        collected[0] > 0,
        "values before the notifier fired should have been dropped"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn take_for_cuts_off_with_task_scheduler() {
    let completed = Arc::new(Mutex::new(false));
    let completed_c = Arc::clone(&completed);

    let mut windowed = generate_u32_observable_async(1000, |last_emit| {
        assert!(last_emit < 1000, "timer cutoff did not stop the producer");
    })
    .take_for(Duration::from_millis(40), TaskScheduler);

    let o = Subscriber::new(
        |_v: u32| {},
        |_observable_error| {},
        move || *completed_c.lock().unwrap() = true,
    );

    let s = windowed.subscribe(o);
    assert!(s.join_concurrent().await.is_ok());
    assert!(*completed.lock().unwrap());
}
