//! Integration tests for the shared work queue.

use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use devpool::queue::work_queue;

#[test]
fn fifo_order_for_single_consumer() {
    let (tx, rx) = work_queue();
    for i in 0..5 {
        assert!(tx.push(i));
    }
    assert_eq!(rx.len(), 5);

    let popped: Vec<i32> = std::iter::from_fn(|| rx.try_pop()).collect();
    assert_eq!(popped, [0, 1, 2, 3, 4]);
    assert!(rx.is_empty());
}

#[test]
fn try_pop_on_empty_returns_none() {
    let (_tx, rx) = work_queue::<u8>();
    assert_eq!(rx.try_pop(), None);
}

#[test]
fn pop_waits_for_a_push() {
    let (tx, rx) = work_queue();
    let producer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        tx.push("late");
    });

    assert_eq!(rx.pop(), Some("late"));
    producer.join().unwrap();
}

#[test]
fn pop_drains_before_reporting_closed() {
    let (tx, rx) = work_queue();
    tx.push(1);
    tx.push(2);
    drop(tx);

    assert_eq!(rx.pop(), Some(1));
    assert_eq!(rx.pop(), Some(2));
    assert_eq!(rx.pop(), None);
}

#[test]
fn dropping_the_last_sender_wakes_every_waiter() {
    let (tx, rx) = work_queue::<u32>();
    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let rx = rx.clone();
            thread::spawn(move || rx.pop())
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    let extra = tx.clone();
    drop(tx);
    // One sender is still alive, so nobody has woken yet.
    thread::sleep(Duration::from_millis(20));
    assert!(waiters.iter().all(|w| !w.is_finished()));
    drop(extra);

    for waiter in waiters {
        assert_eq!(waiter.join().unwrap(), None);
    }
}

#[test]
fn push_fails_once_every_receiver_is_gone() {
    let (tx, rx) = work_queue();
    drop(rx);
    assert!(!tx.push(1));
}

#[test]
fn drain_discards_queued_items() {
    let (tx, rx) = work_queue();
    for i in 0..3 {
        tx.push(i);
    }
    assert_eq!(rx.drain(), 3);
    assert!(rx.is_empty());
    assert!(tx.is_empty());
}

#[test]
fn concurrent_producers_and_consumers_lose_and_duplicate_nothing() {
    const PRODUCERS: u64 = 4;
    const CONSUMERS: usize = 4;
    const PER_PRODUCER: u64 = 2_500;

    let (tx, rx) = work_queue();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let rx = rx.clone();
            thread::spawn(move || std::iter::from_fn(|| rx.pop()).collect::<Vec<_>>())
        })
        .collect();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let tx = tx.clone();
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    tx.push(p * PER_PRODUCER + i);
                }
            })
        })
        .collect();
    drop(tx);

    for producer in producers {
        producer.join().unwrap();
    }

    let mut all = Vec::new();
    for consumer in consumers {
        all.extend(consumer.join().unwrap());
    }

    let total = (PRODUCERS * PER_PRODUCER) as usize;
    assert_eq!(all.len(), total);
    assert_eq!(all.iter().collect::<HashSet<_>>().len(), total);
}

#[test]
fn concurrent_try_pop_sees_each_item_once() {
    let (tx, rx) = work_queue();
    for i in 0..1_000u32 {
        tx.push(i);
    }

    let pollers: Vec<_> = (0..3)
        .map(|_| {
            let rx = rx.clone();
            thread::spawn(move || std::iter::from_fn(|| rx.try_pop()).collect::<Vec<_>>())
        })
        .collect();

    let mut all: Vec<u32> = pollers
        .into_iter()
        .flat_map(|p| p.join().unwrap())
        .collect();
    all.sort();
    assert_eq!(all, (0..1_000).collect::<Vec<_>>());
}
