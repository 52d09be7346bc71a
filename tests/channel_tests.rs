#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for the bounded handoff channel
//!
//! # Test Coverage
//!
//! - A push into a full channel suspends until a pop makes room
//! - A pop on an empty channel suspends until a push arrives
//! - Waiting consumers are served in arrival order
//! - Concurrent producers lose and duplicate nothing
//!
//! Tasks run on a single `may` worker; the test thread plays the other side.

mod common;

use std::collections::HashSet;
use std::sync::mpsc;
use std::time::Duration;

use common::test_server::setup_may_runtime;
use common::wait;
use tasklane::channel::HandoffChannel;
use tasklane::scheduler::{Scheduler, TaskState};
use tasklane::Error;

const WAIT: Duration = Duration::from_secs(2);

#[test]
fn test_zero_capacity_rejected() {
    assert!(matches!(
        HandoffChannel::<u8>::new(0),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn test_push_into_full_channel_suspends_until_pop() {
    setup_may_runtime();
    let scheduler = Scheduler::default();
    let ch = HandoffChannel::new(1).unwrap();
    ch.push("A");

    let (tx, rx) = mpsc::channel();
    let producer_ch = ch.clone();
    let id = scheduler.spawn("producer", move |task| {
        task.push(&producer_ch, "B");
        tx.send("pushed B").unwrap();
        Ok(())
    });

    assert!(wait::until(WAIT, || scheduler.state(id) == Some(TaskState::Suspended)));
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    assert_eq!(ch.len(), 1);

    assert_eq!(ch.pop(), "A");
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), "pushed B");
    assert_eq!(ch.pop(), "B");
    assert!(ch.is_empty());
}

#[test]
fn test_pop_before_push_receives_value() {
    setup_may_runtime();
    let scheduler = Scheduler::default();
    let ch = HandoffChannel::new(1).unwrap();

    let (tx, rx) = mpsc::channel();
    let consumer_ch = ch.clone();
    let id = scheduler.spawn("consumer", move |task| {
        let v: u32 = task.pop(&consumer_ch);
        tx.send(v).unwrap();
        Ok(())
    });

    assert!(wait::until(WAIT, || scheduler.state(id) == Some(TaskState::Suspended)));
    ch.push(7);
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 7);
    assert!(wait::until(WAIT, || scheduler.state(id).is_none()));
}

#[test]
fn test_waiting_consumers_served_in_arrival_order() {
    setup_may_runtime();
    let scheduler = Scheduler::default();
    let ch = HandoffChannel::new(1).unwrap();
    let (tx, rx) = mpsc::channel();

    for name in ["first", "second"] {
        let ch = ch.clone();
        let tx = tx.clone();
        let id = scheduler.spawn(name, move |task| {
            let v: u32 = task.pop(&ch);
            tx.send((name, v)).unwrap();
            Ok(())
        });
        assert!(wait::until(WAIT, || scheduler.state(id) == Some(TaskState::Suspended)));
        std::thread::sleep(Duration::from_millis(10));
    }

    ch.push(1);
    ch.push(2);
    let mut got = vec![
        rx.recv_timeout(WAIT).unwrap(),
        rx.recv_timeout(WAIT).unwrap(),
    ];
    got.sort();
    assert_eq!(got, vec![("first", 1), ("second", 2)]);
}

#[test]
fn test_concurrent_producers_lose_nothing() {
    setup_may_runtime();
    let scheduler = Scheduler::default();
    let ch = HandoffChannel::new(3).unwrap();
    let producers = 4;
    let per_producer = 50;

    for p in 0..producers {
        let ch = ch.clone();
        scheduler.spawn("producer", move |task| {
            for i in 0..per_producer {
                task.push(&ch, p * 1000 + i);
                if i % 7 == 0 {
                    task.sleep(Duration::from_millis(1));
                }
            }
            Ok(())
        });
    }

    let mut seen = HashSet::new();
    for _ in 0..producers * per_producer {
        assert!(seen.insert(ch.pop()), "value delivered twice");
        assert!(ch.len() <= ch.capacity());
    }
    assert_eq!(seen.len(), (producers * per_producer) as usize);
    assert!(scheduler.drain(WAIT));
    assert!(ch.try_pop().is_none());
}

#[test]
fn test_try_variants_never_block() {
    let ch = HandoffChannel::new(1).unwrap();
    assert_eq!(ch.try_pop(), None);
    assert_eq!(ch.try_push(1), Ok(()));
    assert_eq!(ch.try_push(2), Err(2));
    assert_eq!(ch.try_pop(), Some(1));
}
