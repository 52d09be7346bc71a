#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

//! Integration tests for the cooperative scheduler and deferred callbacks
//!
//! # Test Coverage
//!
//! - `spawn` returns before the task body runs
//! - Deferred callbacks run last-registered-first, after the body and before
//!   the task is terminated
//! - Defers still run when the body errors or panics, and failures are counted
//! - A defer may spawn new tasks
//! - Sleep yields to other tasks
//! - `drain` waits for live tasks and gives up on stuck ones
//! - Channel operations that complete at once are not counted as parks
//!
//! All tests share one `may` worker thread, so tasks only interleave at
//! suspension points.

mod common;

use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use common::test_server::setup_may_runtime;
use common::wait;
use tasklane::channel::HandoffChannel;
use tasklane::scheduler::{Scheduler, TaskState};
use tasklane::Error;

const WAIT: Duration = Duration::from_secs(2);

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn record(log: &Log, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[test]
fn test_spawn_does_not_run_body_synchronously() {
    setup_may_runtime();
    let scheduler = Scheduler::default();
    let events = log();

    let parent_log = Arc::clone(&events);
    scheduler.spawn("parent", move |task| {
        let child_log = Arc::clone(&parent_log);
        task.spawn("child", move |_| {
            record(&child_log, "child");
            Ok(())
        });
        record(&parent_log, "parent after spawn");
        Ok(())
    });

    assert!(scheduler.drain(WAIT));
    assert_eq!(entries(&events), vec!["parent after spawn", "child"]);
}

#[test]
fn test_defers_run_lifo_before_termination() {
    setup_may_runtime();
    let scheduler = Scheduler::default();
    let events = log();

    let body_log = Arc::clone(&events);
    let id = scheduler.spawn("defers", move |task| {
        let id = task.id();
        for name in ["D1", "D2"] {
            let log = Arc::clone(&body_log);
            let sched = task.scheduler().clone();
            task.defer(move || {
                let state = sched.state(id);
                record(&log, format!("{name} {state:?}"));
            });
        }
        record(&body_log, "body");
        Ok(())
    });

    assert!(wait::until(WAIT, || scheduler.state(id).is_none()));
    assert_eq!(
        entries(&events),
        vec!["body", "D2 Some(Runnable)", "D1 Some(Runnable)"]
    );
}

#[test]
fn test_defers_run_when_body_fails() {
    setup_may_runtime();
    let scheduler = Scheduler::default();
    let events = log();

    let err_log = Arc::clone(&events);
    scheduler.spawn("fails", move |task| {
        let log = Arc::clone(&err_log);
        task.defer(move || record(&log, "cleanup after error"));
        Err(Error::invalid("bad input"))
    });

    let panic_log = Arc::clone(&events);
    scheduler.spawn("panics", move |task| {
        let log = Arc::clone(&panic_log);
        task.defer(move || record(&log, "cleanup after panic"));
        panic!("task body blew up");
    });

    assert!(scheduler.drain(WAIT));
    let mut got = entries(&events);
    got.sort();
    assert_eq!(got, vec!["cleanup after error", "cleanup after panic"]);

    let stats = scheduler.stats();
    assert_eq!(stats.spawned, 2);
    assert_eq!(stats.terminated, 2);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.live, 0);
}

#[test]
fn test_panicking_defer_does_not_skip_others() {
    setup_may_runtime();
    let scheduler = Scheduler::default();
    let events = log();

    let body_log = Arc::clone(&events);
    scheduler.spawn("noisy-cleanup", move |task| {
        let log = Arc::clone(&body_log);
        task.defer(move || record(&log, "first registered"));
        task.defer(|| panic!("cleanup blew up"));
        Ok(())
    });

    assert!(scheduler.drain(WAIT));
    assert_eq!(entries(&events), vec!["first registered"]);
    assert_eq!(scheduler.stats().failed, 0);
}

#[test]
fn test_defer_can_spawn_task() {
    setup_may_runtime();
    let scheduler = Scheduler::default();
    let (tx, rx) = mpsc::channel();

    scheduler.spawn("spawner", move |task| {
        let sched = task.scheduler().clone();
        task.defer(move || {
            sched.spawn("spawned-from-defer", move |_| {
                tx.send("ran").unwrap();
                Ok(())
            });
        });
        Ok(())
    });

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), "ran");
    assert!(scheduler.drain(WAIT));
    assert_eq!(scheduler.stats().spawned, 2);
}

#[test]
fn test_sleep_yields_to_other_tasks() {
    setup_may_runtime();
    let scheduler = Scheduler::default();
    let events = log();

    let sleeper_log = Arc::clone(&events);
    let sleeper = scheduler.spawn("sleeper", move |task| {
        record(&sleeper_log, "sleeper start");
        task.sleep(Duration::from_millis(30));
        record(&sleeper_log, "sleeper end");
        Ok(())
    });
    assert!(wait::until(WAIT, || {
        scheduler.state(sleeper) == Some(TaskState::Suspended)
    }));

    let runner_log = Arc::clone(&events);
    scheduler.spawn("runner", move |_| {
        record(&runner_log, "runner");
        Ok(())
    });

    assert!(scheduler.drain(WAIT));
    assert_eq!(
        entries(&events),
        vec!["sleeper start", "runner", "sleeper end"]
    );
}

#[test]
fn test_drain_times_out_on_stuck_task() {
    setup_may_runtime();
    let scheduler = Scheduler::default();
    let never: HandoffChannel<u8> = HandoffChannel::new(1).unwrap();

    let id = scheduler.spawn("stuck", move |task| {
        let _value: u8 = task.pop(&never);
        Ok(())
    });
    assert!(wait::until(WAIT, || scheduler.state(id) == Some(TaskState::Suspended)));

    assert!(!scheduler.drain(Duration::from_millis(30)));
    let stats = scheduler.stats();
    assert_eq!(stats.live, 1);
    assert_eq!(stats.suspended, 1);
}

#[test]
fn test_ready_channel_ops_do_not_park() {
    setup_may_runtime();
    let scheduler = Scheduler::default();
    let ch = HandoffChannel::new(2).unwrap();

    let (tx, rx) = mpsc::channel();
    let task_ch = ch.clone();
    scheduler.spawn("ready", move |task| {
        task.push(&task_ch, 1);
        task.push(&task_ch, 2);
        let first: i32 = task.pop(&task_ch);
        tx.send(first).unwrap();
        Ok(())
    });

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 1);
    assert!(scheduler.drain(WAIT));
    assert_eq!(scheduler.stats().parks, 0);
    assert_eq!(ch.pop(), 2);
}

#[test]
fn test_waiting_pop_parks_once() {
    setup_may_runtime();
    let scheduler = Scheduler::default();
    let ch: HandoffChannel<u8> = HandoffChannel::new(1).unwrap();

    let task_ch = ch.clone();
    let id = scheduler.spawn("waiter", move |task| {
        let _value: u8 = task.pop(&task_ch);
        Ok(())
    });
    assert!(wait::until(WAIT, || scheduler.state(id) == Some(TaskState::Suspended)));
    assert_eq!(scheduler.stats().parks, 1);

    ch.push(7);
    assert!(scheduler.drain(WAIT));
    assert_eq!(scheduler.stats().parks, 1);
}
