//! # Scheduler Module
//!
//! Runs many logical tasks concurrently on `may` stackful coroutines.
//!
//! ## Model
//!
//! - [`Scheduler::spawn`] enqueues a task and returns its [`TaskId`](crate::ids::TaskId)
//!   at once; the body runs later on a coroutine.
//! - A task only yields at suspension points: [`Task::sleep`], a full/empty
//!   [`HandoffChannel`](crate::channel::HandoffChannel), or a backend call
//!   ([`Task::query`]). While it waits, other tasks run.
//! - Every task owns a LIFO stack of deferred callbacks ([`Task::defer`]) that
//!   runs once the body finishes, whatever the exit path, and before the task
//!   is marked terminated.
//! - There is no cancellation and no join: a task runs to completion, or
//!   forever if it blocks on something that never arrives.
//!
//! ## Example
//!
//! ```rust,no_run
//! use tasklane::scheduler::Scheduler;
//! use std::time::Duration;
//!
//! let scheduler = Scheduler::default();
//! scheduler.spawn("cleanup-demo", |task| {
//!     task.defer(|| println!("runs second"));
//!     task.defer(|| println!("runs first"));
//!     task.sleep(Duration::from_millis(10));
//!     Ok(())
//! });
//! scheduler.drain(Duration::from_secs(1));
//! ```

mod core;
mod defer;

pub use self::core::{Scheduler, SchedulerStats, Task, TaskState};
pub use defer::DeferStack;
