//! Scheduler core: task table, spawn, task lifecycle and drain.

use dashmap::DashMap;
use may::coroutine;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::defer::DeferStack;
use crate::backend::{Backend, BackendError, Param, Row};
use crate::channel::HandoffChannel;
use crate::error::Result;
use crate::ids::TaskId;
use crate::runtime_config::RuntimeConfig;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Spawned and eligible to run, or currently running
    Runnable,
    /// Parked at a suspension point (sleep, channel wait, backend call)
    Suspended,
    /// Body and deferred callbacks have finished
    Terminated,
}

/// Point-in-time scheduler counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Tasks ever spawned
    pub spawned: u64,
    /// Tasks that have not terminated yet
    pub live: usize,
    /// Live tasks currently parked at a suspension point
    pub suspended: usize,
    /// Times any task has parked; channel operations that complete at once do not count
    pub parks: u64,
    /// Tasks that have terminated, whatever the outcome
    pub terminated: u64,
    /// Terminated tasks whose body returned an error or panicked
    pub failed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Failed,
}

struct SchedulerInner {
    next_id: AtomicU64,
    tasks: DashMap<TaskId, TaskState>,
    spawned: AtomicU64,
    parks: AtomicU64,
    terminated: AtomicU64,
    failed: AtomicU64,
    stack_size: usize,
}

impl SchedulerInner {
    fn set_state(&self, id: TaskId, state: TaskState) {
        if let Some(mut entry) = self.tasks.get_mut(&id) {
            *entry = state;
        }
    }

    fn finish(&self, id: TaskId, outcome: Outcome) {
        self.set_state(id, TaskState::Terminated);
        self.terminated.fetch_add(1, Ordering::Relaxed);
        if outcome == Outcome::Failed {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.tasks.remove(&id);
    }
}

/// Cooperative task scheduler backed by `may` coroutines.
///
/// Cloning is cheap; every clone drives the same task table. Tasks are
/// fire-and-forget: [`Scheduler::spawn`] hands back an id for introspection
/// only, and nothing the body returns is observable by the spawner.
///
/// With the runtime configured for a single worker (the default), every task
/// interleaves on one OS thread and only yields at suspension points.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("stats", &self.stats())
            .finish()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(RuntimeConfig::default().stack_size)
    }
}

impl Scheduler {
    /// Create a scheduler whose tasks get `stack_size` bytes of stack.
    #[must_use]
    pub fn new(stack_size: usize) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                next_id: AtomicU64::new(0),
                tasks: DashMap::new(),
                spawned: AtomicU64::new(0),
                parks: AtomicU64::new(0),
                terminated: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                stack_size,
            }),
        }
    }

    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(config.stack_size)
    }

    /// Enqueue a new task and return immediately.
    ///
    /// `body` never runs on the caller's stack. When it finishes (normally,
    /// with an error, or by panicking) its deferred callbacks run LIFO, then
    /// the task is marked [`TaskState::Terminated`] and forgotten. Errors and
    /// panics are logged; they never reach the spawner.
    pub fn spawn<F>(&self, name: &str, body: F) -> TaskId
    where
        F: FnOnce(&mut Task) -> Result<()> + Send + 'static,
    {
        let id = TaskId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.inner.tasks.insert(id, TaskState::Runnable);
        self.inner.spawned.fetch_add(1, Ordering::Relaxed);

        let task = Task {
            id,
            name: name.to_string(),
            defers: DeferStack::new(),
            scheduler: self.clone(),
        };

        debug!(task_id = %id, task_name = %name, "Task spawned");

        // SAFETY: may::coroutine::Builder::spawn() is marked unsafe by the may runtime
        // because a coroutine must not hold thread-local references across
        // suspension points. The body is Send + 'static and owns everything it
        // touches, and all task state lives in the coroutine itself.
        let spawn_result = unsafe {
            coroutine::Builder::new()
                .name(format!("{name}#{}", id.0))
                .stack_size(self.inner.stack_size)
                .spawn(move || task.run(body))
        };

        if let Err(e) = spawn_result {
            error!(
                task_id = %id,
                task_name = %name,
                error = %e,
                stack_size = self.inner.stack_size,
                "Failed to spawn task coroutine"
            );
            self.inner.finish(id, Outcome::Failed);
        }

        id
    }

    /// Current state of a live task. `None` once the task has been torn down.
    #[must_use]
    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.inner.tasks.get(&id).map(|entry| *entry)
    }

    /// Number of tasks that have not terminated.
    #[must_use]
    pub fn live(&self) -> usize {
        self.inner.tasks.len()
    }

    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let suspended = self
            .inner
            .tasks
            .iter()
            .filter(|entry| *entry.value() == TaskState::Suspended)
            .count();
        SchedulerStats {
            spawned: self.inner.spawned.load(Ordering::Relaxed),
            live: self.inner.tasks.len(),
            suspended,
            parks: self.inner.parks.load(Ordering::Relaxed),
            terminated: self.inner.terminated.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
        }
    }

    /// Wait until every task has terminated, or `timeout` elapses.
    ///
    /// Background tasks outlive the request that spawned them, so a process
    /// must drain before exiting or their work is silently dropped. Returns
    /// `true` when the table emptied in time. Calling this from inside a task
    /// counts that task as live, so it can only time out.
    pub fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        info!(
            live = self.live(),
            timeout_ms = timeout.as_millis() as u64,
            "Draining tasks"
        );
        loop {
            let live = self.live();
            if live == 0 {
                info!("All tasks drained");
                return true;
            }
            if Instant::now() >= deadline {
                warn!(live, "Drain timed out; abandoning remaining tasks");
                return false;
            }
            coroutine::sleep(DRAIN_POLL_INTERVAL);
        }
    }
}

/// Handle a running task body receives.
///
/// Suspension helpers (`sleep`, `push`, `pop`, `query`, `suspend`) mark the task
/// [`TaskState::Suspended`] while they wait so the scheduler can report it.
/// `push` and `pop` only do so when the channel makes them wait.
pub struct Task {
    id: TaskId,
    name: String,
    defers: DeferStack,
    scheduler: Scheduler,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("defers", &self.defers)
            .finish()
    }
}

impl Task {
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Register `callback` to run when this task's body finishes.
    ///
    /// Callbacks run last-registered-first, after the body's final statement
    /// (or early return, error, panic) and before the task is terminated.
    pub fn defer<F>(&mut self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.defers.push(callback);
    }

    /// Spawn an independent sibling task. It is not awaited by this one.
    pub fn spawn<F>(&self, name: &str, body: F) -> TaskId
    where
        F: FnOnce(&mut Task) -> Result<()> + Send + 'static,
    {
        self.scheduler.spawn(name, body)
    }

    /// Run a blocking operation as a suspension point.
    ///
    /// The task reads as [`TaskState::Suspended`] for the whole of `op`.
    pub fn suspend<R>(&self, op: impl FnOnce() -> R) -> R {
        self.scheduler.inner.parks.fetch_add(1, Ordering::Relaxed);
        self.scheduler.inner.set_state(self.id, TaskState::Suspended);
        let out = op();
        self.scheduler.inner.set_state(self.id, TaskState::Runnable);
        out
    }

    /// Timed sleep; other tasks run meanwhile.
    pub fn sleep(&self, duration: Duration) {
        self.suspend(|| coroutine::sleep(duration));
    }

    /// Enqueue `value`, parking only when the channel is full or other
    /// pushers are ahead in line.
    pub fn push<T>(&self, channel: &HandoffChannel<T>, value: T) {
        if let Err(value) = channel.try_push(value) {
            self.suspend(|| channel.push(value));
        }
    }

    /// Dequeue the oldest value, parking only when none is ready for this task.
    #[must_use]
    pub fn pop<T>(&self, channel: &HandoffChannel<T>) -> T {
        match channel.try_pop() {
            Some(value) => value,
            None => self.suspend(|| channel.pop()),
        }
    }

    /// Issue one backend query, suspending until the rows come back.
    ///
    /// # Errors
    ///
    /// Propagates the backend's [`BackendError`].
    pub fn query(
        &self,
        backend: &Backend,
        sql: &str,
        params: Vec<Param>,
    ) -> std::result::Result<Vec<Row>, BackendError> {
        self.suspend(|| backend.execute(sql, params))
    }

    fn run<F>(mut self, body: F)
    where
        F: FnOnce(&mut Task) -> Result<()>,
    {
        let start = Instant::now();
        debug!(task_id = %self.id, task_name = %self.name, "Task started");

        let outcome = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            body(&mut self)
        })) {
            Ok(Ok(())) => Outcome::Completed,
            Ok(Err(e)) => {
                error!(
                    task_id = %self.id,
                    task_name = %self.name,
                    error = %e,
                    "Task failed"
                );
                Outcome::Failed
            }
            Err(panic) => {
                error!(
                    task_id = %self.id,
                    task_name = %self.name,
                    panic_message = ?panic,
                    "Task panicked"
                );
                Outcome::Failed
            }
        };

        // A panic may have left the task marked suspended.
        self.scheduler.inner.set_state(self.id, TaskState::Runnable);
        let deferred = self.defers.len();
        let panicked = self.defers.run(self.id);

        self.scheduler.inner.finish(self.id, outcome);
        debug!(
            task_id = %self.id,
            task_name = %self.name,
            deferred,
            deferred_panicked = panicked,
            failed = outcome == Outcome::Failed,
            elapsed_us = start.elapsed().as_micros() as u64,
            "Task terminated"
        );
    }
}
