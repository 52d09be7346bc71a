//! # Blocking Pool Module
//!
//! Runs blocking work (backend queries) on dedicated OS threads so the coroutine
//! that asked for it can suspend instead of stalling a scheduler worker.
//!
//! ## How it works
//!
//! - Jobs are sent over an unbounded `may` MPSC channel shared by all pool threads
//! - Each job carries its own reply channel; the submitting coroutine waits on
//!   `recv()`, which yields to the scheduler until the reply arrives
//! - Jobs that panic are caught and logged; the waiting caller sees a closed
//!   reply channel
//!
//! ## Configuration
//!
//! - `TASKLANE_BACKEND_THREADS`: Number of pool threads (default: 2)

use may::sync::mpsc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Counters for a blocking pool
#[derive(Debug, Default)]
pub struct BlockingPoolMetrics {
    /// Jobs submitted but not yet finished (approximate)
    pub queue_depth: AtomicUsize,
    /// Total jobs submitted
    pub dispatched_count: AtomicU64,
    /// Total jobs finished (including panicked ones)
    pub completed_count: AtomicU64,
    /// Jobs that panicked
    pub panicked_count: AtomicU64,
}

impl BlockingPoolMetrics {
    fn record_dispatch(&self) {
        self.dispatched_count.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    fn record_completion(&self) {
        self.completed_count.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    /// Get current queue depth
    #[must_use]
    pub fn get_queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    /// Get total dispatched count
    #[must_use]
    pub fn get_dispatched_count(&self) -> u64 {
        self.dispatched_count.load(Ordering::Relaxed)
    }

    /// Get total completed count
    #[must_use]
    pub fn get_completed_count(&self) -> u64 {
        self.completed_count.load(Ordering::Relaxed)
    }
}

/// The pool has no live threads left to run the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolClosed;

/// Fixed-size pool of OS threads for blocking calls
pub struct BlockingPool {
    sender: mpsc::Sender<Job>,
    metrics: Arc<BlockingPoolMetrics>,
    name: String,
    threads: usize,
}

impl BlockingPool {
    /// Start `threads` worker threads named `{name}-{idx}`.
    ///
    /// Threads that fail to start are logged and skipped; a pool with no
    /// threads reports [`PoolClosed`] on every `run`.
    #[must_use]
    pub fn new(name: &str, threads: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(rx);
        let metrics = Arc::new(BlockingPoolMetrics::default());

        info!(pool = %name, threads, "Creating blocking pool");

        for worker_id in 0..threads {
            let rx = Arc::clone(&rx);
            let metrics = Arc::clone(&metrics);
            let pool_name = name.to_string();

            let spawn_result = thread::Builder::new()
                .name(format!("{name}-{worker_id}"))
                .spawn(move || {
                    debug!(pool = %pool_name, worker_id, "Blocking worker started");

                    // All workers share the receiver; the channel closes when
                    // the pool is dropped.
                    while let Ok(job) = rx.recv() {
                        if let Err(panic) =
                            std::panic::catch_unwind(std::panic::AssertUnwindSafe(job))
                        {
                            metrics.panicked_count.fetch_add(1, Ordering::Relaxed);
                            error!(
                                pool = %pool_name,
                                worker_id,
                                panic_message = ?panic,
                                "Blocking job panicked"
                            );
                        }
                        metrics.record_completion();
                    }

                    debug!(pool = %pool_name, worker_id, "Blocking worker exiting");
                });

            if let Err(e) = spawn_result {
                error!(
                    pool = %name,
                    worker_id,
                    error = %e,
                    "Failed to spawn blocking worker"
                );
            }
        }

        Self {
            sender: tx,
            metrics,
            name: name.to_string(),
            threads,
        }
    }

    /// Run `f` on a pool thread and wait for its result.
    ///
    /// Called from a coroutine, the wait suspends only that coroutine.
    ///
    /// # Errors
    ///
    /// Returns [`PoolClosed`] when no worker is left to run the job, or the job
    /// panicked before replying.
    pub fn run<F, R>(&self, f: F) -> Result<R, PoolClosed>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = mpsc::channel::<R>();
        let job: Job = Box::new(move || {
            if reply_tx.send(f()).is_err() {
                debug!("Blocking job finished after its caller went away");
            }
        });

        self.metrics.record_dispatch();
        if self.sender.send(job).is_err() {
            self.metrics.record_completion();
            error!(pool = %self.name, "Blocking pool channel disconnected");
            return Err(PoolClosed);
        }

        reply_rx.recv().map_err(|_| PoolClosed)
    }

    #[must_use]
    pub fn metrics(&self) -> &BlockingPoolMetrics {
        &self.metrics
    }

    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }
}
