//! # Runtime Configuration Module
//!
//! Environment variable-based configuration for the coroutine runtime, the task
//! scheduler and the backend blocking pool.
//!
//! ## Environment Variables
//!
//! ### `TASKLANE_STACK_SIZE`
//!
//! Stack size for every spawned task and connection coroutine. Accepts values in:
//! - Decimal: `65536` (64 KB)
//! - Hexadecimal: `0x10000` (64 KB)
//!
//! Default: `0x10000` (64 KB)
//!
//! ### `TASKLANE_WORKERS`
//!
//! Number of OS threads the `may` scheduler multiplexes coroutines onto.
//! Default `1`: every task interleaves cooperatively on a single thread and only
//! yields at suspension points. Larger values select the multi-threaded variant.
//!
//! ### `TASKLANE_BACKEND_THREADS`
//!
//! OS threads dedicated to blocking backend queries (default `2`).
//!
//! ### `TASKLANE_DRAIN_TIMEOUT_MS`
//!
//! How long shutdown waits for in-flight background tasks (default `5000`).
//!
//! ## Usage
//!
//! ```rust
//! use tasklane::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! println!("Stack size: {} bytes", config.stack_size);
//! ```
//!
//! Memory usage grows with `stack_size × concurrent_tasks`, so tune the stack for
//! the deepest handler call chain rather than leaving headroom everywhere.

use std::env;
use std::time::Duration;

const DEFAULT_STACK_SIZE: usize = 0x10000;
const DEFAULT_WORKERS: usize = 1;
const DEFAULT_BACKEND_THREADS: usize = 2;
const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 5000;

/// Runtime configuration loaded from environment variables.
///
/// Load this at startup using [`RuntimeConfig::from_env()`] and call
/// [`RuntimeConfig::apply()`] before spawning the first coroutine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Stack size for coroutines in bytes
    pub stack_size: usize,
    /// Number of scheduler worker threads
    pub workers: usize,
    /// Number of OS threads serving backend queries
    pub backend_threads: usize,
    /// Graceful shutdown budget for background tasks
    pub drain_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            workers: DEFAULT_WORKERS,
            backend_threads: DEFAULT_BACKEND_THREADS,
            drain_timeout: Duration::from_millis(DEFAULT_DRAIN_TIMEOUT_MS),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let stack_size = env::var("TASKLANE_STACK_SIZE")
            .ok()
            .and_then(|val| parse_size(&val))
            .unwrap_or(DEFAULT_STACK_SIZE);
        let workers = env::var("TASKLANE_WORKERS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(DEFAULT_WORKERS);
        let backend_threads = env::var("TASKLANE_BACKEND_THREADS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(DEFAULT_BACKEND_THREADS);
        let drain_timeout_ms = env::var("TASKLANE_DRAIN_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_DRAIN_TIMEOUT_MS);

        RuntimeConfig {
            stack_size,
            workers,
            backend_threads,
            drain_timeout: Duration::from_millis(drain_timeout_ms),
        }
    }

    /// Configure the global `may` runtime.
    ///
    /// Has to run before the first coroutine is spawned; `may` reads its
    /// configuration once when the scheduler starts.
    pub fn apply(&self) {
        may::config()
            .set_workers(self.workers)
            .set_stack_size(self.stack_size);
    }
}

/// Parse a byte size written either in decimal or as `0x`-prefixed hex.
#[must_use]
pub fn parse_size(val: &str) -> Option<usize> {
    let val = val.trim();
    if let Some(hex) = val.strip_prefix("0x") {
        usize::from_str_radix(hex, 16).ok()
    } else {
        val.parse().ok()
    }
}
