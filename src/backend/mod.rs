//! # Backend Module
//!
//! The storage backend is an external collaborator reached through a narrow,
//! synchronous interface: `execute(sql, params) -> rows`.
//!
//! - [`QueryExecutor`] is the seam. [`SqliteExecutor`] is the bundled
//!   implementation; tests can inject their own.
//! - [`Backend`] pairs an executor with a [`BlockingPool`] so a task issuing a
//!   query suspends on a coroutine channel while the query runs on an OS thread.
//!   Other tasks keep running in the meantime.
//! - The executor is injected, never global. Concurrent queries from different
//!   tasks are serialised by the executor itself.

mod sqlite;

pub use sqlite::SqliteExecutor;

use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::blocking_pool::BlockingPool;

/// One result row: column name → value.
pub type Row = Map<String, Value>;

/// Scalar query parameter
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Param::Integer(v)
    }
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Param::Real(v)
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Param::Text(v.to_string())
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Param::Text(v)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        v.map_or(Param::Null, Into::into)
    }
}

/// Failure reported by the backend collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Could not open or reach the store
    Connection(String),
    /// The statement failed to prepare or execute
    Query {
        /// Statement that failed
        sql: String,
        /// Driver message
        message: String,
    },
    /// No worker is left to run queries
    Unavailable,
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Connection(msg) => write!(f, "connection failed: {msg}"),
            BackendError::Query { sql, message } => {
                write!(f, "query failed: {message} (sql: {sql})")
            }
            BackendError::Unavailable => write!(f, "backend workers are unavailable"),
        }
    }
}

impl std::error::Error for BackendError {}

/// Synchronous query collaborator
pub trait QueryExecutor: Send + Sync {
    /// Execute one statement. Statements that produce no columns return an
    /// empty row set.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] on connection or query failure.
    fn execute(&self, sql: &str, params: &[Param]) -> Result<Vec<Row>, BackendError>;
}

/// Executor handle used by tasks; queries run off the scheduler threads.
#[derive(Clone)]
pub struct Backend {
    executor: Arc<dyn QueryExecutor>,
    pool: Arc<BlockingPool>,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("threads", &self.pool.threads())
            .finish_non_exhaustive()
    }
}

impl Backend {
    /// Wrap `executor`, running its calls on `threads` dedicated OS threads.
    #[must_use]
    pub fn new(executor: Arc<dyn QueryExecutor>, threads: usize) -> Self {
        Self {
            executor,
            pool: Arc::new(BlockingPool::new("backend", threads.max(1))),
        }
    }

    /// Issue one logical query and wait for its rows.
    ///
    /// The calling coroutine suspends until the result is back.
    ///
    /// # Errors
    ///
    /// Propagates the executor's [`BackendError`], or
    /// [`BackendError::Unavailable`] when the pool cannot run the query.
    pub fn execute(&self, sql: &str, params: Vec<Param>) -> Result<Vec<Row>, BackendError> {
        let executor = Arc::clone(&self.executor);
        let statement = sql.to_string();
        let start = Instant::now();

        let result = self
            .pool
            .run(move || executor.execute(&statement, &params))
            .map_err(|_| BackendError::Unavailable)
            .and_then(|r| r);

        let elapsed_us = start.elapsed().as_micros() as u64;
        match &result {
            Ok(rows) => debug!(sql, rows = rows.len(), elapsed_us, "Backend query complete"),
            Err(e) => warn!(sql, error = %e, elapsed_us, "Backend query failed"),
        }
        result
    }

    #[must_use]
    pub fn pool(&self) -> &BlockingPool {
        &self.pool
    }
}
