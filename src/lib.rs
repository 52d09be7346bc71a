//! # tasklane
//!
//! **tasklane** is a small coroutine-powered request runtime: a cooperative
//! task scheduler, bounded handoff channels and per-task deferred callbacks,
//! behind a first-match HTTP router that answers with one JSON response per
//! request.
//!
//! ## Overview
//!
//! Every connection is served on a `may` coroutine. A handler can answer
//! directly, or spawn background tasks that outlive the request. Tasks yield
//! only at suspension points (sleep, a full or empty channel, a backend query),
//! so with one worker thread the whole runtime interleaves cooperatively.
//!
//! ## Architecture
//!
//! - **[`scheduler`]** - Task spawn, lifecycle states, LIFO deferred callbacks, drain
//! - **[`channel`]** - Bounded [`HandoffChannel`] with blocking push/pop and FIFO waiters
//! - **[`backend`]** - [`QueryExecutor`] trait, SQLite executor, [`Backend`] handle
//! - **[`blocking_pool`]** - OS threads that run backend calls off the coroutine workers
//! - **[`router`]** - Ordered route table, pattern captures, 405/404 fallbacks
//! - **[`server`]** - `may_minihttp` service, request context, one-shot response emitter
//! - **[`handlers`]** - The `/things` resource
//! - **[`cli`]** - `tasklane serve` and `tasklane routes`
//! - **[`logging`]**, **[`runtime_config`]** - Environment-driven tracing and runtime setup
//!
//! ### Request Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Service as server::AppService
//!     participant Router as router::Router
//!     participant Handler
//!     participant Scheduler as scheduler::Scheduler
//!     participant Backend as backend::Backend
//!
//!     Client->>Service: HTTP request
//!     Service->>Service: parse_request → RequestContext
//!     Service->>Router: route(ctx, ResponseHandle)
//!     Router->>Handler: first matching entry, by method
//!     Handler->>Backend: execute(sql, params) (coroutine suspends)
//!     Backend-->>Handler: rows
//!     Handler->>Scheduler: spawn(background task)
//!     Handler->>Router: emit(status, json)
//!     Router-->>Service: Dispatch (404 if still writable)
//!     Service-->>Client: recorded response
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! TASKLANE_LOG_FORMAT=pretty cargo run -- serve --addr 127.0.0.1:8080
//! curl -X POST -d '{"name":"first"}' localhost:8080/things
//! curl localhost:8080/things
//! ```
//!
//! ## Runtime Configuration
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `TASKLANE_STACK_SIZE` | `0x10000` | Coroutine stack size (hex or decimal) |
//! | `TASKLANE_WORKERS` | `1` | Scheduler worker threads |
//! | `TASKLANE_BACKEND_THREADS` | `2` | Threads serving backend queries |
//! | `TASKLANE_DRAIN_TIMEOUT_MS` | `5000` | Shutdown drain budget |
//! | `TASKLANE_LOG_LEVEL` | `info` | Base log level |
//! | `TASKLANE_LOG_FORMAT` | `json` | `json` or `pretty` |

pub mod backend;
pub mod blocking_pool;
pub mod channel;
pub mod cli;
pub mod error;
pub mod handlers;
pub mod ids;
pub mod logging;
pub mod router;
pub mod runtime_config;
pub mod scheduler;
pub mod server;

pub use backend::{Backend, BackendError, Param, QueryExecutor, Row, SqliteExecutor};
pub use channel::HandoffChannel;
pub use error::{Error, Result};
pub use ids::{RequestId, TaskId};
pub use router::{Captures, Router};
pub use scheduler::{Scheduler, SchedulerStats, Task, TaskState};
pub use server::{emit, RequestContext, ResponseHandle};
