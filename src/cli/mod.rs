//! # CLI Module
//!
//! Command-line entry point for the `tasklane` binary.
//!
//! ## Commands
//!
//! ### `serve`
//!
//! Start the HTTP server and block until SIGINT/SIGTERM:
//!
//! ```bash
//! tasklane serve --addr 127.0.0.1:8080 --db things.sqlite3
//! ```
//!
//! Options (each also read from the environment):
//! - `--addr <ADDR>` / `TASKLANE_ADDR` - listen address (default `127.0.0.1:8080`)
//! - `--db <PATH>` / `TASKLANE_DB` - SQLite file, or `:memory:` (default)
//! - `--workers <N>` - overrides `TASKLANE_WORKERS`
//!
//! On shutdown the server stops accepting connections and the scheduler is
//! drained for up to `TASKLANE_DRAIN_TIMEOUT_MS` so background inserts and
//! updates are not lost.
//!
//! ### `routes`
//!
//! Print the route table in match order:
//!
//! ```bash
//! tasklane routes
//! ```

mod commands;

pub use commands::{build_app, run_cli, Cli, Commands, ServeArgs};
