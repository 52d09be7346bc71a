use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::backend::{Backend, SqliteExecutor};
use crate::handlers::{build_router, AppState};
use crate::logging::{init_logging_with_config, LogConfig};
use crate::router::Router;
use crate::runtime_config::RuntimeConfig;
use crate::scheduler::Scheduler;
use crate::server::{AppService, HttpServer, ServerHandle};

const READY_TIMEOUT: Duration = Duration::from_secs(2);

/// SQLite location meaning "no file".
pub const IN_MEMORY_DB: &str = ":memory:";

#[derive(Parser, Debug)]
#[command(name = "tasklane", version)]
#[command(about = "Coroutine request runtime serving the /things API", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the /things API over HTTP
    Serve(ServeArgs),
    /// Print the route table in match order
    Routes,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "TASKLANE_ADDR", default_value = "127.0.0.1:8080")]
    pub addr: String,

    /// SQLite database file, or `:memory:`
    #[arg(long, env = "TASKLANE_DB", default_value = IN_MEMORY_DB)]
    pub db: String,

    /// Scheduler worker threads (overrides TASKLANE_WORKERS)
    #[arg(long)]
    pub workers: Option<usize>,
}

/// Open the backend, create the scheduler and build the route table.
///
/// # Errors
///
/// Fails when the database cannot be opened or its schema created.
pub fn build_app(db: &str, config: &RuntimeConfig) -> anyhow::Result<(AppState, Router)> {
    let executor = if db == IN_MEMORY_DB {
        SqliteExecutor::open_in_memory()?
    } else {
        SqliteExecutor::open(Path::new(db)).with_context(|| format!("opening database {db}"))?
    };
    executor.ensure_things_schema()?;

    let state = AppState {
        scheduler: Scheduler::from_config(config),
        backend: Backend::new(Arc::new(executor), config.backend_threads),
    };
    let router = build_router(state.clone())?;
    Ok((state, router))
}

/// Parse arguments and run the selected command.
///
/// # Errors
///
/// Propagates startup failures (logging, database, bind).
pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => serve(&args),
        Commands::Routes => {
            let (_, router) = build_app(IN_MEMORY_DB, &RuntimeConfig::default())?;
            router.dump_routes();
            Ok(())
        }
    }
}

fn serve(args: &ServeArgs) -> anyhow::Result<()> {
    init_logging_with_config(&LogConfig::from_env())?;

    let mut config = RuntimeConfig::from_env();
    if let Some(workers) = args.workers {
        config.workers = workers.max(1);
    }
    config.apply();

    let (state, router) = build_app(&args.db, &config)?;
    for route in router.routes() {
        info!(template = %route.template, methods = ?route.methods, "Route registered");
    }

    let service = AppService::new(Arc::new(router), state.scheduler.clone());
    let handle = HttpServer(service)
        .start(args.addr.as_str())
        .with_context(|| format!("binding {}", args.addr))?;
    handle.wait_ready(READY_TIMEOUT)?;
    info!(addr = %handle.addr(), db = %args.db, workers = config.workers, "tasklane ready");

    wait_for_shutdown(handle, &state.scheduler, config.drain_timeout)
}

#[cfg(unix)]
fn wait_for_shutdown(
    handle: ServerHandle,
    scheduler: &Scheduler,
    drain_timeout: Duration,
) -> anyhow::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("installing signal handlers")?;
    if let Some(signal) = signals.forever().next() {
        info!(signal, "Shutdown requested");
    }

    handle.stop();
    if !scheduler.drain(drain_timeout) {
        warn!(stats = ?scheduler.stats(), "Exiting with tasks still running");
    }
    Ok(())
}

#[cfg(not(unix))]
fn wait_for_shutdown(
    handle: ServerHandle,
    scheduler: &Scheduler,
    drain_timeout: Duration,
) -> anyhow::Result<()> {
    let joined = handle.join();
    scheduler.drain(drain_timeout);
    joined.map_err(|_| anyhow::anyhow!("server coroutine panicked"))
}
