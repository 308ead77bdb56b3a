//! Rregullo Cache - drive the Rregullo Tiranen offline cache from a terminal.
//!
//! Each invocation delivers one lifecycle event (install, activate,
//! message, fetch, sync) to the cache manager, with state kept in the
//! cache directory between runs.

mod cli;
mod commands;

use std::io;
use std::path::Path;

use anyhow::Result;
use clap::Parser;
use rregullo_cache_core::Config;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::CliArgs;
use commands::Host;

/// Log file name prefix; the appender adds the date
const LOG_FILE_PREFIX: &str = "rregullo-cache.log";

/// Initialize the tracing subscriber for logging.
///
/// Returns the file writer guard when `log_dir` is set; it must live until
/// exit or buffered lines are lost.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr = fmt::layer().with_writer(io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(stderr)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(stderr)
                .with(filter)
                .init();
            None
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args = CliArgs::parse();
    let config = load_config(args.config.as_deref())?;

    let _guard = init_tracing(config.log_dir.as_deref());
    info!(origin = %config.origin, "Rregullo cache starting");

    let host = Host::new(config)?;
    host.run(args.command).await
}
