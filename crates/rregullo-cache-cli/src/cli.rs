use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Drive the offline cache lifecycle from a terminal.
#[derive(Parser, Debug)]
#[command(name = "rregullo-cache")]
#[command(about = "Offline asset cache for Rregullo Tiranen", version)]
pub struct CliArgs {
    /// Path to config file (default: $XDG_CONFIG_HOME/rregullo-cache/config.json)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install the configured manifest as a new version
    Install,
    /// Release open pages so a waiting version takes over
    Activate,
    /// Post a message to the worker as if sent by a page
    Message {
        /// Origin the message claims to come from
        #[arg(long)]
        origin: String,
        /// JSON payload
        #[arg(long, default_value = r#"{"type":"SKIP_WAITING"}"#)]
        data: String,
    },
    /// Request a URL through the cache
    Fetch {
        url: String,
        /// Treat the request as a top-level page navigation
        #[arg(long)]
        navigate: bool,
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
    },
    /// Fire a background sync event
    Sync {
        #[arg(long, default_value = rregullo_cache_core::SYNC_REPORTS_TAG)]
        tag: String,
    },
    /// Show registration, buckets and pending reports
    Status,
    /// Manage reports queued for background delivery
    #[command(subcommand)]
    Report(ReportCommand),
}

#[derive(Subcommand, Debug)]
pub enum ReportCommand {
    /// Queue a report for the next sync
    Add {
        title: String,
        description: String,
        #[arg(long, default_value = "other")]
        category: String,
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
        #[arg(long)]
        address: Option<String>,
    },
    /// List queued reports
    List,
}
