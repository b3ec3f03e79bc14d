//! Roster — employee directory mirror CLI.
//!
//! # Usage
//!
//! ```text
//! roster init [--force] [--source-url URL] [--store-url URL] [--backend rest|file]
//! roster fetch
//! roster plan [--source api|local] [--json]
//! roster sync [--source api|local] [--dry-run] [--max-departure-ratio R] [--allow-empty] [--json]
//! roster status [--json]
//! ```
//!
//! Global flags: `--config <path>` (default `~/.roster/config.yaml`) and
//! `--verbose`. Secrets come from `ROSTER_API_TOKEN`, `ROSTER_STORE_KEY` and
//! `ROSTER_STORE_URL`, optionally through a `.env` file.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use commands::{
    fetch::FetchArgs, init::InitArgs, plan::PlanArgs, status::StatusArgs, sync::SyncArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "roster",
    version,
    about = "Mirror a remote employee directory into a table store",
    long_about = None,
)]
struct Cli {
    /// Config file (default: ~/.roster/config.yaml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default config file.
    Init(InitArgs),

    /// Download every directory page into the page cache.
    Fetch(FetchArgs),

    /// Show what a sync would insert, update and mark departed.
    Plan(PlanArgs),

    /// Reconcile the directory into the table store.
    Sync(SyncArgs),

    /// Show the last applied run.
    Status(StatusArgs),
}

/// Where the snapshot comes from.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourceArg {
    /// Paginate the live directory API (and refresh the page cache).
    #[default]
    Api,
    /// Replay the page cache written by the last fetch.
    Local,
}

/// Flags shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Globals {
    pub config: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let globals = Globals { config: cli.config };
    match cli.command {
        Commands::Init(args) => args.run(&globals),
        Commands::Fetch(args) => args.run(&globals),
        Commands::Plan(args) => args.run(&globals),
        Commands::Sync(args) => args.run(&globals),
        Commands::Status(args) => args.run(&globals),
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
