//! `roster sync` — reconcile the directory into the table store.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use roster_sync::{pipeline, report, SyncOptions};

use super::status::{print_report, print_report_json};
use super::Session;
use crate::{Globals, SourceArg};

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Where the snapshot comes from.
    #[arg(long, value_enum, default_value_t)]
    pub source: SourceArg,

    /// Show what would change without writing to the store.
    #[arg(long)]
    pub dry_run: bool,

    /// Abort if more than this share of stored employees would depart.
    #[arg(long, value_name = "RATIO")]
    pub max_departure_ratio: Option<f64>,

    /// Let an empty source listing mark every stored employee departed.
    #[arg(long)]
    pub allow_empty: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self, globals: &Globals) -> Result<()> {
        let session = Session::open(globals)?;
        let mut options = SyncOptions::from_config(&session.config.sync);
        options.dry_run = self.dry_run;
        options.allow_empty_snapshot |= self.allow_empty;
        if self.max_departure_ratio.is_some() {
            options.max_departure_ratio = self.max_departure_ratio;
        }

        let loader = session.loader(self.source)?;
        let store = session.store()?;
        let run_report =
            pipeline::run(loader.as_ref(), store.as_ref(), &options).context("sync failed")?;
        report::save_at(&session.home, &run_report).context("failed to save run report")?;

        if self.json {
            return print_report_json(&run_report);
        }
        print_report(&run_report);
        if run_report.summary.is_partial_departure_failure() {
            println!(
                "{} some departures were not recorded; they will be retried on the next sync",
                "warning:".yellow().bold()
            );
        }
        Ok(())
    }
}
