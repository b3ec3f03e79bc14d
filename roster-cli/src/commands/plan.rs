//! `roster plan` — show the three partitions without writing anything.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use roster_core::EmployeeId;
use roster_sync::{pipeline, PlanWarning};

use super::Session;
use crate::{Globals, SourceArg};

/// Ids listed per partition in table output.
const PREVIEW_IDS: usize = 10;

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Where the snapshot comes from.
    #[arg(long, value_enum, default_value_t)]
    pub source: SourceArg,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct PlanJson<'a> {
    records: usize,
    rejected: usize,
    persisted: usize,
    to_insert: &'a std::collections::BTreeSet<EmployeeId>,
    to_update: &'a std::collections::BTreeSet<EmployeeId>,
    to_mark_departed: &'a std::collections::BTreeSet<EmployeeId>,
    warnings: Vec<PlanWarning>,
}

impl PlanArgs {
    pub fn run(self, globals: &Globals) -> Result<()> {
        let session = Session::open(globals)?;
        let loader = session.loader(self.source)?;
        let store = session.store()?;
        let (snapshot, plan) =
            pipeline::plan(loader.as_ref(), store.as_ref()).context("planning failed")?;

        if self.json {
            let payload = PlanJson {
                records: snapshot.len(),
                rejected: snapshot.rejected().len(),
                persisted: plan.persisted,
                to_insert: &plan.to_insert,
                to_update: &plan.to_update,
                to_mark_departed: &plan.to_mark_departed,
                warnings: plan.warnings(),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize plan JSON")?
            );
            return Ok(());
        }

        println!(
            "Source: {} employees ({} rejected) | Store: {} employees",
            snapshot.len(),
            snapshot.rejected().len(),
            plan.persisted
        );
        print_partition("insert", plan.to_insert.iter(), plan.to_insert.len());
        print_partition("update", plan.to_update.iter(), plan.to_update.len());
        print_partition("depart", plan.to_mark_departed.iter(), plan.to_mark_departed.len());
        for warning in plan.warnings() {
            println!("{} {}", "warning:".yellow().bold(), super::status::describe_warning(&warning));
        }
        Ok(())
    }
}

fn print_partition<'a>(label: &str, ids: impl Iterator<Item = &'a EmployeeId>, len: usize) {
    let mut preview: Vec<String> = ids.take(PREVIEW_IDS).map(ToString::to_string).collect();
    if len > preview.len() {
        preview.push(format!("+{} more", len - preview.len()));
    }
    println!("  {:<7} {:>6}  {}", label, len, preview.join(", ").bright_black());
}
