//! `roster status` — the last applied run.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use chrono::Utc;
use roster_sync::{report, PlanWarning, RunMode, RunReport};

use super::home_dir;
use crate::Globals;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, _globals: &Globals) -> Result<()> {
        let home = home_dir()?;
        let last = report::load_last_at(&home).context("failed to load the last run report")?;
        let Some(last) = last else {
            if self.json {
                println!("null");
            } else {
                println!("No runs recorded yet. Run 'roster sync' first.");
            }
            return Ok(());
        };

        if self.json {
            return print_report_json(&last);
        }
        println!(
            "Last run {} ago ({})",
            format_age(last.summary.started_at),
            last.summary.started_at.to_rfc3339()
        );
        print_report(&last);
        Ok(())
    }
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "new")]
    new: usize,
    #[tabled(rename = "updated")]
    updated: usize,
    #[tabled(rename = "departed")]
    departed: usize,
    #[tabled(rename = "failed")]
    failed: usize,
    #[tabled(rename = "skipped")]
    skipped: usize,
    #[tabled(rename = "rejected")]
    rejected: usize,
}

pub(crate) fn print_report(report: &RunReport) {
    let summary = &report.summary;
    let prefix = if summary.mode == RunMode::DryRun { "[dry-run] " } else { "" };
    let mark = if summary.is_partial_departure_failure() {
        "!".yellow().bold()
    } else {
        "✓".green().bold()
    };
    println!("{prefix}{mark} directory reconciled");

    let mut table = Table::new([SummaryRow {
        new: summary.new,
        updated: summary.updated,
        departed: summary.departed,
        failed: summary.departure_failures.len(),
        skipped: summary.skipped_departures.len(),
        rejected: summary.rejected,
    }]);
    table.with(Style::rounded());
    println!("{table}");

    for failure in &summary.departure_failures {
        println!("  {} {}: {}", "✗".red(), failure.id, failure.reason);
    }
    for id in &summary.held {
        println!("  {} {id}: source row rejected; left as stored", "-".dimmed());
    }
    for warning in &report.warnings {
        println!("{} {}", "warning:".yellow().bold(), describe_warning(warning));
    }
}

pub(crate) fn print_report_json(report: &RunReport) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(report).context("failed to serialize run report JSON")?
    );
    Ok(())
}

pub(crate) fn describe_warning(warning: &PlanWarning) -> String {
    match warning {
        PlanWarning::EmptySource { persisted } => {
            format!("source returned no employees; all {persisted} stored employees would depart")
        }
        PlanWarning::MassDeparture {
            departing,
            persisted,
            ratio,
        } => format!(
            "{departing} of {persisted} stored employees ({:.0}%) would depart",
            ratio * 100.0
        ),
    }
}

fn format_age(at: chrono::DateTime<Utc>) -> String {
    let seconds = Utc::now().signed_duration_since(at).num_seconds().max(0);
    match seconds {
        s if s < 60 => format!("{s}s"),
        s if s < 60 * 60 => format!("{}m", s / 60),
        s if s < 60 * 60 * 24 => format!("{}h", s / (60 * 60)),
        s => format!("{}d", s / (60 * 60 * 24)),
    }
}
