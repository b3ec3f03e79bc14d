//! Run reports — the audit trail of applied runs.
//!
//! Persists a [`RunReport`] JSON document at `<home>/.roster/runs/last.json`
//! and a copy named after the run start, e.g.
//! `<home>/.roster/runs/20260101T020000Z.json`. Writes use the same atomic
//! `.tmp` + rename pattern as the config file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use roster_core::config::runs_dir_at;
use roster_core::{EmployeeId, RejectedRecord, SourceSnapshot};

use crate::engine::{RunMode, RunSummary};
use crate::error::{io_err, SyncError};
use crate::plan::{PlanWarning, ReconciliationPlan};

const LAST_REPORT: &str = "last.json";

/// Summary plus the explicit id lists behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub summary: RunSummary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<PlanWarning>,
    pub inserted: Vec<EmployeeId>,
    pub updated: Vec<EmployeeId>,
    /// Ids planned for departure (see the summary for which succeeded).
    pub departing: Vec<EmployeeId>,
    /// Source rows that failed processing, with the reason.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<RejectedRecord>,
}

impl RunReport {
    pub fn new(plan: &ReconciliationPlan, snapshot: &SourceSnapshot, summary: RunSummary) -> Self {
        Self {
            summary,
            warnings: plan.warnings(),
            inserted: plan.to_insert.iter().cloned().collect(),
            updated: plan.to_update.iter().cloned().collect(),
            departing: plan.to_mark_departed.iter().cloned().collect(),
            rejected: snapshot.rejected().to_vec(),
        }
    }
}

/// `~/.roster/runs/last.json`
pub fn last_report_path_at(home: &Path) -> PathBuf {
    runs_dir_at(home).join(LAST_REPORT)
}

/// Save `report` as the last run plus a timestamped copy.
///
/// Dry runs are not saved; returns the timestamped path otherwise.
pub fn save_at(home: &Path, report: &RunReport) -> Result<Option<PathBuf>, SyncError> {
    if report.summary.mode == RunMode::DryRun {
        return Ok(None);
    }
    let dir = runs_dir_at(home);
    std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

    let json = serde_json::to_string_pretty(report)?;
    let stamped = dir.join(format!(
        "{}.json",
        report.summary.started_at.format("%Y%m%dT%H%M%SZ")
    ));
    write_atomic(&stamped, &json)?;
    write_atomic(&dir.join(LAST_REPORT), &json)?;
    tracing::debug!(path = %stamped.display(), "saved run report");
    Ok(Some(stamped))
}

/// Load the last saved report, if any run was ever applied.
pub fn load_last_at(home: &Path) -> Result<Option<RunReport>, SyncError> {
    let path = last_report_path_at(home);
    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(&path, err)),
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), SyncError> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}
