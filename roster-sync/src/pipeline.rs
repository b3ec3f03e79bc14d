//! Shared run entrypoint used by `roster sync` and `roster plan`.
//!
//! Order of a run:
//! 1. load the snapshot (fatal, nothing written);
//! 2. list stored ids (fatal, nothing written);
//! 3. reconcile;
//! 4. guard against empty snapshots and mass departures;
//! 5. apply, or summarize the plan in dry-run mode.

use chrono::Utc;

use roster_core::config::SyncConfig;
use roster_core::SourceSnapshot;
use roster_source::SnapshotLoader;

use crate::engine::{apply, ApplyOptions, RunSummary};
use crate::error::SyncError;
use crate::plan::{reconcile, ReconciliationPlan};
use crate::report::RunReport;
use crate::store::DirectoryStore;

#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    pub apply: ApplyOptions,
    pub dry_run: bool,
    /// Let an empty snapshot depart every stored id.
    pub allow_empty_snapshot: bool,
    /// Refuse runs departing more than this share of stored ids.
    pub max_departure_ratio: Option<f64>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

impl SyncOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            apply: ApplyOptions::from_config(config),
            dry_run: false,
            allow_empty_snapshot: config.allow_empty_snapshot,
            max_departure_ratio: config.max_departure_ratio,
        }
    }
}

/// Load and reconcile without writing anything.
pub fn plan<L, S>(loader: &L, store: &S) -> Result<(SourceSnapshot, ReconciliationPlan), SyncError>
where
    L: SnapshotLoader + ?Sized,
    S: DirectoryStore + ?Sized,
{
    let snapshot = loader.load()?;
    tracing::info!(
        records = snapshot.len(),
        rejected = snapshot.rejected().len(),
        "snapshot loaded"
    );
    let existing = store.list_existing_ids()?;
    tracing::info!(persisted = existing.len(), "stored ids listed");

    let plan = reconcile(&snapshot, &existing);
    for warning in plan.warnings() {
        tracing::warn!(?warning, "plan warning");
    }
    Ok((snapshot, plan))
}

/// Refuse plans that look like a source outage rather than real departures.
pub fn guard(plan: &ReconciliationPlan, options: &SyncOptions) -> Result<(), SyncError> {
    if plan.upsert_len() == 0 && plan.persisted > 0 && !options.allow_empty_snapshot {
        return Err(SyncError::EmptySnapshot {
            persisted: plan.persisted,
        });
    }
    if let Some(max_ratio) = options.max_departure_ratio {
        let ratio = plan.departure_ratio();
        if ratio > max_ratio {
            return Err(SyncError::DepartureGuard {
                departing: plan.to_mark_departed.len(),
                persisted: plan.persisted,
                ratio,
                max_ratio,
            });
        }
    }
    Ok(())
}

/// Run one full reconciliation.
pub fn run<L, S>(loader: &L, store: &S, options: &SyncOptions) -> Result<RunReport, SyncError>
where
    L: SnapshotLoader + ?Sized,
    S: DirectoryStore + ?Sized,
{
    let (snapshot, plan) = plan(loader, store)?;
    guard(&plan, options)?;

    let summary = if options.dry_run {
        tracing::info!("[dry-run] no changes written");
        RunSummary::planned(&plan, &snapshot, Utc::now())
    } else {
        apply(&plan, &snapshot, store, &options.apply)?
    };
    Ok(RunReport::new(&plan, &snapshot, summary))
}
