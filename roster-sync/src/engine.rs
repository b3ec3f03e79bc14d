//! Applying a [`ReconciliationPlan`] to a store.
//!
//! ## Upsert phase
//!
//! Every planned source record is written with one shared `last_updated_at`
//! (the run start). The batch is split only when a chunk size is configured
//! or the store reports a batch limit; the first failed chunk aborts the run
//! and departures are never attempted after a failed upsert.
//!
//! ## Departure phase
//!
//! Each departing id is marked on its own. A failure is recorded and the
//! remaining ids are still attempted. Marks run on a bounded pool of scoped
//! threads pulling from a shared cursor, never wider than the store allows;
//! the summary is built only after every worker has joined.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use roster_core::config::SyncConfig;
use roster_core::{EmployeeId, EmployeeRecord, SourceSnapshot, LAST_UPDATED_COLUMN};

use crate::error::SyncError;
use crate::plan::ReconciliationPlan;
use crate::store::{timestamp_text, DirectoryStore};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOptions {
    /// `job_status` written for departing ids.
    pub departed_status: String,
    pub departure_workers: usize,
    pub upsert_chunk_size: Option<usize>,
    /// Stop starting new departure marks once this much time has passed.
    pub departure_deadline: Option<Duration>,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

impl ApplyOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            departed_status: config.departed_status.clone(),
            departure_workers: config.departure_workers,
            upsert_chunk_size: config.upsert_chunk_size,
            departure_deadline: None,
        }
    }

    fn chunk_size(&self, store_limit: Option<usize>) -> Option<usize> {
        let size = match (self.upsert_chunk_size, store_limit) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        size.map(|n| n.max(1))
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Apply,
    DryRun,
}

/// Result of one departure mark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepartureOutcome {
    Marked,
    /// The store had no row for the id.
    NotFound,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartureFailure {
    pub id: EmployeeId,
    pub reason: String,
}

/// Counts for one run. `new` and `updated` come from the plan; `departed`
/// counts confirmed marks only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub mode: RunMode,
    pub new: usize,
    pub updated: usize,
    pub departed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub departure_failures: Vec<DepartureFailure>,
    /// Ids never attempted because the departure deadline passed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_departures: Vec<EmployeeId>,
    /// Source rows the normalizer refused.
    #[serde(default)]
    pub rejected: usize,
    /// Stored ids left untouched because their source row was rejected.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub held: Vec<EmployeeId>,
    /// Source rows collapsed into an earlier row with the same id.
    #[serde(default)]
    pub duplicates: usize,
}

impl RunSummary {
    /// What a run would do, without touching the store.
    pub fn planned(plan: &ReconciliationPlan, snapshot: &SourceSnapshot, started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            mode: RunMode::DryRun,
            new: plan.to_insert.len(),
            updated: plan.to_update.len(),
            departed: plan.to_mark_departed.len(),
            departure_failures: Vec::new(),
            skipped_departures: Vec::new(),
            rejected: snapshot.rejected().len(),
            held: plan.held.iter().cloned().collect(),
            duplicates: snapshot.duplicates(),
        }
    }

    pub fn is_partial_departure_failure(&self) -> bool {
        !self.departure_failures.is_empty() || !self.skipped_departures.is_empty()
    }
}

// ---------------------------------------------------------------------------
// apply
// ---------------------------------------------------------------------------

/// Write the plan to `store`. Marks departures unconditionally; callers that
/// want a safety threshold check the plan first.
pub fn apply<S>(
    plan: &ReconciliationPlan,
    snapshot: &SourceSnapshot,
    store: &S,
    options: &ApplyOptions,
) -> Result<RunSummary, SyncError>
where
    S: DirectoryStore + ?Sized,
{
    // Microseconds: the precision `last_updated_at` is written with.
    let started_at = Utc::now().trunc_subsecs(6);
    tracing::info!(
        %started_at,
        new = plan.to_insert.len(),
        updated = plan.to_update.len(),
        departing = plan.to_mark_departed.len(),
        "run_started"
    );

    let records = stamped_records(plan, snapshot, started_at);
    upsert_phase(&records, store, options)?;
    tracing::info!(rows = records.len(), "upsert phase complete");
    for id in &plan.held {
        tracing::warn!(%id, "source row rejected; stored row left untouched");
    }

    let outcomes = departure_phase(&plan.to_mark_departed, store, options, started_at);

    let mut summary = RunSummary::planned(plan, snapshot, started_at);
    summary.mode = RunMode::Apply;
    summary.departed = 0;
    for (id, outcome) in outcomes.attempted {
        match outcome {
            DepartureOutcome::Marked => summary.departed += 1,
            DepartureOutcome::NotFound => {
                tracing::warn!(%id, "departure mark matched no row");
                summary.departure_failures.push(DepartureFailure {
                    id,
                    reason: "no row matched".to_string(),
                });
            }
            DepartureOutcome::Failed(reason) => {
                tracing::warn!(%id, %reason, "departure mark failed");
                summary.departure_failures.push(DepartureFailure { id, reason });
            }
        }
    }
    summary.skipped_departures = outcomes.skipped;
    if !summary.skipped_departures.is_empty() {
        tracing::warn!(
            skipped = summary.skipped_departures.len(),
            "departure deadline passed before every id was attempted"
        );
    }

    tracing::info!(
        new = summary.new,
        updated = summary.updated,
        departed = summary.departed,
        failed = summary.departure_failures.len(),
        "run finished"
    );
    Ok(summary)
}

/// Planned source records with `last_updated_at` set to the run start.
fn stamped_records(
    plan: &ReconciliationPlan,
    snapshot: &SourceSnapshot,
    started_at: DateTime<Utc>,
) -> Vec<EmployeeRecord> {
    let stamp = timestamp_text(started_at);
    snapshot
        .records()
        .iter()
        .filter(|r| plan.to_insert.contains(&r.id) || plan.to_update.contains(&r.id))
        .map(|r| r.clone().with(LAST_UPDATED_COLUMN, stamp.as_str()))
        .collect()
}

fn upsert_phase<S>(records: &[EmployeeRecord], store: &S, options: &ApplyOptions) -> Result<(), SyncError>
where
    S: DirectoryStore + ?Sized,
{
    if records.is_empty() {
        return Ok(());
    }
    let chunk_size = options
        .chunk_size(store.max_batch_size())
        .unwrap_or(records.len());

    let mut confirmed_rows = 0;
    for chunk in records.chunks(chunk_size) {
        match store.upsert_batch(chunk) {
            Ok(_) => {
                confirmed_rows += chunk.len();
                tracing::debug!(confirmed_rows, total = records.len(), "upsert chunk written");
            }
            Err(source) => {
                tracing::error!(confirmed_rows, error = %source, "upsert failed; skipping departures");
                return Err(SyncError::UpsertAborted {
                    confirmed_rows,
                    total_rows: records.len(),
                    source,
                });
            }
        }
    }
    Ok(())
}

struct DepartureOutcomes {
    attempted: Vec<(EmployeeId, DepartureOutcome)>,
    skipped: Vec<EmployeeId>,
}

fn departure_phase<S>(
    departing: &BTreeSet<EmployeeId>,
    store: &S,
    options: &ApplyOptions,
    at: DateTime<Utc>,
) -> DepartureOutcomes
where
    S: DirectoryStore + ?Sized,
{
    let ids: Vec<&EmployeeId> = departing.iter().collect();
    if ids.is_empty() {
        return DepartureOutcomes {
            attempted: Vec::new(),
            skipped: Vec::new(),
        };
    }

    let workers = store
        .max_concurrent_marks()
        .map_or(options.departure_workers, |n| options.departure_workers.min(n))
        .clamp(1, ids.len());
    let deadline = options.departure_deadline.map(|d| Instant::now() + d);
    let cursor = AtomicUsize::new(0);
    let status = options.departed_status.as_str();

    let mut results: Vec<(usize, DepartureOutcome)> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(|| {
                    let mut local = Vec::new();
                    loop {
                        if deadline.is_some_and(|d| Instant::now() >= d) {
                            break;
                        }
                        let index = cursor.fetch_add(1, Ordering::Relaxed);
                        let Some(id) = ids.get(index) else { break };
                        let outcome = match store.mark_departed(id, status, at) {
                            Ok(true) => DepartureOutcome::Marked,
                            Ok(false) => DepartureOutcome::NotFound,
                            Err(err) => DepartureOutcome::Failed(err.to_string()),
                        };
                        local.push((index, outcome));
                    }
                    local
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(local) => local,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });
    results.sort_by_key(|(index, _)| *index);

    let attempted_indices: BTreeSet<usize> = results.iter().map(|(i, _)| *i).collect();
    let skipped = ids
        .iter()
        .enumerate()
        .filter(|(i, _)| !attempted_indices.contains(i))
        .map(|(_, id)| (*id).clone())
        .collect();
    let attempted = results
        .into_iter()
        .map(|(i, outcome)| (ids[i].clone(), outcome))
        .collect();

    DepartureOutcomes { attempted, skipped }
}
