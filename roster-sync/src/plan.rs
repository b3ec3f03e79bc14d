//! The three-way partition of a run.
//!
//! ```text
//! to_insert        = source − persisted
//! to_update        = source ∩ persisted
//! to_mark_departed = persisted − source − rejected
//! held             = (persisted − source) ∩ rejected
//! ```
//!
//! `rejected` are ids of source rows the normalizer refused: the employee is
//! still listed, so the stored row is neither rewritten nor departed.
//! Together the partitions cover `source ∪ persisted` with no overlap. Ids are kept in
//! ordered sets so reports read the same on every run; nothing depends on
//! that order.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use roster_core::{EmployeeId, SourceSnapshot};

/// Departing more than this share of the persisted set raises
/// [`PlanWarning::MassDeparture`].
pub const MASS_DEPARTURE_RATIO: f64 = 0.5;

/// Conditions worth surfacing before anything is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanWarning {
    /// The source produced no records but the store is not empty: every
    /// persisted id would be marked departed.
    EmptySource { persisted: usize },
    /// A large share of the persisted set would be marked departed.
    MassDeparture { departing: usize, persisted: usize, ratio: f64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationPlan {
    pub to_insert: BTreeSet<EmployeeId>,
    pub to_update: BTreeSet<EmployeeId>,
    pub to_mark_departed: BTreeSet<EmployeeId>,
    /// Persisted ids whose source row was rejected; left untouched.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub held: BTreeSet<EmployeeId>,
    /// `|persisted|` at plan time.
    pub persisted: usize,
}

impl ReconciliationPlan {
    /// Share of the persisted set that would be marked departed.
    pub fn departure_ratio(&self) -> f64 {
        if self.persisted == 0 {
            0.0
        } else {
            self.to_mark_departed.len() as f64 / self.persisted as f64
        }
    }

    /// Number of rows the upsert phase writes.
    pub fn upsert_len(&self) -> usize {
        self.to_insert.len() + self.to_update.len()
    }

    pub fn is_noop(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty() && self.to_mark_departed.is_empty()
    }

    pub fn warnings(&self) -> Vec<PlanWarning> {
        let mut warnings = Vec::new();
        if self.upsert_len() == 0 && self.persisted > 0 {
            warnings.push(PlanWarning::EmptySource {
                persisted: self.persisted,
            });
        }
        let ratio = self.departure_ratio();
        if ratio > MASS_DEPARTURE_RATIO {
            warnings.push(PlanWarning::MassDeparture {
                departing: self.to_mark_departed.len(),
                persisted: self.persisted,
                ratio,
            });
        }
        warnings
    }
}

/// Partition `snapshot` against the ids already in the store. Pure.
pub fn reconcile(snapshot: &SourceSnapshot, existing: &BTreeSet<EmployeeId>) -> ReconciliationPlan {
    let source = snapshot.ids();
    let rejected = snapshot.rejected_ids();
    let (held, to_mark_departed): (BTreeSet<_>, BTreeSet<_>) = existing
        .difference(&source)
        .cloned()
        .partition(|id| rejected.contains(id));
    ReconciliationPlan {
        to_insert: source.difference(existing).cloned().collect(),
        to_update: source.intersection(existing).cloned().collect(),
        to_mark_departed,
        held,
        persisted: existing.len(),
    }
}

#[cfg(test)]
mod tests {
    use roster_core::{EmployeeRecord, RejectedRecord};

    use super::*;

    fn snapshot(ids: &[&str]) -> SourceSnapshot {
        SourceSnapshot::from_records(ids.iter().map(|id| EmployeeRecord::new("emp_id", *id)))
    }

    fn set(ids: &[&str]) -> BTreeSet<EmployeeId> {
        ids.iter().map(|id| EmployeeId::from(*id)).collect()
    }

    #[test]
    fn empty_source_warns() {
        let plan = reconcile(&snapshot(&[]), &set(&["1", "2"]));
        let warnings = plan.warnings();
        assert!(warnings.contains(&PlanWarning::EmptySource { persisted: 2 }));
        assert!(matches!(
            warnings.last(),
            Some(PlanWarning::MassDeparture { departing: 2, .. })
        ));
    }

    #[test]
    fn half_departing_is_not_mass_departure() {
        let plan = reconcile(&snapshot(&["1", "2"]), &set(&["1", "2", "3", "4"]));
        assert_eq!(plan.departure_ratio(), 0.5);
        assert!(plan.warnings().is_empty());
    }

    #[test]
    fn empty_store_has_no_warnings() {
        let plan = reconcile(&snapshot(&[]), &set(&[]));
        assert!(plan.is_noop());
        assert!(plan.warnings().is_empty());
        assert_eq!(plan.departure_ratio(), 0.0);
    }

    #[test]
    fn rejected_row_holds_its_stored_id() {
        let snap = snapshot(&["1"]).with_rejected(vec![RejectedRecord {
            index: 1,
            id: Some(EmployeeId::from("7")),
            reason: "column 'is_show_private_data' expects flag".into(),
        }]);
        let plan = reconcile(&snap, &set(&["1", "7", "9"]));
        assert_eq!(plan.held, set(&["7"]));
        assert_eq!(plan.to_mark_departed, set(&["9"]));
        assert_eq!(plan.to_update, set(&["1"]));
    }
}
