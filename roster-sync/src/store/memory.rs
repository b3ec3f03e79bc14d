//! In-process store. Reference semantics for the other backends.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use roster_core::{EmployeeId, EmployeeRecord, FieldValue, LAST_UPDATED_COLUMN};

use super::{batch_columns, timestamp_text, DirectoryStore, StoreError, TableLayout, WriteResult};

#[derive(Debug, Default)]
pub struct MemoryStore {
    layout: TableLayout,
    rows: Mutex<BTreeMap<EmployeeId, EmployeeRecord>>,
}

impl MemoryStore {
    pub fn new(layout: TableLayout) -> Self {
        Self {
            layout,
            rows: Mutex::new(BTreeMap::new()),
        }
    }

    /// A store pre-filled with `records`.
    pub fn with_records(layout: TableLayout, records: impl IntoIterator<Item = EmployeeRecord>) -> Self {
        let rows = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            layout,
            rows: Mutex::new(rows),
        }
    }

    pub fn get(&self, id: &EmployeeId) -> Option<EmployeeRecord> {
        self.rows().get(id).cloned()
    }

    /// All rows in id order.
    pub fn records(&self) -> Vec<EmployeeRecord> {
        self.rows().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    fn rows(&self) -> MutexGuard<'_, BTreeMap<EmployeeId, EmployeeRecord>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DirectoryStore for MemoryStore {
    fn list_existing_ids(&self) -> Result<BTreeSet<EmployeeId>, StoreError> {
        Ok(self.rows().keys().cloned().collect())
    }

    fn upsert_batch(&self, records: &[EmployeeRecord]) -> Result<WriteResult, StoreError> {
        let mut rows = self.rows();
        upsert_into(&mut rows, records);
        Ok(WriteResult {
            rows: records.len(),
        })
    }

    fn mark_departed(
        &self,
        id: &EmployeeId,
        status: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut rows = self.rows();
        Ok(mark_in(&mut rows, &self.layout, id, status, at))
    }
}

/// Merge `records` into `rows` the way a bulk upsert of uniform rows does:
/// batch columns a record lacks become `null`, other stored columns survive.
pub(crate) fn upsert_into(
    rows: &mut BTreeMap<EmployeeId, EmployeeRecord>,
    records: &[EmployeeRecord],
) {
    let columns = batch_columns(records);
    for record in records {
        let mut written = record.clone();
        for column in &columns {
            written
                .columns
                .entry((*column).to_owned())
                .or_insert(FieldValue::Null);
        }
        match rows.get_mut(&record.id) {
            Some(existing) => existing.columns.extend(written.columns),
            None => {
                rows.insert(written.id.clone(), written);
            }
        }
    }
}

pub(crate) fn mark_in(
    rows: &mut BTreeMap<EmployeeId, EmployeeRecord>,
    layout: &TableLayout,
    id: &EmployeeId,
    status: &str,
    at: DateTime<Utc>,
) -> bool {
    match rows.get_mut(id) {
        Some(row) => {
            row.set(&layout.job_status_column, status);
            row.set(LAST_UPDATED_COLUMN, timestamp_text(at));
            true
        }
        None => false,
    }
}
