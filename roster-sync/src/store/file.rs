//! Local JSON table file.
//!
//! ```json
//! { "updated_at": "2026-01-01T00:00:00Z", "rows": [ { "emp_id": "1", ... } ] }
//! ```
//!
//! Every mutation is read-modify-write under one lock and lands with the
//! `.tmp` + rename pattern, so an upsert batch replaces the file atomically.

use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use roster_core::{EmployeeId, EmployeeRecord, FieldValue};

use super::memory::{mark_in, upsert_into};
use super::{DirectoryStore, StoreError, TableLayout, WriteResult};

const BACKEND: &str = "file";

#[derive(Debug, Default, Serialize, Deserialize)]
struct TableFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    rows: Vec<BTreeMap<String, FieldValue>>,
}

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    layout: TableLayout,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>, layout: TableLayout) -> Self {
        Self {
            path: path.into(),
            layout,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every row in id order. A missing file is an empty table.
    pub fn load(&self) -> Result<BTreeMap<EmployeeId, EmployeeRecord>, StoreError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(io_err(&self.path, err)),
        };
        let table: TableFile = serde_json::from_str(&contents).map_err(|e| {
            StoreError::unavailable(BACKEND, format!("{}: {e}", self.path.display()))
        })?;

        let mut rows = BTreeMap::new();
        for (index, columns) in table.rows.into_iter().enumerate() {
            let id = match columns.get(&self.layout.id_column) {
                Some(FieldValue::Text(id)) if !id.is_empty() => EmployeeId::from(id.as_str()),
                _ => {
                    return Err(StoreError::unavailable(
                        BACKEND,
                        format!(
                            "{}: row {index} has no {}",
                            self.path.display(),
                            self.layout.id_column
                        ),
                    ))
                }
            };
            rows.insert(id.clone(), EmployeeRecord { id, columns });
        }
        Ok(rows)
    }

    fn save(&self, rows: BTreeMap<EmployeeId, EmployeeRecord>) -> Result<(), StoreError> {
        let table = TableFile {
            updated_at: Some(Utc::now()),
            rows: rows.into_values().map(|r| r.columns).collect(),
        };
        let json = serde_json::to_string_pretty(&table)
            .map_err(|e| StoreError::unavailable(BACKEND, e.to_string()))?;

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(io_err(&self.path, e));
        }
        Ok(())
    }
}

impl DirectoryStore for FileStore {
    fn list_existing_ids(&self) -> Result<BTreeSet<EmployeeId>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.into_keys().collect())
    }

    fn upsert_batch(&self, records: &[EmployeeRecord]) -> Result<WriteResult, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut rows = self.load()?;
        upsert_into(&mut rows, records);
        self.save(rows)?;
        tracing::debug!(rows = records.len(), path = %self.path.display(), "upserted into table file");
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
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut rows = self.load()?;
        if !mark_in(&mut rows, &self.layout, id, status, at) {
            return Ok(false);
        }
        self.save(rows)?;
        Ok(true)
    }

    /// Every mark rewrites the whole file under one lock.
    fn max_concurrent_marks(&self) -> Option<usize> {
        Some(1)
    }
}

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn marks_are_serialized_and_persisted() {
        let tmp = TempDir::new().expect("tmp");
        let store = FileStore::new(tmp.path().join("table.json"), TableLayout::default());
        store
            .upsert_batch(&[EmployeeRecord::new("emp_id", "1").with("job_status", "在職")])
            .expect("upsert");

        assert_eq!(store.max_concurrent_marks(), Some(1));
        assert!(store.mark_departed(&"1".into(), "離職", Utc::now()).expect("mark"));
        assert!(!store.mark_departed(&"2".into(), "離職", Utc::now()).expect("mark"));

        let rows = store.load().expect("load");
        let one = rows.get(&EmployeeId::from("1")).expect("row 1");
        assert_eq!(one.get("job_status").and_then(FieldValue::as_text), Some("離職"));
    }
}
