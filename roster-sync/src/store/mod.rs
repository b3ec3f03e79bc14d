//! Directory store adapter — the only code that talks to the persisted table.
//!
//! The engine needs three operations and nothing else:
//!
//! | Operation              | Table effect                                             |
//! |------------------------|----------------------------------------------------------|
//! | `list_existing_ids`    | `SELECT id FROM <table>`                                 |
//! | `upsert_batch`         | `INSERT … ON CONFLICT (id) DO UPDATE`                    |
//! | `mark_departed`        | `UPDATE <table> SET job_status, last_updated_at WHERE id` |

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

use roster_core::{EmployeeId, EmployeeRecord, Schema};

pub mod file;
pub mod memory;
pub mod rest;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use rest::RestStore;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures reported by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or did not complete the operation.
    #[error("{backend} store unavailable: {message}")]
    Unavailable {
        backend: &'static str,
        message: String,
    },

    /// The backend refused the data itself.
    #[error("{backend} store rejected the write: {message}")]
    ConstraintViolation {
        backend: &'static str,
        message: String,
    },

    /// A local table file could not be read or written.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn unavailable(backend: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            backend,
            message: message.into(),
        }
    }

    pub(crate) fn constraint(backend: &'static str, message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            backend,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Layout + results
// ---------------------------------------------------------------------------

/// Column names a backend needs to address rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub id_column: String,
    pub job_status_column: String,
}

impl TableLayout {
    pub fn from_schema(schema: &Schema) -> Self {
        Self {
            id_column: schema.id_column().to_owned(),
            job_status_column: schema.job_status_column().to_owned(),
        }
    }
}

impl Default for TableLayout {
    fn default() -> Self {
        Self::from_schema(&Schema::employee_directory())
    }
}

/// Rows accepted by one upsert call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    pub rows: usize,
}

// ---------------------------------------------------------------------------
// DirectoryStore
// ---------------------------------------------------------------------------

/// Backend-agnostic access to the directory table.
///
/// `Sync` because departure marks are issued from several worker threads.
pub trait DirectoryStore: Sync {
    /// Every id currently in the table.
    fn list_existing_ids(&self) -> Result<BTreeSet<EmployeeId>, StoreError>;

    /// Insert or update `records` keyed by id, all or nothing.
    ///
    /// Columns written are the union over the batch: a record lacking one of
    /// them stores `null` there; columns no record carries are left as stored.
    fn upsert_batch(&self, records: &[EmployeeRecord]) -> Result<WriteResult, StoreError>;

    /// Set one row's job status and `last_updated_at`.
    ///
    /// `Ok(false)` means no row matched `id`.
    fn mark_departed(
        &self,
        id: &EmployeeId,
        status: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Largest batch the backend upserts atomically; `None` means any size.
    fn max_batch_size(&self) -> Option<usize> {
        None
    }

    /// Most departure marks worth issuing at once; `None` means no limit.
    fn max_concurrent_marks(&self) -> Option<usize> {
        None
    }
}

impl<S: DirectoryStore + ?Sized> DirectoryStore for &S {
    fn list_existing_ids(&self) -> Result<BTreeSet<EmployeeId>, StoreError> {
        (**self).list_existing_ids()
    }

    fn upsert_batch(&self, records: &[EmployeeRecord]) -> Result<WriteResult, StoreError> {
        (**self).upsert_batch(records)
    }

    fn mark_departed(
        &self,
        id: &EmployeeId,
        status: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        (**self).mark_departed(id, status, at)
    }

    fn max_batch_size(&self) -> Option<usize> {
        (**self).max_batch_size()
    }

    fn max_concurrent_marks(&self) -> Option<usize> {
        (**self).max_concurrent_marks()
    }
}

/// Every column carried by at least one record of the batch.
pub(crate) fn batch_columns(records: &[EmployeeRecord]) -> BTreeSet<&str> {
    records
        .iter()
        .flat_map(|r| r.columns.keys().map(String::as_str))
        .collect()
}

/// `last_updated_at` as written to the table.
pub(crate) fn timestamp_text(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
