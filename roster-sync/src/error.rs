//! Error types for roster-sync.

use std::path::PathBuf;

use thiserror::Error;

use roster_source::SourceError;

use crate::store::StoreError;

/// All errors that end a reconciliation run.
///
/// Per-id departure failures are not errors; they are reported on the
/// [`RunSummary`](crate::RunSummary).
#[derive(Debug, Error)]
pub enum SyncError {
    /// No snapshot could be produced; nothing was written.
    #[error("source unavailable: {0}")]
    Source(#[from] SourceError),

    /// The store could not be read; nothing was written.
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),

    /// The source returned zero records while the store is not empty.
    #[error(
        "source returned no employees but the store holds {persisted}; refusing to mark everyone departed (pass --allow-empty to override)"
    )]
    EmptySnapshot { persisted: usize },

    /// Too many persisted ids would be marked departed in one run.
    #[error(
        "{departing} of {persisted} employees would be marked departed ({:.1}% > {:.1}% allowed)",
        .ratio * 100.0,
        .max_ratio * 100.0
    )]
    DepartureGuard {
        departing: usize,
        persisted: usize,
        ratio: f64,
        max_ratio: f64,
    },

    /// An upsert chunk failed; departures were not attempted.
    #[error("upsert aborted after {confirmed_rows} of {total_rows} rows: {source}")]
    UpsertAborted {
        confirmed_rows: usize,
        total_rows: usize,
        #[source]
        source: StoreError,
    },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (run reports).
    #[error("run report JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
