//! Error types for roster-source.
//!
//! Every variant means the same thing to the run: no trustworthy snapshot
//! could be produced, so nothing may be written.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while producing a source snapshot.
#[derive(Debug, Error)]
pub enum SourceError {
    /// A required setting is absent.
    #[error("source is not configured: {0}")]
    NotConfigured(&'static str),

    /// The request never produced an HTTP response.
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// The server answered with a non-success HTTP status.
    #[error("{url} answered HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// The API envelope reported an application-level failure.
    #[error("directory API returned status {status}: {message}")]
    Api { status: String, message: String },

    /// The response body was not the expected JSON.
    #[error("could not decode page {page}: {message}")]
    Decode { page: u32, message: String },

    /// The server never signalled the end of the listing.
    #[error("gave up after {max_pages} pages without reaching the end of the listing")]
    PageLimit { max_pages: u32 },

    /// Replay was requested but the cache directory does not exist.
    #[error("page cache not found at {path}; run `roster fetch` first")]
    CacheMissing { path: PathBuf },

    /// Cached pages do not match their manifest.
    #[error("page cache at {path} is unusable: {reason}")]
    CacheCorrupt { path: PathBuf, reason: String },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (cache files).
    #[error("page cache JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`SourceError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SourceError {
    SourceError::Io {
        path: path.into(),
        source,
    }
}
