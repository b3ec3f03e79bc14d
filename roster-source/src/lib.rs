//! # roster-source
//!
//! Snapshot loading for the directory mirror.
//!
//! A run's source snapshot comes either from the live directory API
//! ([`ApiLoader`]: paginate, cache every page, normalize) or from pages cached
//! by an earlier fetch ([`CacheLoader`]: replay, normalize). Both implement
//! [`SnapshotLoader`].

pub mod cache;
pub mod envelope;
pub mod error;
pub mod fetch;
pub mod loader;
pub mod paginate;

pub use cache::{CacheManifest, PageCache};
pub use envelope::PageEnvelope;
pub use error::SourceError;
pub use fetch::{HttpPageFetcher, PageFetcher};
pub use loader::{ApiLoader, CacheLoader, SnapshotLoader};
pub use paginate::{fetch_all, FetchedRows};
