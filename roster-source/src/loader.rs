//! Snapshot loaders: live API or replayed page cache.

use roster_core::{Normalizer, SourceSnapshot};
use serde_json::Value;

use crate::cache::PageCache;
use crate::error::SourceError;
use crate::fetch::PageFetcher;
use crate::paginate::fetch_all;

/// Produces a normalized, complete snapshot of the source directory.
pub trait SnapshotLoader {
    fn load(&self) -> Result<SourceSnapshot, SourceError>;
}

/// Paginates the live directory, caching pages when a cache is set.
pub struct ApiLoader<F> {
    fetcher: F,
    cache: Option<PageCache>,
    normalizer: Normalizer,
    max_pages: u32,
}

impl<F: PageFetcher> ApiLoader<F> {
    pub fn new(fetcher: F, normalizer: Normalizer, max_pages: u32) -> Self {
        Self {
            fetcher,
            cache: None,
            normalizer,
            max_pages,
        }
    }

    pub fn with_cache(mut self, cache: PageCache) -> Self {
        self.cache = Some(cache);
        self
    }
}

impl<F: PageFetcher> SnapshotLoader for ApiLoader<F> {
    fn load(&self) -> Result<SourceSnapshot, SourceError> {
        let fetched = fetch_all(&self.fetcher, self.cache.as_ref(), self.max_pages)?;
        tracing::info!(
            rows = fetched.rows.len(),
            pages = fetched.pages,
            reported_total = ?fetched.reported_total,
            "directory fetched"
        );
        Ok(normalize_logged(&self.normalizer, fetched.rows))
    }
}

/// Replays a previously fetched page cache.
pub struct CacheLoader {
    cache: PageCache,
    normalizer: Normalizer,
}

impl CacheLoader {
    pub fn new(cache: PageCache, normalizer: Normalizer) -> Self {
        Self { cache, normalizer }
    }
}

impl SnapshotLoader for CacheLoader {
    fn load(&self) -> Result<SourceSnapshot, SourceError> {
        let rows = self.cache.replay()?;
        tracing::info!(
            rows = rows.len(),
            dir = %self.cache.dir().display(),
            "directory replayed from cache"
        );
        Ok(normalize_logged(&self.normalizer, rows))
    }
}

fn normalize_logged(normalizer: &Normalizer, rows: Vec<Value>) -> SourceSnapshot {
    let snapshot = normalizer.normalize_all(rows);
    if !snapshot.unknown_columns().is_empty() {
        let columns: Vec<&str> = snapshot.unknown_columns().iter().map(String::as_str).collect();
        tracing::warn!(columns = %columns.join(", "), "dropped columns not in schema");
    }
    for rejected in snapshot.rejected() {
        tracing::warn!(index = rejected.index, reason = %rejected.reason, "rejected source row");
    }
    if snapshot.duplicates() > 0 {
        tracing::warn!(duplicates = snapshot.duplicates(), "duplicate ids in source, kept last");
    }
    snapshot
}
