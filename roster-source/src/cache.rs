//! Page cache — raw API pages on disk, with a SHA-256 manifest.
//!
//! Layout of the cache directory:
//!
//! ```text
//! <cache>/
//!   page_0.json      (raw envelope, pretty-printed)
//!   page_1.json
//!   ...
//!   manifest.json    ({ fetched_at, complete, pages: { file → sha256 } })
//! ```
//!
//! Writes use the `.tmp` + rename pattern. The manifest is written last, so
//! a directory without a complete manifest never passes for a finished fetch.
//! Caches with no manifest at all predate it and are replayed unverified.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::envelope::PageEnvelope;
use crate::error::{io_err, SourceError};

pub const MANIFEST_FILE: &str = "manifest.json";

/// On-disk manifest payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheManifest {
    pub fetched_at: DateTime<Utc>,
    pub complete: bool,
    /// Page file name → SHA-256 hex digest of its bytes.
    pub pages: BTreeMap<String, String>,
}

/// A directory of cached pages.
#[derive(Debug, Clone)]
pub struct PageCache {
    dir: PathBuf,
}

impl PageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<cache>/page_<index>.json`
    pub fn page_path(&self, index: u32) -> PathBuf {
        self.dir.join(page_file_name(index))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    /// Start a fresh fetch: clears old pages and marks the cache unfinished
    /// until [`CacheSession::finish`] runs.
    pub fn begin(&self) -> Result<CacheSession<'_>, SourceError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        let session = CacheSession {
            cache: self,
            pages: BTreeMap::new(),
        };
        session.write_manifest(false)?;
        for (_, path) in self.list_pages()? {
            remove_if_present(&path)?;
        }
        Ok(session)
    }

    /// Cached page files ordered by numeric index (`page_2` before `page_10`).
    pub fn list_pages(&self) -> Result<Vec<(u32, PathBuf)>, SourceError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        let mut pages: Vec<(u32, PathBuf)> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|e| {
                let index = parse_page_index(&e.file_name().to_string_lossy())?;
                Some((index, e.path()))
            })
            .collect();
        pages.sort_by_key(|(index, _)| *index);
        Ok(pages)
    }

    /// Load the manifest, or `None` for a cache written without one.
    pub fn load_manifest(&self) -> Result<Option<CacheManifest>, SourceError> {
        let path = self.manifest_path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_err(&path, err)),
        }
    }

    /// Read back every cached row, in page order.
    pub fn replay(&self) -> Result<Vec<Value>, SourceError> {
        if !self.dir.is_dir() {
            return Err(SourceError::CacheMissing {
                path: self.dir.clone(),
            });
        }

        let pages = self.list_pages()?;
        let manifest = self.load_manifest()?;
        if let Some(manifest) = &manifest {
            if !manifest.complete {
                return Err(self.corrupt("manifest records an unfinished fetch"));
            }
            let on_disk: Vec<String> = pages.iter().map(|(i, _)| page_file_name(*i)).collect();
            if let Some(missing) = manifest.pages.keys().find(|name| !on_disk.contains(name)) {
                return Err(self.corrupt(format!("{missing} is listed but missing")));
            }
        } else if pages.is_empty() {
            return Err(SourceError::CacheMissing {
                path: self.dir.clone(),
            });
        } else {
            tracing::warn!(dir = %self.dir.display(), "replaying page cache without a manifest");
        }

        let mut rows = Vec::new();
        for (index, path) in pages {
            let bytes = std::fs::read(&path).map_err(|e| io_err(&path, e))?;
            if let Some(manifest) = &manifest {
                let name = page_file_name(index);
                match manifest.pages.get(&name) {
                    Some(expected) if *expected == digest(&bytes) => {}
                    Some(_) => return Err(self.corrupt(format!("{name} does not match its digest"))),
                    None => return Err(self.corrupt(format!("{name} is not in the manifest"))),
                }
            }
            let page: PageEnvelope = serde_json::from_slice(&bytes)?;
            tracing::debug!(page = index, rows = page.rows().len(), "replayed cached page");
            rows.extend(page.into_rows());
        }
        Ok(rows)
    }

    fn corrupt(&self, reason: impl Into<String>) -> SourceError {
        SourceError::CacheCorrupt {
            path: self.dir.clone(),
            reason: reason.into(),
        }
    }
}

/// One in-progress fetch into a [`PageCache`].
pub struct CacheSession<'c> {
    cache: &'c PageCache,
    pages: BTreeMap<String, String>,
}

impl CacheSession<'_> {
    /// Write one page atomically and remember its digest.
    pub fn record(&mut self, index: u32, page: &PageEnvelope) -> Result<(), SourceError> {
        let json = serde_json::to_string_pretty(page)?;
        let path = self.cache.page_path(index);
        write_atomic(&path, json.as_bytes())?;
        self.pages.insert(page_file_name(index), digest(json.as_bytes()));
        tracing::debug!(path = %path.display(), "cached page");
        Ok(())
    }

    /// Seal the fetch by writing a complete manifest.
    pub fn finish(self) -> Result<CacheManifest, SourceError> {
        let manifest = self.write_manifest(true)?;
        tracing::debug!(pages = manifest.pages.len(), "page cache complete");
        Ok(manifest)
    }

    fn write_manifest(&self, complete: bool) -> Result<CacheManifest, SourceError> {
        let manifest = CacheManifest {
            fetched_at: Utc::now(),
            complete,
            pages: self.pages.clone(),
        };
        let json = serde_json::to_string_pretty(&manifest)?;
        write_atomic(&self.cache.manifest_path(), json.as_bytes())?;
        Ok(manifest)
    }
}

fn page_file_name(index: u32) -> String {
    format!("page_{index}.json")
}

fn parse_page_index(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix("page_")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

fn digest(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SourceError> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<(), SourceError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(path, err)),
    }
}
