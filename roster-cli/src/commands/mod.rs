//! Subcommands and the wiring they share.

pub mod fetch;
pub mod init;
pub mod plan;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use roster_core::config::{config_path_at, StoreBackend};
use roster_core::{Normalizer, RosterConfig, Secrets};
use roster_source::{ApiLoader, CacheLoader, HttpPageFetcher, PageCache, SnapshotLoader};
use roster_sync::{DirectoryStore, FileStore, RestStore, TableLayout};

use crate::{Globals, SourceArg};

/// Everything a command needs after config and environment are read.
pub(crate) struct Session {
    pub home: PathBuf,
    pub config: RosterConfig,
    pub secrets: Secrets,
}

impl Session {
    pub fn open(globals: &Globals) -> Result<Self> {
        let home = home_dir()?;
        let path = config_path(globals, &home);
        let config = RosterConfig::load(&path)
            .with_context(|| format!("failed to load config '{}'", path.display()))?;
        tracing::debug!(path = %path.display(), backend = ?config.store.backend, "config loaded");
        Ok(Self {
            home,
            config,
            secrets: Secrets::from_env(),
        })
    }

    pub fn cache(&self) -> PageCache {
        PageCache::new(self.config.cache_dir_at(&self.home))
    }

    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.config.schema.clone(), self.config.sync.unknown_fields)
    }

    pub fn fetcher(&self) -> Result<HttpPageFetcher> {
        HttpPageFetcher::new(&self.config.source, self.secrets.api_token.as_deref())
            .context("cannot reach the directory API")
    }

    pub fn loader(&self, source: SourceArg) -> Result<Box<dyn SnapshotLoader>> {
        Ok(match source {
            SourceArg::Api => Box::new(
                ApiLoader::new(self.fetcher()?, self.normalizer(), self.config.source.max_pages)
                    .with_cache(self.cache()),
            ),
            SourceArg::Local => Box::new(CacheLoader::new(self.cache(), self.normalizer())),
        })
    }

    pub fn store(&self) -> Result<Box<dyn DirectoryStore>> {
        let layout = TableLayout::from_schema(&self.config.schema);
        Ok(match self.config.store.backend {
            StoreBackend::Rest => Box::new(
                RestStore::new(&self.config.store, &self.secrets, layout)
                    .context("cannot open the table store")?,
            ),
            StoreBackend::File => Box::new(FileStore::new(
                self.config.table_file_at(&self.home),
                layout,
            )),
        })
    }
}

pub(crate) fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

pub(crate) fn config_path(globals: &Globals, home: &Path) -> PathBuf {
    globals
        .config
        .clone()
        .unwrap_or_else(|| config_path_at(home))
}
