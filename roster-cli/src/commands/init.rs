//! `roster init [--force] [--source-url URL] [--store-url URL] [--backend rest|file]`

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};

use roster_core::config::StoreBackend;
use roster_core::RosterConfig;

use super::{config_path, home_dir};
use crate::Globals;

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum BackendArg {
    Rest,
    File,
}

impl From<BackendArg> for StoreBackend {
    fn from(b: BackendArg) -> Self {
        match b {
            BackendArg::Rest => StoreBackend::Rest,
            BackendArg::File => StoreBackend::File,
        }
    }
}

/// Write a default config file.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config file.
    #[arg(long)]
    pub force: bool,

    /// Directory API search endpoint.
    #[arg(long, value_name = "URL")]
    pub source_url: Option<String>,

    /// Table store project URL (rest backend).
    #[arg(long, value_name = "URL")]
    pub store_url: Option<String>,

    /// Table store backend.
    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,
}

impl InitArgs {
    pub fn run(self, globals: &Globals) -> Result<()> {
        let home = home_dir()?;
        let path = config_path(globals, &home);
        if path.exists() && !self.force {
            bail!(
                "config already exists at '{}'; pass --force to overwrite",
                path.display()
            );
        }

        let mut config = RosterConfig::default();
        config.source.url = self.source_url;
        config.store.url = self.store_url;
        if let Some(backend) = self.backend {
            config.store.backend = backend.into();
        }
        config
            .save(&path)
            .with_context(|| format!("failed to write '{}'", path.display()))?;

        println!("✓ Wrote config to {}", path.display());
        println!("  Set ROSTER_API_TOKEN and ROSTER_STORE_KEY in the environment or a .env file.");
        Ok(())
    }
}
