//! `roster fetch` — download every page into the cache, store untouched.

use anyhow::{Context, Result};
use clap::Args;

use roster_source::fetch_all;

use super::Session;
use crate::Globals;

#[derive(Args, Debug)]
pub struct FetchArgs {}

impl FetchArgs {
    pub fn run(self, globals: &Globals) -> Result<()> {
        let session = Session::open(globals)?;
        let fetcher = session.fetcher()?;
        let cache = session.cache();

        let fetched = fetch_all(&fetcher, Some(&cache), session.config.source.max_pages)
            .with_context(|| format!("fetch from '{}' failed", fetcher.url()))?;

        let reported = fetched
            .reported_total
            .map_or_else(|| "no total".to_string(), |total| format!("directory reports {total}"));
        println!(
            "✓ Fetched {} employees in {} pages ({reported})",
            fetched.rows.len(),
            fetched.pages,
        );
        println!("  Cached in {}", cache.dir().display());
        Ok(())
    }
}
