//! Live-API loading through a scripted fetcher.

use roster_core::{Normalizer, Schema, UnknownFieldPolicy};
use roster_source::{ApiLoader, PageCache, PageEnvelope, PageFetcher, SnapshotLoader, SourceError};
use rstest::rstest;
use serde_json::{json, Value};
use tempfile::TempDir;

struct Fixed(Vec<PageEnvelope>);

impl PageFetcher for Fixed {
    fn fetch_page(&self, index: u32) -> Result<PageEnvelope, SourceError> {
        Ok(self
            .0
            .get(index as usize)
            .cloned()
            .unwrap_or_else(|| PageEnvelope::ok(vec![], 0)))
    }
}

struct Down;

impl PageFetcher for Down {
    fn fetch_page(&self, _index: u32) -> Result<PageEnvelope, SourceError> {
        Err(SourceError::Transport {
            url: "https://directory.invalid".into(),
            message: "connection refused".into(),
        })
    }
}

fn row(id: &str, status: &str) -> Value {
    json!({ "empId": id, "jobStatus": status, "depCode": "D01", "ofcExt": "" })
}

#[test]
fn loads_and_normalizes_every_page() {
    let fetcher = Fixed(vec![
        PageEnvelope::ok(vec![row("1", "在職"), row("2", "在職")], 3),
        PageEnvelope::ok(vec![row("3", "留職停薪")], 3),
    ]);
    let snapshot = ApiLoader::new(fetcher, Normalizer::default(), 100)
        .load()
        .expect("load");

    assert_eq!(snapshot.len(), 3);
    let third = snapshot.get(&"3".into()).expect("record 3");
    assert_eq!(third.get("job_status").and_then(|v| v.as_text()), Some("留職停薪"));
    assert!(third.get("ofc_ext").map_or(false, |v| v.is_null()));
}

#[test]
fn duplicate_ids_keep_the_last_row() {
    let fetcher = Fixed(vec![PageEnvelope::ok(
        vec![row("1", "old"), row("2", "x"), row("1", "new")],
        3,
    )]);
    let snapshot = ApiLoader::new(fetcher, Normalizer::default(), 100)
        .load()
        .expect("load");

    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.duplicates(), 1);
    let first = snapshot.get(&"1".into()).expect("record 1");
    assert_eq!(first.get("job_status").and_then(|v| v.as_text()), Some("new"));
}

#[test]
fn reject_policy_rejects_rows_with_unknown_columns() {
    let fetcher = Fixed(vec![PageEnvelope::ok(
        vec![row("1", "在職"), json!({ "empId": "2", "surprise": true })],
        2,
    )]);
    let normalizer = Normalizer::new(Schema::employee_directory(), UnknownFieldPolicy::Reject);
    let snapshot = ApiLoader::new(fetcher, normalizer, 100).load().expect("load");

    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.rejected().len(), 1);
    assert_eq!(snapshot.rejected()[0].id.as_ref().map(|id| id.as_str()), Some("2"));
}

#[rstest]
#[case::transport(Box::new(Down) as Box<dyn PageFetcher>)]
#[case::api_status(Box::new(Fixed(vec![PageEnvelope::new(json!({ "status": 401, "message": "token expired" }))])) as Box<dyn PageFetcher>)]
fn source_failures_are_errors(#[case] fetcher: Box<dyn PageFetcher>) {
    let loader = ApiLoader::new(fetcher.as_ref(), Normalizer::default(), 100);
    assert!(loader.load().is_err());
}

#[test]
fn api_loader_fills_the_cache() {
    let tmp = TempDir::new().expect("tempdir");
    let cache = PageCache::new(tmp.path().join("pages"));
    let fetcher = Fixed(vec![PageEnvelope::ok(vec![row("1", "在職")], 1)]);

    ApiLoader::new(fetcher, Normalizer::default(), 100)
        .with_cache(cache.clone())
        .load()
        .expect("load");

    assert!(cache.page_path(0).exists());
    assert!(cache.load_manifest().expect("manifest").map_or(false, |m| m.complete));
}
