//! End-to-end runs: loader → guard → engine → store → report.

use std::collections::BTreeSet;

use roster_core::{EmployeeId, EmployeeRecord, FieldValue, Normalizer, SourceSnapshot};
use roster_source::{ApiLoader, PageEnvelope, PageFetcher, SnapshotLoader, SourceError};
use roster_sync::{
    pipeline, report, DirectoryStore, FileStore, MemoryStore, RunMode, SyncError, SyncOptions,
    TableLayout,
};
use rstest::rstest;
use serde_json::json;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Fixed(Vec<&'static str>);

impl SnapshotLoader for Fixed {
    fn load(&self) -> Result<SourceSnapshot, SourceError> {
        Ok(SourceSnapshot::from_records(
            self.0
                .iter()
                .map(|id| EmployeeRecord::new("emp_id", *id).with("job_status", "在職")),
        ))
    }
}

struct Outage;

impl SnapshotLoader for Outage {
    fn load(&self) -> Result<SourceSnapshot, SourceError> {
        Err(SourceError::Transport {
            url: "https://directory.invalid".into(),
            message: "dns failure".into(),
        })
    }
}

/// Raw API rows run through the default normalizer.
struct Raw(Vec<serde_json::Value>);

impl SnapshotLoader for Raw {
    fn load(&self) -> Result<SourceSnapshot, SourceError> {
        Ok(Normalizer::default().normalize_all(self.0.clone()))
    }
}

fn store(ids: &[&str]) -> MemoryStore {
    MemoryStore::with_records(
        TableLayout::default(),
        ids.iter()
            .map(|id| EmployeeRecord::new("emp_id", *id).with("job_status", "在職")),
    )
}

fn statuses(store: &MemoryStore) -> Vec<Option<String>> {
    store
        .records()
        .iter()
        .map(|r| r.get("job_status").and_then(FieldValue::as_text).map(str::to_owned))
        .collect()
}

// ---------------------------------------------------------------------------
// Guard
// ---------------------------------------------------------------------------

#[test]
fn empty_snapshot_is_refused_by_default() {
    let store = store(&["1", "2"]);
    let err = pipeline::run(&Fixed(vec![]), &store, &SyncOptions::default()).unwrap_err();
    assert!(matches!(err, SyncError::EmptySnapshot { persisted: 2 }), "got: {err}");
    assert!(statuses(&store).iter().all(|s| s.as_deref() == Some("在職")));
}

#[test]
fn empty_snapshot_can_be_allowed() {
    let store = store(&["1", "2"]);
    let options = SyncOptions {
        allow_empty_snapshot: true,
        ..SyncOptions::default()
    };
    let report = pipeline::run(&Fixed(vec![]), &store, &options).expect("run");
    assert_eq!(report.summary.departed, 2);
    assert!(statuses(&store).iter().all(|s| s.as_deref() == Some("離職")));
}

#[test]
fn empty_snapshot_against_empty_store_is_fine() {
    let store = MemoryStore::new(TableLayout::default());
    let report = pipeline::run(&Fixed(vec![]), &store, &SyncOptions::default()).expect("run");
    assert_eq!(report.summary.new, 0);
    assert!(report.warnings.is_empty());
}

#[rstest]
#[case(0.5, true)]
#[case(0.75, true)]
#[case(0.25, false)]
fn departure_ratio_guard(#[case] max_ratio: f64, #[case] allowed: bool) {
    // 2 of 4 departing: ratio 0.5
    let store = store(&["1", "2", "3", "4"]);
    let options = SyncOptions {
        max_departure_ratio: Some(max_ratio),
        ..SyncOptions::default()
    };
    let result = pipeline::run(&Fixed(vec!["1", "2"]), &store, &options);

    if allowed {
        assert_eq!(result.expect("run").summary.departed, 2);
    } else {
        let err = result.unwrap_err();
        assert!(matches!(err, SyncError::DepartureGuard { departing: 2, persisted: 4, .. }));
        assert!(statuses(&store).iter().all(|s| s.as_deref() == Some("在職")));
    }
}

// ---------------------------------------------------------------------------
// Fatal failures write nothing
// ---------------------------------------------------------------------------

// ---------------------------------------------------------------------------
// Rejected rows
// ---------------------------------------------------------------------------

#[test]
fn rejected_row_does_not_depart_a_listed_employee() {
    let store = store(&["1", "7"]);
    let loader = Raw(vec![
        json!({ "empId": "1", "jobStatus": "在職" }),
        json!({ "empId": "7", "isShowPrivateData": "2" }),
    ]);
    let report = pipeline::run(&loader, &store, &SyncOptions::default()).expect("run");

    assert!(report.departing.is_empty());
    assert_eq!(report.summary.departed, 0);
    assert_eq!(report.summary.held, vec![EmployeeId::from("7")]);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].id, Some(EmployeeId::from("7")));
    assert!(report.rejected[0].reason.contains("is_show_private_data"));
    assert_eq!(statuses(&store), vec![Some("在職".into()), Some("在職".into())]);
}

#[test]
fn source_outage_aborts_before_writes() {
    let store = store(&["1"]);
    let err = pipeline::run(&Outage, &store, &SyncOptions::default()).unwrap_err();
    assert!(matches!(err, SyncError::Source(_)));
    assert_eq!(statuses(&store), vec![Some("在職".to_string())]);
}

#[test]
fn api_error_page_aborts_before_writes() {
    struct Failing;
    impl PageFetcher for Failing {
        fn fetch_page(&self, index: u32) -> Result<PageEnvelope, SourceError> {
            Ok(match index {
                0 => PageEnvelope::ok(vec![json!({ "empId": "9" })], 5),
                _ => PageEnvelope::new(json!({ "status": 500, "message": "oops" })),
            })
        }
    }

    let store = store(&["1"]);
    let loader = ApiLoader::new(Failing, Normalizer::default(), 10);
    let err = pipeline::run(&loader, &store, &SyncOptions::default()).unwrap_err();
    assert!(matches!(err, SyncError::Source(SourceError::Api { .. })));
    assert_eq!(store.len(), 1);
}

#[test]
fn unreadable_store_aborts_before_writes() {
    let tmp = TempDir::new().expect("tmp");
    let path = tmp.path().join("table.json");
    std::fs::write(&path, "not json").expect("write");
    let store = FileStore::new(&path, TableLayout::default());

    let err = pipeline::run(&Fixed(vec!["1"]), &store, &SyncOptions::default()).unwrap_err();
    assert!(matches!(err, SyncError::Store(_)), "got: {err}");
    assert_eq!(std::fs::read_to_string(&path).expect("read"), "not json");
}

// ---------------------------------------------------------------------------
// File store + reports
// ---------------------------------------------------------------------------

#[test]
fn file_store_round_trip() {
    let home = TempDir::new().expect("home");
    let path = home.path().join(".roster").join("table.json");
    let store = FileStore::new(&path, TableLayout::default());

    let first = pipeline::run(&Fixed(vec!["1", "2", "3"]), &store, &SyncOptions::default())
        .expect("first run");
    assert_eq!(first.summary.new, 3);
    assert!(path.exists());

    let second = pipeline::run(&Fixed(vec!["2", "3", "4"]), &store, &SyncOptions::default())
        .expect("second run");
    assert_eq!(
        (second.summary.new, second.summary.updated, second.summary.departed),
        (1, 2, 1)
    );

    let reopened = FileStore::new(&path, TableLayout::default());
    let ids = reopened.list_existing_ids().expect("ids");
    let expected: BTreeSet<EmployeeId> = ["1", "2", "3", "4"].into_iter().map(EmployeeId::from).collect();
    assert_eq!(ids, expected);

    let rows = reopened.load().expect("rows");
    let one = &rows[&EmployeeId::from("1")];
    assert_eq!(one.get("job_status").and_then(FieldValue::as_text), Some("離職"));
}

#[test]
fn applied_report_is_saved_and_dry_run_is_not() {
    let home = TempDir::new().expect("home");
    let store = store(&["1"]);

    let dry = pipeline::run(
        &Fixed(vec!["1", "2"]),
        &store,
        &SyncOptions {
            dry_run: true,
            ..SyncOptions::default()
        },
    )
    .expect("dry run");
    assert_eq!(dry.summary.mode, RunMode::DryRun);
    assert!(report::save_at(home.path(), &dry).expect("save").is_none());
    assert!(report::load_last_at(home.path()).expect("load").is_none());

    let applied = pipeline::run(&Fixed(vec!["1", "2"]), &store, &SyncOptions::default())
        .expect("run");
    report::save_at(home.path(), &applied).expect("save");
    let last = report::load_last_at(home.path()).expect("load").expect("report");
    assert_eq!(last.summary.new, 1);
    assert_eq!(last.inserted, vec![EmployeeId::from("2")]);
}
