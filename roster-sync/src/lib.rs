//! # roster-sync
//!
//! Reconciliation of a source snapshot against the persisted directory table.
//!
//! [`reconcile`] computes the three partitions without I/O, [`apply`] drives
//! the upsert and departure phases against a [`DirectoryStore`], and
//! [`pipeline::run`] wires a loader, the safety guard and the engine together.

pub mod engine;
pub mod error;
pub mod pipeline;
pub mod plan;
pub mod report;
pub mod store;

pub use engine::{apply, ApplyOptions, DepartureFailure, DepartureOutcome, RunMode, RunSummary};
pub use error::SyncError;
pub use pipeline::SyncOptions;
pub use plan::{reconcile, PlanWarning, ReconciliationPlan};
pub use report::RunReport;
pub use store::{DirectoryStore, FileStore, MemoryStore, RestStore, StoreError, TableLayout, WriteResult};
