//! Roster core library — domain types, declared schema, normalizer, config.
//!
//! Public API surface:
//! - [`types`] — newtypes, records, and the per-run [`SourceSnapshot`]
//! - [`schema`] — ordered field descriptors for the directory table
//! - [`normalize`] — raw API row → [`EmployeeRecord`]
//! - [`config`] — `~/.roster/config.yaml` load / save and env secrets
//! - [`error`] — [`NormalizeError`], [`SchemaError`], [`ConfigError`]

pub mod config;
pub mod error;
pub mod normalize;
pub mod schema;
pub mod types;

pub use config::{RosterConfig, Secrets};
pub use error::{ConfigError, NormalizeError, SchemaError};
pub use normalize::{normalize_key, Normalizer, UnknownFieldPolicy};
pub use schema::{FieldDescriptor, FieldKind, FieldRole, Schema};
pub use types::{
    EmployeeId, EmployeeRecord, FieldValue, RejectedRecord, SourceSnapshot, LAST_UPDATED_COLUMN,
};
