//! Domain types for the employee directory mirror.
//!
//! Records are keyed by [`EmployeeId`]; every other column is a nullable
//! scalar [`FieldValue`]. Empty strings never survive into a record — the
//! normalizer turns them into [`FieldValue::Null`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Column stamped on every written row with the run's start time.
pub const LAST_UPDATED_COLUMN: &str = "last_updated_at";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed employee identifier (the table's primary key).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmployeeId(pub String);

impl EmployeeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for EmployeeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EmployeeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Field values
// ---------------------------------------------------------------------------

/// A nullable scalar column value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Flag(bool),
    Integer(i64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Flag(b)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Integer(n)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One canonical employee row.
///
/// `columns` holds every schema column that was present in the source row,
/// the id column included, so a record can be written back as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeRecord {
    pub id: EmployeeId,
    pub columns: BTreeMap<String, FieldValue>,
}

impl EmployeeRecord {
    /// Build a record whose id column is `id_column`.
    pub fn new(id_column: &str, id: impl Into<EmployeeId>) -> Self {
        let id = id.into();
        let mut columns = BTreeMap::new();
        columns.insert(id_column.to_owned(), FieldValue::Text(id.0.clone()));
        Self { id, columns }
    }

    /// Builder-style column setter.
    pub fn with(mut self, column: &str, value: impl Into<FieldValue>) -> Self {
        self.set(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.columns.get(column)
    }

    pub fn set(&mut self, column: &str, value: impl Into<FieldValue>) {
        self.columns.insert(column.to_owned(), value.into());
    }
}

/// A source row the normalizer refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRecord {
    /// Position of the row in the loaded sequence.
    pub index: usize,
    /// Best-effort id, when the raw row carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<EmployeeId>,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The complete source state produced by one run.
///
/// Built once, read-only afterwards. Duplicate ids collapse last-seen-wins
/// while keeping the position of the first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSnapshot {
    records: Vec<EmployeeRecord>,
    rejected: Vec<RejectedRecord>,
    unknown_columns: BTreeSet<String>,
    duplicates: usize,
}

impl SourceSnapshot {
    pub fn from_records(records: impl IntoIterator<Item = EmployeeRecord>) -> Self {
        let mut out: Vec<EmployeeRecord> = Vec::new();
        let mut positions: HashMap<EmployeeId, usize> = HashMap::new();
        let mut duplicates = 0;
        for record in records {
            match positions.get(&record.id) {
                Some(&pos) => {
                    duplicates += 1;
                    out[pos] = record;
                }
                None => {
                    positions.insert(record.id.clone(), out.len());
                    out.push(record);
                }
            }
        }
        Self {
            records: out,
            rejected: Vec::new(),
            unknown_columns: BTreeSet::new(),
            duplicates,
        }
    }

    pub fn with_rejected(mut self, rejected: Vec<RejectedRecord>) -> Self {
        self.rejected = rejected;
        self
    }

    pub fn with_unknown_columns(mut self, columns: BTreeSet<String>) -> Self {
        self.unknown_columns = columns;
        self
    }

    pub fn records(&self) -> &[EmployeeRecord] {
        &self.records
    }

    pub fn rejected(&self) -> &[RejectedRecord] {
        &self.rejected
    }

    /// Columns present in the source but absent from the schema (dropped).
    pub fn unknown_columns(&self) -> &BTreeSet<String> {
        &self.unknown_columns
    }

    /// Number of rows that collapsed into an earlier row with the same id.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn ids(&self) -> BTreeSet<EmployeeId> {
        self.records.iter().map(|r| r.id.clone()).collect()
    }

    /// Ids of rejected rows that no accepted row in the listing carries.
    ///
    /// These employees are still present in the source, so they must never be
    /// treated as departed.
    pub fn rejected_ids(&self) -> BTreeSet<EmployeeId> {
        let accepted = self.ids();
        self.rejected
            .iter()
            .filter_map(|r| r.id.clone())
            .filter(|id| !accepted.contains(id))
            .collect()
    }

    pub fn get(&self, id: &EmployeeId) -> Option<&EmployeeRecord> {
        self.records.iter().find(|r| &r.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, name: &str) -> EmployeeRecord {
        EmployeeRecord::new("emp_id", id).with("c_name", name)
    }

    #[test]
    fn newtype_display() {
        assert_eq!(EmployeeId::from("E001").to_string(), "E001");
    }

    #[test]
    fn new_record_carries_id_column() {
        let r = rec("E001", "Alice");
        assert_eq!(r.get("emp_id"), Some(&FieldValue::Text("E001".into())));
        assert_eq!(r.get("c_name").and_then(FieldValue::as_text), Some("Alice"));
    }

    #[test]
    fn duplicate_ids_collapse_last_seen_wins() {
        let snap = SourceSnapshot::from_records(vec![
            rec("1", "first"),
            rec("2", "other"),
            rec("1", "second"),
        ]);
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.duplicates(), 1);
        assert_eq!(snap.records()[0].id, EmployeeId::from("1"));
        assert_eq!(
            snap.get(&EmployeeId::from("1"))
                .and_then(|r| r.get("c_name"))
                .and_then(FieldValue::as_text),
            Some("second")
        );
    }

    #[test]
    fn rejected_ids_skip_rows_accepted_elsewhere() {
        let rejected = |index, id: Option<&str>| RejectedRecord {
            index,
            id: id.map(EmployeeId::from),
            reason: "bad flag".into(),
        };
        let snap = SourceSnapshot::from_records(vec![rec("1", "ok")]).with_rejected(vec![
            rejected(1, Some("1")),
            rejected(2, Some("7")),
            rejected(3, None),
        ]);
        let expected: BTreeSet<EmployeeId> = [EmployeeId::from("7")].into_iter().collect();
        assert_eq!(snap.rejected_ids(), expected);
    }

    #[test]
    fn field_value_serializes_untagged() {
        let values = vec![
            FieldValue::Null,
            FieldValue::Flag(true),
            FieldValue::Integer(7),
            FieldValue::Text("x".into()),
        ];
        let json = serde_json::to_string(&values).expect("serialize");
        assert_eq!(json, r#"[null,true,7,"x"]"#);
        let back: Vec<FieldValue> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, values);
    }
}
