//! Raw API row → canonical [`EmployeeRecord`].
//!
//! Steps applied to every row, in order:
//!
//! 1. Rename each key with [`normalize_key`] (camelCase → snake_case).
//! 2. Drop or reject keys the [`Schema`] does not declare.
//! 3. Turn `""` into `null`.
//! 4. Coerce each value to its declared [`FieldKind`].
//! 5. Require a non-empty id.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::NormalizeError;
use crate::schema::{FieldDescriptor, FieldKind, Schema};
use crate::types::{EmployeeId, EmployeeRecord, FieldValue, RejectedRecord, SourceSnapshot};

/// What to do with source columns the schema does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnknownFieldPolicy {
    /// Discard the column and keep the record.
    #[default]
    Drop,
    /// Reject the whole record.
    Reject,
}

// ---------------------------------------------------------------------------
// Key normalization
// ---------------------------------------------------------------------------

/// Convert a camelCase API key into its snake_case column name.
///
/// Two passes, then lowercase:
/// - `_` before every `Upper lower+` run that follows some character
///   (`cmpEntDte` → `cmp_Ent_Dte`), scanning left to right without overlap;
/// - `_` between a lowercase letter or digit and an uppercase letter
///   (`userID` → `user_ID`).
pub fn normalize_key(raw: &str) -> String {
    split_word_runs(&split_case_boundaries_pass_one(raw)).to_lowercase()
}

fn split_case_boundaries_pass_one(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len() + 4);
    let mut i = 0;
    while i < chars.len() {
        let run_starts = i + 2 < chars.len()
            && chars[i] != '\n'
            && chars[i + 1].is_ascii_uppercase()
            && chars[i + 2].is_ascii_lowercase();
        if run_starts {
            let mut end = i + 3;
            while end < chars.len() && chars[end].is_ascii_lowercase() {
                end += 1;
            }
            out.push(chars[i]);
            out.push('_');
            out.extend(&chars[i + 1..end]);
            i = end;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

fn split_word_runs(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);
    let mut i = 0;
    while i < chars.len() {
        let boundary = i + 1 < chars.len()
            && (chars[i].is_ascii_lowercase() || chars[i].is_ascii_digit())
            && chars[i + 1].is_ascii_uppercase();
        if boundary {
            out.push(chars[i]);
            out.push('_');
            out.push(chars[i + 1]);
            i += 2;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Stateless row normalizer bound to a schema.
#[derive(Debug, Clone)]
pub struct Normalizer {
    schema: Schema,
    unknown_fields: UnknownFieldPolicy,
}

impl Normalizer {
    pub fn new(schema: Schema, unknown_fields: UnknownFieldPolicy) -> Self {
        Self {
            schema,
            unknown_fields,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Normalize one raw row.
    pub fn normalize(&self, raw: &Value) -> Result<EmployeeRecord, NormalizeError> {
        self.normalize_collecting(raw, &mut BTreeSet::new())
    }

    /// Normalize a whole source listing into a snapshot.
    ///
    /// Never fails: rows that cannot be normalized are kept as
    /// [`RejectedRecord`]s on the snapshot.
    pub fn normalize_all<I>(&self, rows: I) -> SourceSnapshot
    where
        I: IntoIterator<Item = Value>,
    {
        let mut records = Vec::new();
        let mut rejected = Vec::new();
        let mut unknown = BTreeSet::new();

        for (index, raw) in rows.into_iter().enumerate() {
            match self.normalize_collecting(&raw, &mut unknown) {
                Ok(record) => records.push(record),
                Err(err) => rejected.push(RejectedRecord {
                    index,
                    id: self.raw_id(&raw),
                    reason: err.to_string(),
                }),
            }
        }

        SourceSnapshot::from_records(records)
            .with_rejected(rejected)
            .with_unknown_columns(unknown)
    }

    fn normalize_collecting(
        &self,
        raw: &Value,
        unknown: &mut BTreeSet<String>,
    ) -> Result<EmployeeRecord, NormalizeError> {
        let object = raw.as_object().ok_or(NormalizeError::NotAnObject {
            found: json_type(raw),
        })?;

        let mut columns = BTreeMap::new();
        for (key, value) in object {
            let column = normalize_key(key);
            let Some(descriptor) = self.schema.get(&column) else {
                match self.unknown_fields {
                    UnknownFieldPolicy::Drop => {
                        unknown.insert(column);
                        continue;
                    }
                    UnknownFieldPolicy::Reject => {
                        return Err(NormalizeError::UnknownField { column });
                    }
                }
            };
            columns.insert(column, coerce(descriptor, value)?);
        }

        let id_column = self.schema.id_column();
        let id = match columns.get(id_column) {
            Some(FieldValue::Text(id)) if !id.is_empty() => EmployeeId::from(id.as_str()),
            _ => {
                return Err(NormalizeError::MissingId {
                    column: id_column.to_owned(),
                })
            }
        };

        Ok(EmployeeRecord { id, columns })
    }

    fn raw_id(&self, raw: &Value) -> Option<EmployeeId> {
        let id_column = self.schema.id_column();
        raw.as_object()?
            .iter()
            .find(|(key, _)| normalize_key(key) == id_column)
            .and_then(|(_, value)| match value {
                Value::String(s) if !s.is_empty() => Some(EmployeeId::from(s.as_str())),
                Value::Number(n) => Some(EmployeeId::from(n.to_string())),
                _ => None,
            })
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(Schema::employee_directory(), UnknownFieldPolicy::Drop)
    }
}

fn coerce(descriptor: &FieldDescriptor, value: &Value) -> Result<FieldValue, NormalizeError> {
    let mismatch = || NormalizeError::TypeMismatch {
        column: descriptor.column.clone(),
        expected: descriptor.kind,
        found: json_type(value),
    };

    match value {
        Value::Null => return Ok(FieldValue::Null),
        Value::String(s) if s.is_empty() => return Ok(FieldValue::Null),
        Value::Array(_) | Value::Object(_) => return Err(mismatch()),
        _ => {}
    }

    match descriptor.kind {
        FieldKind::Text => match value {
            Value::String(s) => Ok(FieldValue::Text(s.clone())),
            Value::Number(n) => Ok(FieldValue::Text(n.to_string())),
            _ => Err(mismatch()),
        },
        FieldKind::Date => match value {
            Value::String(s) => Ok(truncate_date(s)),
            // Unparseable dates are blanked rather than rejected.
            _ => Ok(FieldValue::Null),
        },
        FieldKind::Flag => match value {
            Value::Bool(b) => Ok(FieldValue::Flag(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Ok(FieldValue::Flag(false)),
                Some(1) => Ok(FieldValue::Flag(true)),
                _ => Err(mismatch()),
            },
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "y" | "1" => Ok(FieldValue::Flag(true)),
                "false" | "n" | "0" => Ok(FieldValue::Flag(false)),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        },
        FieldKind::Integer => match value {
            Value::Number(n) => n.as_i64().map(FieldValue::Integer).ok_or_else(mismatch),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
    }
}

fn truncate_date(s: &str) -> FieldValue {
    match s.split('T').next() {
        Some(date) if !date.is_empty() => FieldValue::Text(date.to_owned()),
        _ => FieldValue::Null,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn first_pass_does_not_overlap_runs() {
        assert_eq!(split_case_boundaries_pass_one("ABcDe"), "A_BcDe");
        assert_eq!(normalize_key("ABcDe"), "a_bc_de");
    }

    #[test]
    fn empty_string_becomes_null_for_every_kind() {
        for kind in [FieldKind::Text, FieldKind::Date, FieldKind::Flag, FieldKind::Integer] {
            let d = FieldDescriptor::new("x", kind, Default::default());
            assert_eq!(coerce(&d, &json!("")).unwrap(), FieldValue::Null, "{kind}");
        }
    }

    #[test]
    fn date_without_time_is_kept() {
        assert_eq!(truncate_date("2021-03-04"), FieldValue::Text("2021-03-04".into()));
        assert_eq!(truncate_date("T12:00"), FieldValue::Null);
    }
}
