//! Declared column schema for the directory table.
//!
//! A [`Schema`] is an ordered set of [`FieldDescriptor`]s. Each descriptor
//! names a canonical (snake_case) column, the scalar kind the normalizer
//! coerces to, and an optional role. Exactly one `id` and one `job_status`
//! column are required; `display_name` and `department` are optional but
//! unique.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::types::{EmployeeRecord, FieldValue};

/// Scalar type a column is coerced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    /// `YYYY-MM-DD`; anything from the first `T` onwards is cut.
    Date,
    Flag,
    Integer,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Text => write!(f, "text"),
            FieldKind::Date => write!(f, "date"),
            FieldKind::Flag => write!(f, "flag"),
            FieldKind::Integer => write!(f, "integer"),
        }
    }
}

/// Semantic role of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldRole {
    Id,
    DisplayName,
    Department,
    JobStatus,
    #[default]
    Attribute,
}

impl fmt::Display for FieldRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRole::Id => write!(f, "id"),
            FieldRole::DisplayName => write!(f, "display_name"),
            FieldRole::Department => write!(f, "department"),
            FieldRole::JobStatus => write!(f, "job_status"),
            FieldRole::Attribute => write!(f, "attribute"),
        }
    }
}

/// One declared column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub column: String,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "is_attribute")]
    pub role: FieldRole,
}

fn is_attribute(role: &FieldRole) -> bool {
    *role == FieldRole::Attribute
}

impl FieldDescriptor {
    pub fn new(column: &str, kind: FieldKind, role: FieldRole) -> Self {
        Self {
            column: column.to_owned(),
            kind,
            role,
        }
    }

    pub fn text(column: &str) -> Self {
        Self::new(column, FieldKind::Text, FieldRole::Attribute)
    }
}

/// Ordered, validated column set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FieldDescriptor>", into = "Vec<FieldDescriptor>")]
pub struct Schema {
    fields: Vec<FieldDescriptor>,
    id: usize,
    job_status: usize,
}

impl Schema {
    /// Validate and build a schema.
    pub fn new(fields: Vec<FieldDescriptor>) -> Result<Self, SchemaError> {
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.column.as_str()) {
                return Err(SchemaError::DuplicateColumn(field.column.clone()));
            }
        }

        for role in [FieldRole::DisplayName, FieldRole::Department] {
            if fields.iter().filter(|f| f.role == role).count() > 1 {
                return Err(SchemaError::DuplicateRole(role));
            }
        }

        let id = unique_role(&fields, FieldRole::Id)?;
        let job_status = unique_role(&fields, FieldRole::JobStatus)?;

        let id_field = &fields[id];
        if id_field.kind != FieldKind::Text {
            return Err(SchemaError::IdNotText {
                column: id_field.column.clone(),
                kind: id_field.kind,
            });
        }

        Ok(Self {
            fields,
            id,
            job_status,
        })
    }

    /// The employee directory table: twenty columns keyed by `emp_id`.
    pub fn employee_directory() -> Self {
        use FieldKind::{Date, Flag, Text};
        use FieldRole::{Attribute, Department, DisplayName, Id, JobStatus};

        let fields = vec![
            FieldDescriptor::new("emp_id", Text, Id),
            FieldDescriptor::new("c_name", Text, DisplayName),
            FieldDescriptor::text("e_name"),
            FieldDescriptor::new("dep_code", Text, Department),
            FieldDescriptor::new("job_status", Text, JobStatus),
            FieldDescriptor::text("encrypt_emp_id"),
            FieldDescriptor::text("per_seril_no"),
            FieldDescriptor::text("encrypt_per_seril_no"),
            FieldDescriptor::text("tit_name"),
            FieldDescriptor::text("dep_name_act"),
            FieldDescriptor::text("ofc_ext"),
            FieldDescriptor::text("introduction"),
            FieldDescriptor::new("cmp_ent_dte", Date, Attribute),
            FieldDescriptor::new("lev_exp_sdate", Date, Attribute),
            FieldDescriptor::text("user_id"),
            FieldDescriptor::new("is_show_private_data", Flag, Attribute),
            FieldDescriptor::text("photo_type"),
            FieldDescriptor::new("is_show_download_photo", Flag, Attribute),
            FieldDescriptor::text("cmp_code"),
            FieldDescriptor::text("created_at"),
        ];
        Self {
            fields,
            id: 0,
            job_status: 4,
        }
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn get(&self, column: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.column == column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn id_column(&self) -> &str {
        &self.fields[self.id].column
    }

    pub fn job_status_column(&self) -> &str {
        &self.fields[self.job_status].column
    }

    /// Column carrying `role`, if the schema declares one.
    pub fn column_for(&self, role: FieldRole) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.role == role)
            .map(|f| f.column.as_str())
    }

    /// Value of the column carrying `role` in `record`.
    pub fn value_of<'r>(&self, record: &'r EmployeeRecord, role: FieldRole) -> Option<&'r FieldValue> {
        self.column_for(role).and_then(|c| record.get(c))
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::employee_directory()
    }
}

impl TryFrom<Vec<FieldDescriptor>> for Schema {
    type Error = SchemaError;

    fn try_from(fields: Vec<FieldDescriptor>) -> Result<Self, Self::Error> {
        Schema::new(fields)
    }
}

impl From<Schema> for Vec<FieldDescriptor> {
    fn from(schema: Schema) -> Self {
        schema.fields
    }
}

fn unique_role(fields: &[FieldDescriptor], role: FieldRole) -> Result<usize, SchemaError> {
    let mut matches = fields
        .iter()
        .enumerate()
        .filter(|(_, f)| f.role == role)
        .map(|(i, _)| i);
    let first = matches.next().ok_or(SchemaError::MissingRole(role))?;
    if matches.next().is_some() {
        return Err(SchemaError::DuplicateRole(role));
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_schema_passes_validation() {
        let builtin = Schema::employee_directory();
        let validated = Schema::new(builtin.fields().to_vec()).expect("valid");
        assert_eq!(validated, builtin);
        assert_eq!(builtin.fields().len(), 20);
        assert_eq!(builtin.id_column(), "emp_id");
        assert_eq!(builtin.job_status_column(), "job_status");
        assert_eq!(builtin.column_for(FieldRole::Department), Some("dep_code"));
    }

    #[test]
    fn missing_id_role_is_rejected() {
        let err = Schema::new(vec![FieldDescriptor::new(
            "job_status",
            FieldKind::Text,
            FieldRole::JobStatus,
        )])
        .unwrap_err();
        assert_eq!(err, SchemaError::MissingRole(FieldRole::Id));
    }

    #[test]
    fn duplicate_column_is_rejected() {
        let err = Schema::new(vec![
            FieldDescriptor::new("id", FieldKind::Text, FieldRole::Id),
            FieldDescriptor::new("status", FieldKind::Text, FieldRole::JobStatus),
            FieldDescriptor::text("status"),
        ])
        .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateColumn("status".into()));
    }

    #[test]
    fn non_text_id_is_rejected() {
        let err = Schema::new(vec![
            FieldDescriptor::new("id", FieldKind::Integer, FieldRole::Id),
            FieldDescriptor::new("status", FieldKind::Text, FieldRole::JobStatus),
        ])
        .unwrap_err();
        assert!(matches!(err, SchemaError::IdNotText { .. }));
    }

    #[test]
    fn yaml_roundtrip_validates() {
        let yaml = serde_yaml::to_string(&Schema::employee_directory()).expect("serialize");
        let back: Schema = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(back, Schema::employee_directory());

        let bad = "- column: name\n  kind: text\n";
        assert!(serde_yaml::from_str::<Schema>(bad).is_err());
    }
}
