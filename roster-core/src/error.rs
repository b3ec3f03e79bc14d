//! Error types for roster-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::schema::{FieldKind, FieldRole};

/// Reasons a single raw API row cannot become an [`crate::EmployeeRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// The raw row was not a JSON object.
    #[error("row is not a JSON object (found {found})")]
    NotAnObject { found: &'static str },

    /// The id column was absent, null, or empty.
    #[error("missing or empty id column '{column}'")]
    MissingId { column: String },

    /// A column outside the declared schema, under the `reject` policy.
    #[error("unknown column '{column}'")]
    UnknownField { column: String },

    /// A value whose JSON type cannot be coerced to the declared kind.
    #[error("column '{column}' expects {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: FieldKind,
        found: &'static str,
    },
}

/// Problems with a declared schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("column '{0}' is declared more than once")]
    DuplicateColumn(String),

    #[error("schema has no {0} column")]
    MissingRole(FieldRole),

    #[error("schema declares more than one {0} column")]
    DuplicateRole(FieldRole),

    #[error("id column '{column}' must be text, not {kind}")]
    IdNotText { column: String, kind: FieldKind },
}

/// All errors that can arise from configuration loading and saving.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The config file did not exist at the expected path.
    #[error("config not found at {path}; run `roster init` first")]
    NotFound { path: PathBuf },

    /// A value that parsed but is out of range.
    #[error("invalid config value for {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

/// Convenience constructor for [`ConfigError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
