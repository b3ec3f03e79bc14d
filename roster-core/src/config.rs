//! Roster configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.roster/
//!   config.yaml     (this file — mode 0600)
//!   cache/          (default page cache)
//!   runs/           (run reports)
//!   table.json      (default table for the `file` store backend)
//! ```
//!
//! Every field has a default, so a partial `config.yaml` is valid. Secrets
//! are never read from or written to the file; see [`Secrets`].
//!
//! # API pattern
//!
//! Path helpers come in two forms, as the rest of the workspace does:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{io_err, ConfigError};
use crate::normalize::UnknownFieldPolicy;
use crate::schema::Schema;

pub const CONFIG_FILE: &str = "config.yaml";

/// Environment variable holding the directory API authorization header.
pub const ENV_API_TOKEN: &str = "ROSTER_API_TOKEN";
/// Environment variable holding the table store service key.
pub const ENV_STORE_KEY: &str = "ROSTER_STORE_KEY";
/// Environment variable overriding `store.url`.
pub const ENV_STORE_URL: &str = "ROSTER_STORE_URL";

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.roster/`
pub fn roster_root(home: &Path) -> PathBuf {
    home.join(".roster")
}

/// `<home>/.roster/config.yaml`
pub fn config_path_at(home: &Path) -> PathBuf {
    roster_root(home).join(CONFIG_FILE)
}

/// `<home>/.roster/cache/`
pub fn default_cache_dir_at(home: &Path) -> PathBuf {
    roster_root(home).join("cache")
}

/// `<home>/.roster/runs/`
pub fn runs_dir_at(home: &Path) -> PathBuf {
    roster_root(home).join("runs")
}

/// `<home>/.roster/table.json`
pub fn default_table_file_at(home: &Path) -> PathBuf {
    roster_root(home).join("table.json")
}

/// The current user's home directory.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// 2. Config sections
// ---------------------------------------------------------------------------

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RosterConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub schema: Schema,
}

/// Directory API endpoint and request template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Search endpoint; pages are requested with `POST`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Extra request headers (the authorization header comes from the env).
    #[serde(default = "default_headers")]
    pub headers: BTreeMap<String, String>,
    /// JSON body sent with every page request.
    #[serde(default = "default_payload")]
    pub payload: Value,
    /// Body field overwritten with the zero-based page number.
    #[serde(default = "default_page_index_field")]
    pub page_index_field: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Ceiling on pages fetched in one run.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: None,
            headers: default_headers(),
            payload: default_payload(),
            page_index_field: default_page_index_field(),
            timeout_secs: default_timeout_secs(),
            max_pages: default_max_pages(),
        }
    }
}

fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Accept".to_string(), "application/json, text/plain, */*".to_string()),
        ("Content-Type".to_string(), "application/json".to_string()),
    ])
}

fn default_payload() -> Value {
    json!({
        "isWork": true,
        "isDeparture": false,
        "dept": "",
        "employee": "",
        "ofcExt": "",
        "pageIndex": 0,
        "subordinates": [],
    })
}

fn default_page_index_field() -> String {
    "pageIndex".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_pages() -> u32 {
    10_000
}

/// Which table store backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// PostgREST / Supabase over HTTP.
    #[default]
    Rest,
    /// Local JSON table file.
    File,
}

/// Persisted table location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Project URL for the `rest` backend (overridden by `ROSTER_STORE_URL`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
    /// Rows requested per page when listing ids.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Table file for the `file` backend; defaults to `~/.roster/table.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: None,
            table: default_table(),
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
            file: None,
        }
    }
}

fn default_table() -> String {
    "employees".to_string()
}

fn default_page_size() -> usize {
    1000
}

/// Reconciliation run settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// `job_status` value written for employees missing from the source.
    #[serde(default = "default_departed_status")]
    pub departed_status: String,
    /// Parallel departure-marking workers.
    #[serde(default = "default_departure_workers")]
    pub departure_workers: usize,
    /// Split the upsert into chunks of at most this many rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upsert_chunk_size: Option<usize>,
    /// Abort when more than this fraction of stored rows would be departed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_departure_ratio: Option<f64>,
    /// Allow an empty source listing to depart the whole table.
    #[serde(default)]
    pub allow_empty_snapshot: bool,
    #[serde(default)]
    pub unknown_fields: UnknownFieldPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            departed_status: default_departed_status(),
            departure_workers: default_departure_workers(),
            upsert_chunk_size: None,
            max_departure_ratio: None,
            allow_empty_snapshot: false,
            unknown_fields: UnknownFieldPolicy::default(),
        }
    }
}

fn default_departed_status() -> String {
    "離職".to_string()
}

fn default_departure_workers() -> usize {
    4
}

/// Page cache location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CacheConfig {
    /// Defaults to `~/.roster/cache`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// 3. Load / save
// ---------------------------------------------------------------------------

impl RosterConfig {
    /// Load and validate `path`.
    ///
    /// Returns `ConfigError::NotFound` if absent, `ConfigError::Parse` (with
    /// path) if malformed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        let config: RosterConfig =
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `<home>/.roster/config.yaml`.
    pub fn load_at(home: &Path) -> Result<Self, ConfigError> {
        Self::load(&config_path_at(home))
    }

    /// Save atomically: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        let yaml = serde_yaml::to_string(self)?;
        let tmp = path.with_extension("yaml.tmp");
        std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
        set_file_permissions(&tmp)?;
        std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
        Ok(())
    }

    /// Reject values that parse but cannot drive a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.departure_workers == 0 {
            return Err(ConfigError::Invalid {
                field: "sync.departure_workers",
                message: "must be at least 1".into(),
            });
        }
        if self.sync.upsert_chunk_size == Some(0) {
            return Err(ConfigError::Invalid {
                field: "sync.upsert_chunk_size",
                message: "must be at least 1".into(),
            });
        }
        if let Some(ratio) = self.sync.max_departure_ratio {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(ConfigError::Invalid {
                    field: "sync.max_departure_ratio",
                    message: format!("{ratio} is outside 0.0..=1.0"),
                });
            }
        }
        if self.sync.departed_status.is_empty() {
            return Err(ConfigError::Invalid {
                field: "sync.departed_status",
                message: "must not be empty".into(),
            });
        }
        if self.store.page_size == 0 {
            return Err(ConfigError::Invalid {
                field: "store.page_size",
                message: "must be at least 1".into(),
            });
        }
        if !self.source.payload.is_object() {
            return Err(ConfigError::Invalid {
                field: "source.payload",
                message: "must be a mapping".into(),
            });
        }
        Ok(())
    }

    /// Effective page cache directory.
    pub fn cache_dir_at(&self, home: &Path) -> PathBuf {
        self.cache
            .dir
            .clone()
            .unwrap_or_else(|| default_cache_dir_at(home))
    }

    /// Effective table file for the `file` backend.
    pub fn table_file_at(&self, home: &Path) -> PathBuf {
        self.store
            .file
            .clone()
            .unwrap_or_else(|| default_table_file_at(home))
    }
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// 4. Secrets
// ---------------------------------------------------------------------------

/// Credentials and overrides taken from the environment.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secrets {
    pub api_token: Option<String>,
    pub store_key: Option<String>,
    pub store_url: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("store_key", &self.store_key.as_ref().map(|_| "<redacted>"))
            .field("store_url", &self.store_url)
            .finish()
    }
}

impl Secrets {
    /// Read from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read through `lookup`; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());
        Self {
            api_token: get(ENV_API_TOKEN),
            store_key: get(ENV_STORE_KEY),
            store_url: get(ENV_STORE_URL),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: RosterConfig = serde_yaml::from_str("{}").expect("parse");
        assert_eq!(config, RosterConfig::default());
        assert_eq!(config.sync.departed_status, "離職");
        assert_eq!(config.store.backend, StoreBackend::Rest);
        assert_eq!(config.schema.id_column(), "emp_id");
    }

    #[test]
    fn secrets_ignore_empty_values() {
        let secrets = Secrets::from_lookup(|name| match name {
            ENV_API_TOKEN => Some("token".into()),
            ENV_STORE_KEY => Some(String::new()),
            _ => None,
        });
        assert_eq!(secrets.api_token.as_deref(), Some("token"));
        assert!(secrets.store_key.is_none());
        assert!(secrets.store_url.is_none());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let secrets = Secrets {
            api_token: Some("super-secret".into()),
            store_key: Some("also-secret".into()),
            store_url: None,
        };
        let rendered = format!("{secrets:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("also-secret"));
    }

    #[test]
    fn ratio_out_of_range_is_invalid() {
        let mut config = RosterConfig::default();
        config.sync.max_departure_ratio = Some(1.5);
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "sync.max_departure_ratio",
                ..
            }
        ));
    }
}
