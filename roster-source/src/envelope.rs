//! The directory API's page envelope.
//!
//! ```json
//! { "status": 200, "message": "ok", "data": { "rows": [ ... ], "total": 1234 } }
//! ```
//!
//! Pages are kept as raw JSON so the cache can store exactly what the server
//! sent; the accessors below read the fields the pager needs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SourceError;

const OK_STATUS: i64 = 200;

/// One raw page as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageEnvelope(Value);

impl PageEnvelope {
    pub fn new(raw: Value) -> Self {
        Self(raw)
    }

    /// Build a successful envelope; handy for fixtures.
    pub fn ok(rows: Vec<Value>, total: u64) -> Self {
        Self(serde_json::json!({
            "status": OK_STATUS,
            "message": "success",
            "data": { "rows": rows, "total": total },
        }))
    }

    pub fn raw(&self) -> &Value {
        &self.0
    }

    pub fn into_raw(self) -> Value {
        self.0
    }

    /// `Ok(())` when the envelope's `status` is 200.
    pub fn check_status(&self) -> Result<(), SourceError> {
        let status = self.0.get("status");
        if status.and_then(Value::as_i64) == Some(OK_STATUS) {
            return Ok(());
        }
        Err(SourceError::Api {
            status: status.map_or_else(|| "<missing>".to_string(), Value::to_string),
            message: self
                .0
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
        })
    }

    /// `data.rows`, or nothing when absent.
    pub fn rows(&self) -> &[Value] {
        self.0
            .get("data")
            .and_then(|d| d.get("rows"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Take `data.rows` out of the envelope.
    pub(crate) fn into_rows(self) -> Vec<Value> {
        let Value::Object(mut envelope) = self.0 else {
            return Vec::new();
        };
        match envelope.get_mut("data").and_then(|d| d.get_mut("rows")) {
            Some(Value::Array(rows)) => std::mem::take(rows),
            _ => Vec::new(),
        }
    }

    /// `data.total`, when present and a non-negative integer.
    pub fn total(&self) -> Option<u64> {
        self.0
            .get("data")
            .and_then(|d| d.get("total"))
            .and_then(Value::as_u64)
    }
}
