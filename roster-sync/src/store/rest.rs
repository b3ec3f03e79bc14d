//! PostgREST (Supabase) table over HTTP.
//!
//! | Operation           | Request                                                            |
//! |---------------------|--------------------------------------------------------------------|
//! | list ids            | `GET  /rest/v1/<table>?select=<id>&order=<id>.asc&limit=&offset=`, until an empty page |
//! | upsert              | `POST /rest/v1/<table>?on_conflict=<id>` (merge-duplicates)        |
//! | mark departed       | `PATCH /rest/v1/<table>?<id>=eq.<value>` (return=representation)   |
//!
//! HTTP 400/409/422 are the server refusing the data; every other failure
//! means the store is unavailable.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use roster_core::config::{Secrets, StoreConfig};
use roster_core::{EmployeeId, EmployeeRecord, FieldValue, LAST_UPDATED_COLUMN};

use super::{batch_columns, timestamp_text, DirectoryStore, StoreError, TableLayout, WriteResult};

const BACKEND: &str = "rest";
const PREFER_UPSERT: &str = "resolution=merge-duplicates,return=minimal";
const PREFER_REPRESENTATION: &str = "return=representation";

pub struct RestStore {
    agent: ureq::Agent,
    table_url: String,
    api_key: Option<String>,
    layout: TableLayout,
    page_size: usize,
}

impl RestStore {
    /// `ROSTER_STORE_URL` wins over `store.url`; `ROSTER_STORE_KEY` is sent
    /// as both `apikey` and bearer token.
    pub fn new(
        config: &StoreConfig,
        secrets: &Secrets,
        layout: TableLayout,
    ) -> Result<Self, StoreError> {
        let base = secrets
            .store_url
            .as_deref()
            .or(config.url.as_deref())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| StoreError::unavailable(BACKEND, "store.url is not set"))?;

        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();

        Ok(Self {
            agent,
            table_url: format!("{}/rest/v1/{}", base.trim_end_matches('/'), config.table),
            api_key: secrets.store_key.clone(),
            layout,
            page_size: config.page_size.max(1),
        })
    }

    pub fn table_url(&self) -> &str {
        &self.table_url
    }

    fn request(&self, method: &str) -> ureq::Request {
        let mut request = self
            .agent
            .request(method, &self.table_url)
            .set("Accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request
                .set("apikey", key)
                .set("Authorization", &format!("Bearer {key}"));
        }
        request
    }

    fn read_rows(&self, response: ureq::Response) -> Result<Vec<Value>, StoreError> {
        response
            .into_json::<Vec<Value>>()
            .map_err(|e| StoreError::unavailable(BACKEND, format!("unexpected response body: {e}")))
    }

    fn row_id(&self, row: &Value) -> Option<EmployeeId> {
        match row.get(&self.layout.id_column)? {
            Value::String(s) if !s.is_empty() => Some(EmployeeId::from(s.as_str())),
            Value::Number(n) => Some(EmployeeId::from(n.to_string())),
            _ => None,
        }
    }
}

impl DirectoryStore for RestStore {
    fn list_existing_ids(&self) -> Result<BTreeSet<EmployeeId>, StoreError> {
        let id = &self.layout.id_column;
        let order = format!("{id}.asc");
        let limit = self.page_size.to_string();
        let mut ids = BTreeSet::new();
        let mut offset = 0usize;

        loop {
            let response = self
                .request("GET")
                .query("select", id)
                .query("order", &order)
                .query("limit", &limit)
                .query("offset", &offset.to_string())
                .call()
                .map_err(map_ureq_error)?;
            let rows = self.read_rows(response)?;
            let received = rows.len();
            // Pages may be capped below `limit` by `max-rows`; only an empty page ends.
            if received == 0 {
                break;
            }
            for row in &rows {
                let row_id = self.row_id(row).ok_or_else(|| {
                    StoreError::unavailable(BACKEND, format!("row without {id}: {row}"))
                })?;
                ids.insert(row_id);
            }
            tracing::debug!(offset, received, "listed stored ids");
            offset += received;
        }
        Ok(ids)
    }

    fn upsert_batch(&self, records: &[EmployeeRecord]) -> Result<WriteResult, StoreError> {
        if records.is_empty() {
            return Ok(WriteResult { rows: 0 });
        }
        self.request("POST")
            .query("on_conflict", &self.layout.id_column)
            .set("Prefer", PREFER_UPSERT)
            .send_json(Value::Array(uniform_rows(records)))
            .map_err(map_ureq_error)?;
        Ok(WriteResult {
            rows: records.len(),
        })
    }

    fn mark_departed(
        &self,
        id: &EmployeeId,
        status: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut body = Map::new();
        body.insert(self.layout.job_status_column.clone(), Value::from(status));
        body.insert(LAST_UPDATED_COLUMN.to_string(), Value::from(timestamp_text(at)));

        let response = self
            .request("PATCH")
            .query(&self.layout.id_column, &format!("eq.{id}"))
            .set("Prefer", PREFER_REPRESENTATION)
            .send_json(Value::Object(body))
            .map_err(map_ureq_error)?;
        Ok(!self.read_rows(response)?.is_empty())
    }
}

/// Bulk inserts need identical keys on every object; absent columns are
/// sent as `null`.
fn uniform_rows(records: &[EmployeeRecord]) -> Vec<Value> {
    let columns = batch_columns(records);

    records
        .iter()
        .map(|record| {
            let row: Map<String, Value> = columns
                .iter()
                .map(|c| (c.to_string(), json_value(record.columns.get(*c))))
                .collect();
            Value::Object(row)
        })
        .collect()
}

fn json_value(value: Option<&FieldValue>) -> Value {
    match value {
        None | Some(FieldValue::Null) => Value::Null,
        Some(FieldValue::Flag(b)) => Value::Bool(*b),
        Some(FieldValue::Integer(n)) => Value::from(*n),
        Some(FieldValue::Text(s)) => Value::String(s.clone()),
    }
}

fn map_ureq_error(err: ureq::Error) -> StoreError {
    match err {
        ureq::Error::Status(status, response) => {
            let body = response.into_string().unwrap_or_default();
            match status {
                400 | 409 | 422 => StoreError::constraint(BACKEND, format!("HTTP {status}: {body}")),
                _ => StoreError::unavailable(BACKEND, format!("HTTP {status}: {body}")),
            }
        }
        ureq::Error::Transport(transport) => StoreError::unavailable(BACKEND, transport.to_string()),
    }
}
