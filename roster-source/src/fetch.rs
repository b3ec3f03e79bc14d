//! Page transport.
//!
//! [`PageFetcher`] is the seam between pagination and HTTP: the pager only
//! asks for page `n`, so tests can script pages without a server.

use std::time::Duration;

use serde_json::{Map, Value};

use roster_core::config::SourceConfig;

use crate::envelope::PageEnvelope;
use crate::error::SourceError;

/// Header carrying the directory API token.
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Fetches one zero-based page of the directory listing.
pub trait PageFetcher {
    fn fetch_page(&self, index: u32) -> Result<PageEnvelope, SourceError>;
}

impl<F: PageFetcher + ?Sized> PageFetcher for &F {
    fn fetch_page(&self, index: u32) -> Result<PageEnvelope, SourceError> {
        (**self).fetch_page(index)
    }
}

/// `POST`s the configured payload template with the page index filled in.
pub struct HttpPageFetcher {
    agent: ureq::Agent,
    url: String,
    headers: Vec<(String, String)>,
    payload: Map<String, Value>,
    page_index_field: String,
}

impl HttpPageFetcher {
    /// Build from config. `api_token`, when present, is sent verbatim as the
    /// `authorization` header.
    pub fn new(config: &SourceConfig, api_token: Option<&str>) -> Result<Self, SourceError> {
        let url = config
            .url
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or(SourceError::NotConfigured("source.url"))?;
        let payload = config
            .payload
            .as_object()
            .cloned()
            .ok_or(SourceError::NotConfigured("source.payload must be a mapping"))?;

        let mut headers: Vec<(String, String)> = config
            .headers
            .iter()
            .filter(|(k, _)| !k.eq_ignore_ascii_case(AUTHORIZATION_HEADER))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(token) = api_token {
            headers.push((AUTHORIZATION_HEADER.to_string(), token.to_string()));
        }

        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();

        Ok(Self {
            agent,
            url,
            headers,
            payload,
            page_index_field: config.page_index_field.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request body for page `index`.
    pub fn request_body(&self, index: u32) -> Value {
        let mut body = self.payload.clone();
        body.insert(self.page_index_field.clone(), Value::from(index));
        Value::Object(body)
    }
}

impl PageFetcher for HttpPageFetcher {
    fn fetch_page(&self, index: u32) -> Result<PageEnvelope, SourceError> {
        let mut request = self.agent.post(&self.url);
        for (name, value) in &self.headers {
            request = request.set(name, value);
        }

        let response = match request.send_json(self.request_body(index)) {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                return Err(SourceError::HttpStatus {
                    url: self.url.clone(),
                    status,
                })
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(SourceError::Transport {
                    url: self.url.clone(),
                    message: transport.to_string(),
                })
            }
        };

        let raw: Value = response.into_json().map_err(|e| SourceError::Decode {
            page: index,
            message: e.to_string(),
        })?;
        Ok(PageEnvelope::new(raw))
    }
}
