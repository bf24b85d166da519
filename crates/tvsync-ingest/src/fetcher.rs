//! Remote fetcher
//!
//! One `GET {base_url}{id}?api_key=..&language=..` per identifier. Every
//! call ends in exactly one [`FetchOutcome`] and one log line; nothing is
//! retried and nothing here aborts a run.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::ApiConfig;
use crate::types::Record;

/// Longest slice of an unexpected body echoed into the log
const BODY_PREVIEW_CHARS: usize = 120;

/// Classified result of fetching a single id
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The API returned a JSON object
    Found(Record),
    /// The request succeeded but the body was not an object
    NoData,
    /// Network error, timeout or non-2xx status
    Failed(String),
}

impl FetchOutcome {
    pub fn into_record(self) -> Option<Record> {
        match self {
            FetchOutcome::Found(record) => Some(record),
            FetchOutcome::NoData | FetchOutcome::Failed(_) => None,
        }
    }
}

/// Source of records, one id at a time
#[async_trait]
pub trait RecordFetcher: Send + Sync {
    async fn fetch(&self, id: i64) -> FetchOutcome;
}

/// Fetcher talking to the remote HTTP API
pub struct HttpFetcher {
    client: Client,
    base_url: String,
    api_key: String,
    language: String,
}

impl HttpFetcher {
    pub fn new(config: &ApiConfig) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            language: config.language.clone(),
        })
    }

    /// Endpoint for `id`, without the query string
    pub fn endpoint(&self, id: i64) -> String {
        format!("{}{}", self.base_url, id)
    }

    async fn get_body(&self, id: i64) -> reqwest::Result<String> {
        self.client
            .get(self.endpoint(id))
            .query(&[("api_key", self.api_key.as_str()), ("language", self.language.as_str())])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

#[async_trait]
impl RecordFetcher for HttpFetcher {
    async fn fetch(&self, id: i64) -> FetchOutcome {
        match self.get_body(id).await {
            Ok(body) => classify_body(id, &body),
            Err(e) => {
                // reqwest errors carry the URL, which includes the api key
                let error = e.without_url().to_string();
                warn!(id, error = %error, "Error fetching data for ID {}", id);
                FetchOutcome::Failed(error)
            },
        }
    }
}

/// Turn a successful response body into an outcome
///
/// Only a JSON object becomes a record; an empty body, a scalar, `null`, an
/// array or text that is not JSON at all means there is no data for `id`.
pub fn classify_body(id: i64, body: &str) -> FetchOutcome {
    let payload = serde_json::from_str::<Value>(body.trim()).ok();

    match payload.and_then(|value| Record::from_payload(id, value)) {
        Some(record) => {
            info!(id, "Data fetched for ID {}", id);
            FetchOutcome::Found(record)
        },
        None => {
            warn!(id, body = %preview(body), "Unexpected response data for ID {}", id);
            FetchOutcome::NoData
        },
    }
}

fn preview(body: &str) -> String {
    let mut preview: String = body.chars().take(BODY_PREVIEW_CHARS).collect();
    if body.chars().count() > BODY_PREVIEW_CHARS {
        preview.push_str("...");
    }
    preview
}
