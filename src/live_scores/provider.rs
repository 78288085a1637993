use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::models::{DateLabel, Match};

/// Why a single provider request produced no usable data.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("rate limit hit (HTTP 429)")]
    RateLimited,

    #[error("provider rejected the API key (HTTP {0})")]
    Unauthorized(u16),

    #[error("provider returned HTTP {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode provider response: {0}")]
    Decode(String),

    #[error("{0} has no such endpoint")]
    Unsupported(&'static str),
}

/// Trait that every upstream scores provider must implement.
///
/// Fetch methods return raw provider records; [`ScoreProvider::normalize`]
/// turns one record into a [`Match`] and never fails.
#[async_trait]
pub trait ScoreProvider: Send + Sync {
    /// Records the provider considers in play right now.
    async fn fetch_live(&self) -> Result<Vec<Value>, FetchError>;

    /// All fixtures scheduled on the given calendar day.
    async fn fetch_schedule(&self, date: NaiveDate) -> Result<Vec<Value>, FetchError>;

    /// Raw statistics payload for one fixture.
    async fn fetch_stats(&self, match_id: &str) -> Result<Value, FetchError>;

    /// Map one raw record to the internal shape.
    fn normalize(&self, raw: &Value, label: DateLabel, now: DateTime<Utc>) -> Match;

    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Upstream host, surfaced on `/health`.
    fn host(&self) -> &str;
}

/// Issue a GET and decode the body as JSON, mapping the status codes the
/// refresh engine reacts to.
pub async fn get_json(
    http: &Client,
    url: &str,
    headers: &[(&str, &str)],
) -> Result<Value, FetchError> {
    debug!("GET {}", url);

    let mut req = http.get(url);
    for (name, value) in headers {
        req = req.header(*name, *value);
    }
    let resp = req.send().await?;

    match resp.status() {
        StatusCode::TOO_MANY_REQUESTS => return Err(FetchError::RateLimited),
        s @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
            return Err(FetchError::Unauthorized(s.as_u16()))
        }
        s if !s.is_success() => return Err(FetchError::Status(s.as_u16())),
        _ => {}
    }

    resp.json::<Value>()
        .await
        .map_err(|e| FetchError::Decode(e.to_string()))
}

/// Pull an array of records out of `raw[key]`; a missing or non-array field
/// means "no records", not an error.
pub fn records_at(raw: &Value, key: &str) -> Vec<Value> {
    match raw.get(key).and_then(Value::as_array) {
        Some(items) => items.clone(),
        None => Vec::new(),
    }
}

pub fn build_http_client(timeout: std::time::Duration) -> anyhow::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}
