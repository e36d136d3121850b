//! Trade history retrieval from the Polymarket Data API.
//!
//! Each participant's recent activity is fetched from `/activity` and
//! validated into [`TradeRecord`]s on ingestion. Records with no usable
//! timestamp are dropped and counted rather than failing the page.
//!
//! [`collect_trades`] fans out one fetch per participant and merges the
//! results. A failed participant is logged and contributes nothing; it never
//! aborts the others.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::future::join_all;
use reqwest::Client;
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DataApiConfig;

/// Anything above this is a millisecond timestamp.
const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum RecordError {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("missing or invalid timestamp")]
    Timestamp,
    #[error("participant field is not a string")]
    Participant,
}

/// One executed trade. The replay engine only reads `participant` and
/// `timestamp`; the rest is carried for display.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub participant: String,
    /// Unix timestamp (seconds, UTC)
    pub timestamp: i64,
    pub side: Option<String>,
    pub size: Option<f64>,
    pub price: Option<f64>,
    pub title: Option<String>,
    pub activity_type: Option<String>,
    pub transaction_hash: Option<String>,
}

impl TradeRecord {
    /// Minimal record, mostly useful for tests and synthetic input.
    pub fn new(participant: impl Into<String>, timestamp: i64) -> Self {
        Self {
            participant: participant.into(),
            timestamp,
            side: None,
            size: None,
            price: None,
            title: None,
            activity_type: None,
            transaction_hash: None,
        }
    }

    /// Validate a raw activity object. `requested` is the participant the
    /// page was fetched for, used when the record does not name one.
    pub fn from_json(value: &Value, requested: &str) -> Result<Self, RecordError> {
        let obj = value.as_object().ok_or(RecordError::NotAnObject)?;

        let timestamp = json_timestamp(obj).ok_or(RecordError::Timestamp)?;
        // Out-of-range values cannot be bucketed into a calendar day.
        if DateTime::<Utc>::from_timestamp(timestamp, 0).is_none() {
            return Err(RecordError::Timestamp);
        }

        let participant = match first_present(obj, &["proxyWallet", "user", "participant", "address"]) {
            Some(Value::String(s)) => s.clone(),
            None => requested.to_string(),
            Some(_) => return Err(RecordError::Participant),
        };

        Ok(Self {
            participant,
            timestamp,
            side: json_str(obj, &["side"]),
            size: json_f64(obj, &["size", "amount"]),
            price: json_f64(obj, &["price"]),
            title: json_str(obj, &["title", "question", "marketTitle"]),
            activity_type: json_str(obj, &["type", "tradeType"]),
            transaction_hash: json_str(obj, &["transactionHash", "txHash"]),
        })
    }
}

/// First key holding a usable value; nulls and empty strings fall through
/// to the next key.
fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| match obj.get(*k) {
        Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        other => other,
    })
}

fn json_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    match first_present(obj, keys)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_f64(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    match first_present(obj, keys)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn normalize_epoch(i: i64) -> i64 {
    if i > MILLIS_THRESHOLD {
        i / 1000
    } else {
        i
    }
}

/// Extract a unix timestamp (seconds).
/// Handles: numeric seconds, numeric millis, ISO strings, numeric strings.
fn json_timestamp(obj: &Map<String, Value>) -> Option<i64> {
    match first_present(obj, &["timestamp", "createdAt", "created_at", "time"])? {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Some(normalize_epoch(i));
            }
            let f = n.as_f64()?;
            if !f.is_finite() {
                return None;
            }
            Some(normalize_epoch(f as i64))
        }
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.timestamp());
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.fZ") {
                return Some(dt.and_utc().timestamp());
            }
            s.parse::<i64>().ok().map(normalize_epoch)
        }
        _ => None,
    }
}

/// Parsed page plus the number of elements that failed validation.
#[derive(Debug, Default)]
pub struct ParsedPage {
    pub trades: Vec<TradeRecord>,
    pub skipped: usize,
}

/// Parse an activity response body. Accepts a bare array or an object
/// wrapping one under a well-known key. At most `limit` valid records are
/// kept; the rest of the page is ignored.
pub fn parse_activity(body: &str, requested: &str, limit: usize) -> Result<ParsedPage, FetchError> {
    let val: Value =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;

    let items = match &val {
        Value::Array(arr) => arr,
        Value::Object(obj) => ["data", "trades", "results", "items", "activity"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_array))
            .ok_or_else(|| FetchError::Malformed("object without a trade array".to_string()))?,
        other => {
            return Err(FetchError::Malformed(format!(
                "expected array, got {}",
                json_kind(other)
            )))
        }
    };

    let mut page = ParsedPage::default();
    for item in items {
        if page.trades.len() >= limit {
            break;
        }
        match TradeRecord::from_json(item, requested) {
            Ok(t) => page.trades.push(t),
            Err(e) => {
                debug!(participant = requested, error = %e, "skipping trade record");
                page.skipped += 1;
            }
        }
    }
    Ok(page)
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Source of a participant's recent trades.
#[async_trait]
pub trait TradeSource: Send + Sync {
    async fn fetch_recent_trades(&self, participant: &str) -> Result<Vec<TradeRecord>, FetchError>;
}

/// Data API client for `/activity`.
pub struct DataApiClient {
    base_url: String,
    activity_type: String,
    limit: usize,
    client: Client,
}

impl DataApiClient {
    pub fn new(config: &DataApiConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            activity_type: config.activity_type.clone(),
            limit: config.limit,
            client,
        })
    }
}

#[async_trait]
impl TradeSource for DataApiClient {
    async fn fetch_recent_trades(&self, participant: &str) -> Result<Vec<TradeRecord>, FetchError> {
        let url = format!("{}/activity", self.base_url);
        let limit = self.limit.to_string();

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("user", participant),
                ("type", self.activity_type.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status,
                body: body.chars().take(200).collect(),
            });
        }

        let body = resp.text().await?;
        let page = parse_activity(&body, participant, self.limit)?;

        if page.skipped > 0 {
            warn!(
                participant,
                skipped = page.skipped,
                kept = page.trades.len(),
                "dropped malformed trade records"
            );
        }

        debug!(participant, trades = page.trades.len(), "fetched activity");
        Ok(page.trades)
    }
}

/// Fetch every participant concurrently and merge into one unordered list.
/// Failures are logged and treated as empty.
pub async fn collect_trades<S>(source: &S, participants: &[String]) -> Vec<TradeRecord>
where
    S: TradeSource + ?Sized,
{
    let results = join_all(
        participants
            .iter()
            .map(|p| async move { (p, source.fetch_recent_trades(p).await) }),
    )
    .await;

    let mut all_trades = Vec::new();
    let mut failed = 0usize;
    for (participant, result) in results {
        match result {
            Ok(trades) => all_trades.extend(trades),
            Err(e) => {
                failed += 1;
                warn!(participant = %participant, error = %e, "error fetching trades");
            }
        }
    }

    info!(
        participants = participants.len(),
        failed,
        trades = all_trades.len(),
        "trade fetch complete"
    );

    all_trades
}
