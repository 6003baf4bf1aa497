//! Profile scraping through an asynchronous dataset API.
//!
//! A scrape is triggered for one URL, which yields a snapshot id. The
//! snapshot is then polled until the record is ready. The loop has no
//! attempt cap of its own; the scraping stage timeout ends it.

use std::time::Duration;

use async_trait::async_trait;
use cpdb_pipeline::{CollaboratorError, ProfileScraper};
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Map, Value};

use crate::error::CollectorError;
use crate::{build_client, check_status, endpoint, parse_base_url, read_json, HttpOptions};

const DEFAULT_BASE_URL: &str = "https://api.brightdata.com/datasets/v3/";
const DEFAULT_DATASET_ID: &str = "gd_l1viktl72bvl7bjuj0";

/// State of a snapshot poll.
#[derive(Debug, PartialEq)]
enum Snapshot {
    Pending,
    Ready(Value),
}

pub struct SnapshotScraper {
    client: Client,
    api_key: String,
    base_url: Url,
    dataset_id: String,
    poll_interval: Duration,
}

impl SnapshotScraper {
    /// # Errors
    ///
    /// Returns [`CollectorError::Http`] if the HTTP client cannot be built.
    pub fn new(
        api_key: &str,
        poll_interval: Duration,
        options: &HttpOptions,
    ) -> Result<Self, CollectorError> {
        Self::with_base_url(api_key, poll_interval, options, DEFAULT_BASE_URL)
    }

    /// # Errors
    ///
    /// Returns [`CollectorError::Http`] if the HTTP client cannot be built,
    /// or [`CollectorError::InvalidBaseUrl`] for an unparsable URL.
    pub fn with_base_url(
        api_key: &str,
        poll_interval: Duration,
        options: &HttpOptions,
        base_url: &str,
    ) -> Result<Self, CollectorError> {
        Ok(Self {
            client: build_client(options)?,
            api_key: api_key.to_owned(),
            base_url: parse_base_url(base_url)?,
            dataset_id: DEFAULT_DATASET_ID.to_owned(),
            poll_interval,
        })
    }

    #[must_use]
    pub fn with_dataset_id(mut self, dataset_id: &str) -> Self {
        self.dataset_id = dataset_id.to_owned();
        self
    }

    async fn fetch(&self, profile_url: &str) -> Result<Value, CollectorError> {
        let snapshot_id = self.trigger(profile_url).await?;
        tracing::info!(%profile_url, %snapshot_id, "scrape triggered");

        let mut polls = 0_u32;
        loop {
            polls += 1;
            match self.poll(&snapshot_id).await? {
                Snapshot::Ready(record) => {
                    tracing::info!(%snapshot_id, polls, "snapshot ready");
                    return Ok(normalize_record(&record));
                }
                Snapshot::Pending => {
                    tracing::debug!(%snapshot_id, polls, "snapshot not ready");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    async fn trigger(&self, profile_url: &str) -> Result<String, CollectorError> {
        let mut url = endpoint(&self.base_url, "trigger")?;
        url.query_pairs_mut()
            .append_pair("dataset_id", &self.dataset_id)
            .append_pair("include_errors", "true");

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&json!([{ "url": profile_url }]))
            .send()
            .await?;
        let response = check_status(response, "scraper")?;
        let body = read_json(response, "scrape trigger").await?;

        body.get("snapshot_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| CollectorError::InvalidResponse {
                service: "scraper",
                reason: "trigger response has no snapshot_id".to_owned(),
            })
    }

    async fn poll(&self, snapshot_id: &str) -> Result<Snapshot, CollectorError> {
        let mut url = endpoint(&self.base_url, &format!("snapshot/{snapshot_id}"))?;
        url.query_pairs_mut().append_pair("format", "json");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        // 202 while the collection runs; 404 until the snapshot exists.
        if matches!(response.status(), StatusCode::ACCEPTED | StatusCode::NOT_FOUND) {
            return Ok(Snapshot::Pending);
        }
        let response = check_status(response, "scraper")?;
        let body = read_json(response, "snapshot").await?;
        classify_snapshot(body)
    }
}

#[async_trait]
impl ProfileScraper for SnapshotScraper {
    async fn scrape(&self, canonical_url: &str) -> Result<Value, CollaboratorError> {
        self.fetch(canonical_url).await.map_err(CollaboratorError::from)
    }
}

fn classify_snapshot(body: Value) -> Result<Snapshot, CollectorError> {
    let snapshot = match body {
        Value::Array(records) => records
            .into_iter()
            .next()
            .map_or(Snapshot::Pending, Snapshot::Ready),
        Value::Object(map) if map.get("status").and_then(Value::as_str) == Some("failed") => {
            let reason = map
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("snapshot collection failed");
            return Err(invalid_snapshot(reason));
        }
        Value::Object(map) if map.contains_key("id") => Snapshot::Ready(Value::Object(map)),
        // {"status": "running"} and anything else unrecognised: keep waiting.
        _ => Snapshot::Pending,
    };

    // With include_errors the dataset returns error records in place of profiles.
    if let Snapshot::Ready(record) = &snapshot {
        if record.get("error").is_some() || record.get("error_code").is_some() {
            let reason = [record.get("error_code"), record.get("error")]
                .into_iter()
                .flatten()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(": ");
            return Err(invalid_snapshot(if reason.is_empty() {
                "error record"
            } else {
                &reason
            }));
        }
    }
    Ok(snapshot)
}

fn invalid_snapshot(reason: &str) -> CollectorError {
    CollectorError::InvalidResponse {
        service: "scraper",
        reason: format!("snapshot returned {reason}"),
    }
}

fn text(raw: &Value, keys: &[&str]) -> Value {
    keys.iter()
        .filter_map(|k| raw.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map_or_else(|| Value::String(String::new()), |s| Value::String(s.to_owned()))
}

fn list(raw: &Value, key: &str) -> Vec<Value> {
    raw.get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Reshapes a raw scraper record into the sections assessment reads:
/// `basic_info`, `experience`, `education` and `skills`.
pub(crate) fn normalize_record(raw: &Value) -> Value {
    let current_company = raw
        .get("current_company")
        .map_or(Value::String(String::new()), |c| text(c, &["name"]));

    let basic_info = json!({
        "name": text(raw, &["name"]),
        "headline": text(raw, &["position", "headline"]),
        "location": text(raw, &["city", "location"]),
        "summary": text(raw, &["about", "summary"]),
        "profile_url": text(raw, &["url", "input_url"]),
        "current_company": current_company,
        "connections_count": raw.get("connections").and_then(Value::as_u64).unwrap_or(0),
        "followers_count": raw.get("followers").and_then(Value::as_u64).unwrap_or(0),
    });

    let experience: Vec<Value> = list(raw, "experience")
        .iter()
        .map(|exp| {
            json!({
                "title": text(exp, &["title"]),
                "company": text(exp, &["company"]),
                "location": text(exp, &["location"]),
                "start_date": text(exp, &["start_date"]),
                "end_date": text(exp, &["end_date"]),
                "description": text(exp, &["description"]),
            })
        })
        .collect();

    let education: Vec<Value> = list(raw, "education")
        .iter()
        .map(|edu| {
            json!({
                "school": text(edu, &["title", "school"]),
                "degree": text(edu, &["degree"]),
                "field": text(edu, &["field"]),
                "start_year": text(edu, &["start_year"]),
                "end_year": text(edu, &["end_year"]),
            })
        })
        .collect();

    let skills: Vec<Value> = list(raw, "skills")
        .into_iter()
        .filter_map(|skill| match skill {
            Value::String(s) => Some(Value::String(s)),
            Value::Object(map) => map.get("name").cloned(),
            _ => None,
        })
        .collect();

    let mut normalized = Map::new();
    normalized.insert("basic_info".to_owned(), basic_info);
    normalized.insert("experience".to_owned(), Value::Array(experience));
    normalized.insert("education".to_owned(), Value::Array(education));
    normalized.insert("skills".to_owned(), Value::Array(skills));
    Value::Object(normalized)
}
