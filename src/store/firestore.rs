//! Firestore REST adapter.
//!
//! Lists a collection page by page and fetches single documents, decoding
//! Firestore's typed value JSON (`stringValue`, `timestampValue`, ...) into
//! `FieldValue`. Read-only; no retries.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::DateTime;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;

use super::{DocumentStore, StoreError};
use crate::models::{FieldValue, RawRecord, StoreTimestamp};

pub const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";
pub const DEFAULT_DATABASE: &str = "(default)";

const PAGE_SIZE: &str = "300";

/// Firestore connection details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirestoreConfig {
    pub base_url: String,
    pub project_id: String,
    pub database: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            project_id: project_id.into(),
            database: DEFAULT_DATABASE.to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

/// Read-only Firestore REST client.
pub struct FirestoreStore {
    config: FirestoreConfig,
    client: reqwest::Client,
}

impl FirestoreStore {
    pub fn new(config: FirestoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::Unavailable(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn documents_url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| StoreError::Unavailable(format!("Invalid Firestore base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Unavailable("Firestore base URL cannot hold a path".into()))?
            .pop_if_empty()
            .extend([
                "projects",
                self.config.project_id.as_str(),
                "databases",
                self.config.database.as_str(),
                "documents",
            ])
            .extend(segments);
        if let Some(key) = &self.config.api_key {
            url.query_pairs_mut().append_pair("key", key);
        }
        Ok(url)
    }

    async fn send(&self, url: Url) -> Result<reqwest::Response, StoreError> {
        self.client.get(url).send().await.map_err(|e| {
            if e.is_connect() {
                StoreError::Unavailable(format!("Cannot connect to {}", self.config.base_url))
            } else if e.is_timeout() {
                StoreError::Unavailable(format!(
                    "Request timed out after {}s",
                    self.config.timeout_secs
                ))
            } else {
                StoreError::Unavailable(e.to_string())
            }
        })
    }
}

impl DocumentStore for FirestoreStore {
    async fn list_documents(&self, collection: &str) -> Result<Vec<RawRecord>, StoreError> {
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.documents_url(&[collection])?;
            url.query_pairs_mut().append_pair("pageSize", PAGE_SIZE);
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }

            let response = self.send(url).await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(StoreError::Rejected {
                    status: status.as_u16(),
                    body,
                });
            }

            let page: ListDocumentsResponse = response
                .json()
                .await
                .map_err(|e| StoreError::Decode(e.to_string()))?;
            for doc in page.documents {
                records.push(decode_document(doc)?);
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!(collection, count = records.len(), "Listed Firestore documents");
        Ok(records)
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<RawRecord>, StoreError> {
        let url = self.documents_url(&[collection, id])?;
        let response = self.send(url).await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let doc: FirestoreDocument = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        decode_document(doc).map(Some)
    }
}

// ── Wire types ──────────────────────────────────────────────────────────────

/// Response body of `documents.list`. An empty collection is `{}`.
#[derive(Deserialize)]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<FirestoreDocument>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: serde_json::Map<String, Value>,
}

fn decode_document(doc: FirestoreDocument) -> Result<RawRecord, StoreError> {
    let id = doc
        .name
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| StoreError::Decode(format!("document name without id: {}", doc.name)))?
        .to_string();
    let fields = decode_fields(&doc.fields)?;
    Ok(RawRecord { id, fields })
}

fn decode_fields(
    fields: &serde_json::Map<String, Value>,
) -> Result<BTreeMap<String, FieldValue>, StoreError> {
    fields
        .iter()
        .map(|(k, v)| decode_value(v).map(|fv| (k.clone(), fv)))
        .collect()
}

/// Decode one Firestore typed value (`{"stringValue": "..."}` etc.).
pub(crate) fn decode_value(value: &Value) -> Result<FieldValue, StoreError> {
    let obj = value
        .as_object()
        .ok_or_else(|| StoreError::Decode(format!("expected typed value object, got {value}")))?;
    let (kind, inner) = obj
        .iter()
        .next()
        .ok_or_else(|| StoreError::Decode("empty typed value".into()))?;
    let kind = kind.as_str();

    let bad = |what: &str| StoreError::Decode(format!("invalid {what}: {inner}"));

    match kind {
        "nullValue" => Ok(FieldValue::Null),
        "booleanValue" => inner.as_bool().map(FieldValue::Bool).ok_or_else(|| bad(kind)),
        "integerValue" => inner
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .or_else(|| inner.as_i64())
            .map(FieldValue::Integer)
            .ok_or_else(|| bad(kind)),
        "doubleValue" => match inner {
            Value::Number(n) => n.as_f64().map(FieldValue::Double).ok_or_else(|| bad(kind)),
            Value::String(s) => s.parse::<f64>().map(FieldValue::Double).map_err(|_| bad(kind)),
            _ => Err(bad(kind)),
        },
        "timestampValue" => inner
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| FieldValue::Timestamp(StoreTimestamp::from(dt.to_utc())))
            .ok_or_else(|| bad(kind)),
        "stringValue" | "bytesValue" | "referenceValue" => inner
            .as_str()
            .map(|s| FieldValue::String(s.to_string()))
            .ok_or_else(|| bad(kind)),
        "geoPointValue" => {
            let mut point = BTreeMap::new();
            for axis in ["latitude", "longitude"] {
                let n = inner.get(axis).and_then(Value::as_f64).unwrap_or(0.0);
                point.insert(axis.to_string(), FieldValue::Double(n));
            }
            Ok(FieldValue::Map(point))
        }
        "arrayValue" => {
            let values = match inner.get("values") {
                Some(Value::Array(items)) => items
                    .iter()
                    .map(decode_value)
                    .collect::<Result<Vec<_>, _>>()?,
                Some(_) => return Err(bad(kind)),
                None => Vec::new(),
            };
            Ok(FieldValue::Array(values))
        }
        "mapValue" => {
            let fields = match inner.get("fields") {
                Some(Value::Object(map)) => decode_fields(map)?,
                Some(_) => return Err(bad(kind)),
                None => BTreeMap::new(),
            };
            Ok(FieldValue::Map(fields))
        }
        other => Err(StoreError::Decode(format!("unknown value type {other}"))),
    }
}
