//! Normalizer - turns inbound calls of either shape into a [`RequestLog`]

use crate::body::{decode_body, decode_pairs};
use crate::paths::{clean_full_url, clean_path};
use crate::{LogType, RequestLog};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Errors from decoding a structured event payload
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("Payload is not a JSON object")]
    NotAnObject,
}

/// A pre-shaped event payload sent by an intercepting client
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredEvent {
    /// Event fields nested one level down under `body`
    Wrapped(Map<String, Value>),
    /// Event fields at the top level
    Direct(Map<String, Value>),
}

impl StructuredEvent {
    /// Decode a structured event from raw JSON bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, NormalizeError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// Decode a structured event from a parsed JSON value
    ///
    /// The payload is double-wrapped when its `body` is an object that
    /// carries a `type` key.
    pub fn from_value(value: Value) -> Result<Self, NormalizeError> {
        let Value::Object(mut outer) = value else {
            return Err(NormalizeError::NotAnObject);
        };

        let wrapped = matches!(
            outer.get("body"),
            Some(Value::Object(inner)) if inner.contains_key("type")
        );
        if wrapped {
            if let Some(Value::Object(inner)) = outer.remove("body") {
                return Ok(StructuredEvent::Wrapped(inner));
            }
        }

        Ok(StructuredEvent::Direct(outer))
    }

    /// The object holding the event fields
    pub fn into_fields(self) -> Map<String, Value> {
        match self {
            StructuredEvent::Wrapped(fields) | StructuredEvent::Direct(fields) => fields,
        }
    }
}

/// A transport-level HTTP call captured as-is
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    pub method: String,

    /// `http` or `https`
    pub scheme: String,

    pub host: String,

    /// Request path without the query string
    pub path: String,

    pub query: Option<String>,

    /// Header name/value pairs in arrival order
    pub headers: Vec<(String, String)>,

    pub body: Bytes,
}

impl RawRequest {
    /// Get the first header value matching `name`, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn path_and_query(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }
}

/// The two inbound shapes the normalizer accepts
#[derive(Debug, Clone)]
pub enum Inbound {
    Structured(StructuredEvent),
    Raw(RawRequest),
}

/// Hands out unique ids derived from capture time in milliseconds
///
/// Two captures in the same millisecond get consecutive values, so ids are
/// strictly increasing within a process.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self, now_ms: u64) -> String {
        let previous = match self.last.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now_ms.max(last + 1))
        }) {
            Ok(previous) | Err(previous) => previous,
        };
        now_ms.max(previous + 1).to_string()
    }
}

/// Builds canonical records from inbound calls
#[derive(Debug, Default)]
pub struct Normalizer {
    ids: IdGenerator,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize an inbound call captured now
    pub fn normalize(&self, inbound: Inbound) -> RequestLog {
        self.normalize_at(inbound, Utc::now())
    }

    /// Normalize an inbound call captured at `now`
    pub fn normalize_at(&self, inbound: Inbound, now: DateTime<Utc>) -> RequestLog {
        let id = self
            .ids
            .next_id(u64::try_from(now.timestamp_millis()).unwrap_or_default());
        let received = now.to_rfc3339_opts(SecondsFormat::Millis, true);

        let log = match inbound {
            Inbound::Structured(event) => from_fields(id, received, event.into_fields()),
            Inbound::Raw(request) => from_raw(id, received, request),
        };

        finish(log)
    }
}

/// Build a record from structured event fields
fn from_fields(id: String, received: String, mut fields: Map<String, Value>) -> RequestLog {
    RequestLog {
        id,
        log_type: fields
            .get("type")
            .and_then(Value::as_str)
            .map(LogType::parse)
            .unwrap_or_default(),
        timestamp: non_empty_str(&fields, "timestamp").unwrap_or(received),
        url: non_empty_str(&fields, "url").unwrap_or_default(),
        full_url: non_empty_str(&fields, "fullUrl").unwrap_or_default(),
        method: non_empty_str(&fields, "method").unwrap_or_else(|| "GET".to_string()),
        headers: fields.get("headers").map(header_map).unwrap_or_default(),
        status: fields
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok()),
        message: fields
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        body: take_present(&mut fields, "body"),
        data: take_present(&mut fields, "data"),
        params: take_present(&mut fields, "params"),
        request_body: take_present(&mut fields, "requestBody"),
        request_params: take_present(&mut fields, "requestParams"),
        response: take_present(&mut fields, "response"),
    }
}

/// Build a record from a raw pass-through request
fn from_raw(id: String, received: String, request: RawRequest) -> RequestLog {
    let body = decode_body(request.header("content-type"), &request.body);
    let params = request
        .query
        .as_deref()
        .map(|q| decode_pairs(q.as_bytes()))
        .unwrap_or_default();
    let full_url = format!(
        "{}://{}{}",
        request.scheme,
        request.host,
        request.path_and_query()
    );

    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in request.headers {
        match headers.entry(name) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                existing.push_str(", ");
                existing.push_str(&value);
            }
            Entry::Vacant(entry) => {
                entry.insert(value);
            }
        }
    }

    RequestLog {
        id,
        log_type: LogType::Request,
        timestamp: received,
        url: request.path,
        full_url,
        method: request.method,
        headers,
        body,
        params: Some(Value::Object(params)),
        ..Default::default()
    }
}

/// Apply the cleanup rules every record goes through
fn finish(mut log: RequestLog) -> RequestLog {
    log.method = log.method.to_uppercase();
    log.url = clean_path(&log.url);
    log.full_url = clean_full_url(&log.full_url);
    log
}

fn non_empty_str(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn take_present(fields: &mut Map<String, Value>, key: &str) -> Option<Value> {
    fields.remove(key).filter(|v| !v.is_null())
}

fn header_map(value: &Value) -> BTreeMap<String, String> {
    let Value::Object(entries) = value else {
        return BTreeMap::new();
    };

    entries
        .iter()
        .filter_map(|(name, value)| header_value(value).map(|v| (name.clone(), v)))
        .collect()
}

fn header_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(header_value)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        other => Some(other.to_string()),
    }
}
