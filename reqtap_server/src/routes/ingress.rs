//! Capture ingress - records every inbound HTTP call and acknowledges it

use crate::routes::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, request::Parts, HeaderMap, Method},
    Json, Router,
};
use bytes::Bytes;
use reqtap_common::{constants, is_json_mime, Inbound, RawRequest, StructuredEvent};
use serde::{Deserialize, Serialize};

/// Build the capture router; every path not claimed elsewhere lands here
pub fn router() -> Router<AppState> {
    Router::new().fallback(capture)
}

/// Acknowledgement sent to every sender
#[derive(Debug, Serialize, Deserialize)]
pub struct Ack {
    pub message: String,
}

impl Ack {
    fn received() -> Self {
        Self {
            message: constants::ACK_MESSAGE.to_string(),
        }
    }
}

/// Capture an inbound call of any method on any path
///
/// Structured events are POSTed as JSON to `/`; everything else is a raw
/// pass-through. Failures are logged and never change the acknowledgement.
pub async fn capture(State(state): State<AppState>, request: Request<Body>) -> Json<Ack> {
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, constants::MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!("Failed to read request body for {} {}: {}", parts.method, parts.uri, e);
            Bytes::new()
        }
    };

    let inbound = if is_structured_candidate(&parts, &body) {
        match StructuredEvent::from_slice(&body) {
            Ok(event) => Inbound::Structured(event),
            Err(e) => {
                tracing::warn!("Capturing malformed structured payload as raw request: {}", e);
                Inbound::Raw(raw_request(&parts, body))
            }
        }
    } else {
        Inbound::Raw(raw_request(&parts, body))
    };

    let record = state.normalizer.normalize(inbound);
    tracing::debug!(
        "Captured {} {} /{}",
        record.log_type.as_str(),
        record.method,
        record.url
    );

    let viewers = state.store.append(record).await;
    tracing::trace!("Published to {} viewers", viewers);

    Json(Ack::received())
}

/// A JSON (or untyped) POST to `/` carries a structured event
fn is_structured_candidate(parts: &Parts, body: &Bytes) -> bool {
    parts.method == Method::POST
        && parts.uri.path() == "/"
        && !body.is_empty()
        && parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(true, is_json_mime)
}

/// Convert transport-level request parts into a raw capture
fn raw_request(parts: &Parts, body: Bytes) -> RawRequest {
    let headers = parts
        .headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
        .collect();

    RawRequest {
        method: parts.method.to_string(),
        scheme: first_value(&parts.headers, "x-forwarded-proto")
            .unwrap_or("http")
            .to_ascii_lowercase(),
        host: request_host(parts),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers,
        body,
    }
}

/// Host as seen by the sender, honouring proxy headers from tunnels
fn request_host(parts: &Parts) -> String {
    first_value(&parts.headers, "x-forwarded-host")
        .or_else(|| first_value(&parts.headers, "host"))
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()))
        .unwrap_or_else(|| "localhost".to_string())
}

/// First entry of a possibly comma-separated header
fn first_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .split(',')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
