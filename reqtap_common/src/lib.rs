//! Reqtap Common - Shared record and feed types for the capture service
//!
//! This crate contains the canonical request log, the live feed wire format
//! and the normalizer that turns inbound HTTP calls into records. It does
//! no I/O, so both the server and any viewer can depend on it.

mod body;
mod normalize;
mod paths;

pub use body::{decode_body, decode_pairs, is_json_mime};
pub use normalize::{
    IdGenerator, Inbound, NormalizeError, Normalizer, RawRequest, StructuredEvent,
};
pub use paths::{clean_full_url, clean_path};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Kind of captured event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    #[default]
    Request,
    Response,
    Error,
}

impl LogType {
    /// Parse a type label, falling back to `Request` for anything unknown
    pub fn parse(label: &str) -> Self {
        if label.eq_ignore_ascii_case("response") {
            LogType::Response
        } else if label.eq_ignore_ascii_case("error") {
            LogType::Error
        } else {
            LogType::Request
        }
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Request => "request",
            LogType::Response => "response",
            LogType::Error => "error",
        }
    }
}

/// Canonical unit of captured traffic
///
/// Records are created by [`Normalizer`] and never modified afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLog {
    /// Capture-time derived id, used for display keying only
    pub id: String,

    #[serde(rename = "type")]
    pub log_type: LogType,

    /// ISO-8601 timestamp
    pub timestamp: String,

    /// Path with leading and trailing slashes stripped
    pub url: String,

    /// Absolute URL with repeated slashes collapsed
    pub full_url: String,

    /// Upper-cased HTTP method
    pub method: String,

    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Body of the request a response or error belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,

    /// Params of the request a response or error belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_params: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

/// Events pushed from the server to live viewers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum FeedEvent {
    /// Full history, oldest first, sent once when a viewer connects
    #[serde(rename = "existingRequests")]
    ExistingRequests(Vec<RequestLog>),

    /// A record appended after the viewer connected
    #[serde(rename = "newRequest")]
    NewRequest(RequestLog),

    /// The shared history was cleared
    #[serde(rename = "cleared")]
    Cleared,
}

impl FeedEvent {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Commands a viewer may send over its feed connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ViewerCommand {
    #[serde(rename = "clearAll")]
    ClearAll,
}

impl ViewerCommand {
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Constants shared by the server and viewers
pub mod constants {
    /// Maximum number of records kept in the history
    pub const HISTORY_CAPACITY: usize = 100;

    /// Default listening port
    pub const DEFAULT_PORT: u16 = 3001;

    /// Largest inbound body that is read into a record
    pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

    /// Acknowledgement message returned to every sender
    pub const ACK_MESSAGE: &str = "Request received";

    /// Service name reported by the health endpoint
    pub const SERVICE_NAME: &str = "reqtap";

    /// Live feed WebSocket path
    pub const FEED_WS_PATH: &str = "/_reqtap/ws";

    /// History snapshot path
    pub const FEED_REQUESTS_PATH: &str = "/_reqtap/requests";

    /// Shared clear path
    pub const FEED_CLEAR_PATH: &str = "/_reqtap/clear";

    /// Health check path
    pub const FEED_HEALTH_PATH: &str = "/_reqtap/health";
}
