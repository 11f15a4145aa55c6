//! Reqtap Server - capture HTTP traffic and stream it to live viewers
//!
//! This server handles:
//! - Catch-all HTTP ingress for raw and structured (`POST /`) captures
//! - A bounded history of the most recent records
//! - WebSocket fan-out of every new record to connected viewers

pub mod config;
pub mod routes;
pub mod store;

pub use config::{ClearMode, Config, ConfigError};
pub use routes::{router, AppState};
pub use store::{RequestStore, Subscription};
