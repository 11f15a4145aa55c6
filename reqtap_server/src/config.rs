//! Server configuration loaded from environment variables

use reqtap_common::constants;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Who a viewer's "clear all" affects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClearMode {
    /// Only the requesting viewer's display; the shared history is kept
    #[default]
    Local,
    /// The shared history, for every connected viewer
    Shared,
}

impl ClearMode {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ClearMode::Local => "local",
            ClearMode::Shared => "shared",
        }
    }
}

impl fmt::Display for ClearMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClearMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(ClearMode::Local),
            "shared" => Ok(ClearMode::Shared),
            _ => Err(ConfigError::InvalidClearMode(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,

    /// Port for both captured traffic and the live feed
    pub port: u16,

    /// Scope of a viewer's clear request
    pub clear_mode: ClearMode,

    /// Events a viewer may fall behind by before it is disconnected
    pub subscriber_buffer: usize,

    /// Longest a single frame may take to reach a viewer
    pub send_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("PORT") {
            Some(port) => port.parse().map_err(|_| ConfigError::InvalidPort)?,
            None => constants::DEFAULT_PORT,
        };

        let clear_mode = match lookup("CLEAR_MODE") {
            Some(mode) => mode.parse()?,
            None => ClearMode::default(),
        };

        let subscriber_buffer = match lookup("SUBSCRIBER_BUFFER") {
            Some(size) => match size.parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => return Err(ConfigError::InvalidSubscriberBuffer(size)),
            },
            None => DEFAULT_SUBSCRIBER_BUFFER,
        };

        let send_timeout = match lookup("SEND_TIMEOUT_MS") {
            Some(ms) => match ms.parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => return Err(ConfigError::InvalidSendTimeout(ms)),
            },
            None => DEFAULT_SEND_TIMEOUT,
        };

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            clear_mode,
            subscriber_buffer,
            send_timeout,
        })
    }

    /// Address the listener binds to (e.g., "0.0.0.0:3001")
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: constants::DEFAULT_PORT,
            clear_mode: ClearMode::default(),
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid CLEAR_MODE '{0}' (expected 'local' or 'shared')")]
    InvalidClearMode(String),

    #[error("Invalid SUBSCRIBER_BUFFER '{0}' (expected a positive integer)")]
    InvalidSubscriberBuffer(String),

    #[error("Invalid SEND_TIMEOUT_MS '{0}' (expected a positive integer)")]
    InvalidSendTimeout(String),
}
