// src/error.rs

//! Unified error handling for the notifier.

use std::fmt;

use thiserror::Error;

/// Result type alias for notifier operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization failed
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Schedule descriptor could not be parsed
    #[error("Invalid schedule '{descriptor}': {message}")]
    Schedule { descriptor: String, message: String },

    /// Status or dedup cache unreachable. Fatal to the pass.
    #[error("{cache} cache unavailable: {message}")]
    CacheUnavailable { cache: String, message: String },

    /// Catalog provider failed
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Subscription index failed
    #[error("Subscription index error: {0}")]
    Subscription(String),

    /// Snapshot shrank too much compared to the last accepted pass
    #[error(
        "Snapshot shrank: {previous_count} -> {current_count} items ({drop_percent:.1}% drop > {threshold_percent}%)"
    )]
    SnapshotShrunk {
        current_count: usize,
        previous_count: usize,
        drop_percent: f64,
        threshold_percent: u8,
    },

    /// Snapshot was empty while the previous one was not
    #[error("Catalog snapshot is empty")]
    EmptyCatalog,
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a schedule parsing error.
    pub fn schedule(descriptor: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Schedule {
            descriptor: descriptor.into(),
            message: message.to_string(),
        }
    }

    /// Create a cache unavailability error.
    pub fn cache(cache: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::CacheUnavailable {
            cache: cache.into(),
            message: message.to_string(),
        }
    }

    /// Create a catalog provider error.
    pub fn catalog(message: impl fmt::Display) -> Self {
        Self::Catalog(message.to_string())
    }

    /// Create a subscription index error.
    pub fn subscription(message: impl fmt::Display) -> Self {
        Self::Subscription(message.to_string())
    }

    /// Whether this error came from an unreachable cache.
    pub fn is_cache_unavailable(&self) -> bool {
        matches!(self, Self::CacheUnavailable { .. })
    }
}

/// Error returned by a delivery channel.
///
/// Never crosses the dispatcher boundary; it is logged and recorded as an
/// outcome for the channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Network or transport failure
    #[error("transport failure: {0}")]
    Transport(String),

    /// Remote endpoint refused the message
    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Push device identity is invalid or expired
    #[error("device identity is invalid or expired")]
    InvalidDevice,

    /// Channel call exceeded its time budget
    #[error("timed out after {0}ms")]
    Timeout(u64),

    /// Local persistence for the channel failed
    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for ChannelError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<AppError> for ChannelError {
    fn from(e: AppError) -> Self {
        Self::Storage(e.to_string())
    }
}
