// src/error.rs
// Standardized error types for groupfeed

use thiserror::Error;

/// Main error type for the groupfeed library
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("store error: {0}")]
    Store(String),

    #[error("unknown error: {0}")]
    Other(String),
}

/// Convenience type alias for Result using FeedError
pub type Result<T> = std::result::Result<T, FeedError>;
