//! Error types for wb-core

use thiserror::Error;

/// Main error type for wb-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid phone number: {0}")]
    InvalidPhoneNumber(String),

    #[error("unparseable message: {0}")]
    UnparseableMessage(String),

    #[error("upstream call failed: {0}")]
    Upstream(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for wb-core
pub type Result<T> = std::result::Result<T, Error>;
