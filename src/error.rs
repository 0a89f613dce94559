//! Error types for the ollama-bench crate.
use thiserror::Error;

/// Application-level errors.
///
/// Everything here is fatal to the process. Per-request problems are
/// [`RequestError`]s and end up inside a failed record instead.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Why a single attempt against the target failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("request timed out")]
    Timeout,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("unexpected status {code}: {body}")]
    Status { code: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("{0}")]
    Other(String),
}

impl RequestError {
    /// Classify a transport error from reqwest.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            RequestError::Timeout
        } else if err.is_connect() || err.is_request() {
            RequestError::Connection(err.to_string())
        } else if err.is_decode() || err.is_body() {
            RequestError::Decode(err.to_string())
        } else {
            RequestError::Other(err.to_string())
        }
    }
}
