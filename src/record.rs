//! Per-request outcome records.
use crate::error::RequestError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Longest error detail kept on a record.
pub const MAX_ERROR_LEN: usize = 200;

/// Category of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Connection,
    /// Non-2xx response, carries the status code.
    Status(u16),
    Decode,
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Connection => write!(f, "connection"),
            FailureKind::Status(code) => write!(f, "{}", code),
            FailureKind::Decode => write!(f, "decode"),
            FailureKind::Other => write!(f, "error"),
        }
    }
}

/// Outcome of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Status {
    Success { code: u16 },
    Failure { kind: FailureKind },
}

impl Status {
    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success { .. })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Success { code } => write!(f, "{}", code),
            Status::Failure { kind } => write!(f, "{}", kind),
        }
    }
}

/// What the target reported for a successful call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    /// HTTP status code of the response
    pub code: u16,
    /// Generated tokens reported by the service
    pub tokens: Option<u64>,
    /// Processing time reported by the service
    pub service_duration: Option<Duration>,
}

/// Immutable record of one completed attempt.
///
/// Built once by the dispatcher through [`RequestRecord::success`] or
/// [`RequestRecord::failure`]; there are no setters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestRecord {
    sequence_index: usize,
    #[serde(serialize_with = "as_secs")]
    latency: Duration,
    status: Status,
    tokens: Option<u64>,
    #[serde(serialize_with = "as_secs")]
    total_duration: Duration,
    error: String,
}

impl RequestRecord {
    /// Record a successful attempt.
    pub fn success(sequence_index: usize, latency: Duration, completion: Completion) -> Self {
        Self {
            sequence_index,
            latency,
            status: Status::Success {
                code: completion.code,
            },
            tokens: completion.tokens,
            total_duration: completion.service_duration.unwrap_or(latency),
            error: String::new(),
        }
    }

    /// Record a failed attempt.
    pub fn failure(sequence_index: usize, latency: Duration, err: &RequestError) -> Self {
        let kind = match err {
            RequestError::Timeout => FailureKind::Timeout,
            RequestError::Connection(_) => FailureKind::Connection,
            RequestError::Status { code, .. } => FailureKind::Status(*code),
            RequestError::Decode(_) => FailureKind::Decode,
            RequestError::Other(_) => FailureKind::Other,
        };

        Self {
            sequence_index,
            latency,
            status: Status::Failure { kind },
            tokens: None,
            total_duration: latency,
            error: truncate(&err.to_string(), MAX_ERROR_LEN),
        }
    }

    pub fn sequence_index(&self) -> usize {
        self.sequence_index
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub fn latency_secs(&self) -> f64 {
        self.latency.as_secs_f64()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn tokens(&self) -> Option<u64> {
        self.tokens
    }

    pub fn total_duration(&self) -> Duration {
        self.total_duration
    }

    pub fn error(&self) -> &str {
        &self.error
    }
}

fn as_secs<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
