/// Client abstraction for the benchmarked inference endpoint.
use crate::error::RequestError;
use crate::record::Completion;
use serde::Serialize;
use std::time::Duration;

/// Upper bound on the reachability check, independent of the request timeout.
pub const PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(5);

/// Shape of one generation request. The same request is issued N times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerateRequest {
    /// Model identifier as known to the server
    pub model: String,
    /// Prompt text
    pub prompt: String,
    /// Maximum number of tokens to generate
    pub max_tokens: u32,
}

/// Trait for clients able to issue a single attempt against the target.
///
/// Implementations perform exactly one call, with no retry and no timeout
/// of their own beyond what the transport enforces; the dispatcher bounds
/// every attempt.
#[async_trait::async_trait]
pub trait TargetClient: Send + Sync {
    /// Issue one request.
    ///
    /// # Arguments
    ///
    /// * `index` - Sequence index of the request within the run
    /// * `request` - The request shape
    async fn send_request(
        &self,
        index: usize,
        request: &GenerateRequest,
    ) -> Result<Completion, RequestError>;

    /// Check that the target is reachable before a run starts.
    async fn preflight(&self) -> Result<(), RequestError> {
        Ok(())
    }

    /// Get the provider name.
    fn provider_name(&self) -> &str;
}

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the server
    pub host: String,
    /// Transport-level request timeout
    pub timeout: Duration,
    /// Timeout for the reachability check
    pub preflight_timeout: Duration,
    /// Additional headers
    pub headers: Vec<(String, String)>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "http://127.0.0.1:11434".to_string(),
            timeout: Duration::from_secs(300),
            preflight_timeout: PREFLIGHT_TIMEOUT,
            headers: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Join a path onto the configured host.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.host.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
