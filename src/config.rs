//! Run configuration and startup validation.
use crate::dispatcher::{DispatchConfig, RetryPolicy};
use crate::error::AppError;
use crate::http::client::{ClientConfig, GenerateRequest, PREFLIGHT_TIMEOUT};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_HOST: &str = "http://127.0.0.1:11434";
pub const DEFAULT_CONCURRENCY: usize = 32;
pub const DEFAULT_REQUESTS: usize = 100;
pub const DEFAULT_PROMPT: &str = "Say 'hello, world!' in Korean.";
pub const DEFAULT_TOKENS: u32 = 128;
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MIN_SAMPLES: usize = 10;

/// Everything needed for one benchmark run.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Model identifier as known to the server
    pub model: String,
    /// Base URL of the server
    pub host: String,
    /// Admission gate capacity
    pub concurrency: usize,
    /// Total requests to issue
    pub requests: usize,
    pub prompt: String,
    /// Maximum tokens to generate per request
    pub tokens: u32,
    /// Per-request CSV output
    pub csv: Option<PathBuf>,
    /// Upper bound on a single attempt
    pub timeout: Duration,
    /// Extra tries for a failed request, each with its own timeout
    pub retry: u32,
    /// Stop admitting requests once the running error rate exceeds this
    pub max_error_rate: Option<f64>,
    /// Completed requests required before `max_error_rate` is evaluated
    pub min_samples: usize,
    /// Check the host is reachable before the run
    pub preflight: bool,
    /// Draw a progress bar on stderr
    pub progress: bool,
}

impl BenchConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            host: DEFAULT_HOST.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            requests: DEFAULT_REQUESTS,
            prompt: DEFAULT_PROMPT.to_string(),
            tokens: DEFAULT_TOKENS,
            csv: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: 0,
            max_error_rate: None,
            min_samples: DEFAULT_MIN_SAMPLES,
            preflight: true,
            progress: false,
        }
    }

    /// Reject configurations that cannot produce a meaningful run.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.model.trim().is_empty() {
            return Err(AppError::Config("Model identifier is required".to_string()));
        }
        if self.requests == 0 {
            return Err(AppError::Config(
                "Number of requests must be at least 1".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(AppError::Config(
                "Concurrency must be at least 1".to_string(),
            ));
        }
        if self.tokens == 0 {
            return Err(AppError::Config(
                "Token limit must be at least 1".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(AppError::Config(
                "Request timeout must be greater than zero".to_string(),
            ));
        }
        if let Some(rate) = self.max_error_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(AppError::Config(format!(
                    "Maximum error rate must be between 0 and 1, got {}",
                    rate
                )));
            }
        }
        validate_host(&self.host)
    }

    pub fn generate_request(&self) -> GenerateRequest {
        GenerateRequest {
            model: self.model.clone(),
            prompt: self.prompt.clone(),
            max_tokens: self.tokens,
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig::new(self.concurrency, self.requests)
            .with_timeout(self.timeout)
            .with_retry(RetryPolicy::new(self.retry))
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            host: self.host.clone(),
            timeout: self.timeout,
            preflight_timeout: PREFLIGHT_TIMEOUT,
            headers: Vec::new(),
        }
    }
}

/// The host must be an absolute http(s) URL.
pub fn validate_host(host: &str) -> Result<(), AppError> {
    let url = Url::parse(host)
        .map_err(|e| AppError::Config(format!("Invalid host URL '{}': {}", host, e)))?;

    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(()),
        "http" | "https" => Err(AppError::Config(format!(
            "Host URL '{}' has no host name",
            host
        ))),
        other => Err(AppError::Config(format!(
            "Host URL '{}' must use http or https, not '{}'",
            host, other
        ))),
    }
}
