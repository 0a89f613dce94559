/// Dispatcher configuration.
use super::retry::RetryPolicy;
use std::time::Duration;

/// How many requests to issue and how many may be in flight at once.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Admission gate capacity
    pub concurrency: usize,
    /// Total requests to issue
    pub requests: usize,
    /// Upper bound on a single try
    pub timeout: Duration,
    /// Extra tries for a failed request, each bounded by `timeout`
    pub retry: RetryPolicy,
}

impl DispatchConfig {
    pub fn new(concurrency: usize, requests: usize) -> Self {
        Self {
            concurrency,
            requests,
            timeout: Duration::from_secs(300),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
