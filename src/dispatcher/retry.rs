/// Retry policy applied per request by the dispatcher.
use std::time::Duration;

/// Ceiling on the pause between two tries.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Exponential backoff: the pause after try `k` is `base_delay * 2^k`,
/// capped at [`MAX_BACKOFF`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra tries after the first one fails
    pub retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn new(retries: u32) -> Self {
        Self {
            retries,
            ..Self::default()
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Pause before try `attempt + 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(attempt))
            .min(MAX_BACKOFF)
    }
}
