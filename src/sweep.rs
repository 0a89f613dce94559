//! Concurrency sweep: find the level where latency or errors blow up.
use crate::config::BenchConfig;
use crate::dispatcher::{cancellation, CancelSignal};
use crate::driver::{connect, run_with_client};
use crate::error::AppError;
use crate::http::TargetClient;
use crate::output::append_summary;
use crate::stats::Summary;
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_LEVELS: [usize; 7] = [1, 2, 4, 8, 16, 32, 64];
pub const DEFAULT_SWEEP_REQUESTS: usize = 50;
pub const DEFAULT_LATENCY_THRESHOLD: f64 = 30.0;
pub const DEFAULT_ERROR_THRESHOLD: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Shape shared by every level; its concurrency and csv are overridden
    pub base: BenchConfig,
    /// Concurrency levels, run in the given order
    pub levels: Vec<usize>,
    /// p95 latency, in seconds, at or above which a level is unhealthy
    pub latency_threshold: f64,
    /// Error rate at or above which a level is unhealthy
    pub error_threshold: f64,
    /// Append each level's summary to this file
    pub csv: Option<PathBuf>,
}

#[derive(Debug)]
pub struct SweepReport {
    pub summaries: Vec<Summary>,
    /// First concurrency level that crossed a threshold
    pub trouble_at: Option<usize>,
    /// Whether the sweep stopped before its last level
    pub interrupted: bool,
}

impl SweepConfig {
    pub fn new(base: BenchConfig) -> Self {
        Self {
            base,
            levels: DEFAULT_LEVELS.to_vec(),
            latency_threshold: DEFAULT_LATENCY_THRESHOLD,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
            csv: None,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.levels.is_empty() {
            return Err(AppError::Config(
                "At least one concurrency level is required".to_string(),
            ));
        }
        if self.levels.contains(&0) {
            return Err(AppError::Config(
                "Concurrency levels must be at least 1".to_string(),
            ));
        }
        if self.latency_threshold <= 0.0 {
            return Err(AppError::Config(
                "Latency threshold must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.error_threshold) {
            return Err(AppError::Config(format!(
                "Error threshold must be between 0 and 1, got {}",
                self.error_threshold
            )));
        }
        self.base.validate()
    }

    fn level_config(&self, concurrency: usize) -> BenchConfig {
        let mut config = self.base.clone();
        config.concurrency = concurrency;
        config.csv = None;
        config
    }

    /// A level is healthy when p95 exists and both metrics sit below their
    /// thresholds.
    pub fn is_healthy(&self, summary: &Summary) -> bool {
        matches!(
            (summary.p95_latency, summary.error_rate),
            (Some(p95), Some(err)) if p95 < self.latency_threshold && err < self.error_threshold
        )
    }
}

/// Connect once, then run every level against the same client.
pub async fn run_sweep(config: &SweepConfig, signal: CancelSignal) -> Result<SweepReport, AppError> {
    config.validate()?;
    let client = connect(&config.base).await?;
    run_sweep_with_client(config, client, signal).await
}

pub async fn run_sweep_with_client<C: TargetClient + ?Sized + 'static>(
    config: &SweepConfig,
    client: Arc<C>,
    signal: CancelSignal,
) -> Result<SweepReport, AppError> {
    config.validate()?;

    let mut summaries = Vec::with_capacity(config.levels.len());
    let mut trouble_at = None;
    let mut interrupted = false;

    for &level in &config.levels {
        if signal.is_cancelled() {
            interrupted = true;
            break;
        }

        tracing::info!(concurrency = level, "sweep level started");
        // Each level gets its own canceller so an error-rate abort in one
        // level does not leak into the next; the outer signal is forwarded.
        let (canceller, level_signal) = cancellation();
        let forward = {
            let canceller = canceller.clone();
            let mut outer = signal.clone();
            tokio::spawn(async move {
                outer.cancelled().await;
                canceller.cancel();
            })
        };

        let outcome =
            run_with_client(&config.level_config(level), client.clone(), canceller, level_signal)
                .await;
        forward.abort();
        let outcome = outcome?;

        // A level cut short by an interrupt says nothing about capacity.
        if outcome.report.cancelled && signal.is_cancelled() {
            tracing::warn!(
                concurrency = level,
                completed = outcome.report.completed,
                "sweep level interrupted, discarding partial results"
            );
            interrupted = true;
            break;
        }

        if let Some(path) = &config.csv {
            append_summary(path, &outcome.summary)?;
        }
        if trouble_at.is_none() && !config.is_healthy(&outcome.summary) {
            tracing::warn!(concurrency = level, "sweep level crossed a threshold");
            trouble_at = Some(level);
        }
        summaries.push(outcome.summary);
    }

    Ok(SweepReport {
        summaries,
        trouble_at,
        interrupted,
    })
}
