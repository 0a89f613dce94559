//! End-to-end benchmark run: dispatch, persist, aggregate.
use crate::config::BenchConfig;
use crate::dispatcher::{CancelSignal, Canceller, DispatchReport, Dispatcher};
use crate::error::AppError;
use crate::http::{OllamaClient, TargetClient};
use crate::output::FileSink;
use crate::record::RequestRecord;
use crate::stats::{Aggregator, RunMetadata, Summary};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

/// Result of one run.
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: Summary,
    pub report: DispatchReport,
    pub records: Vec<RequestRecord>,
}

/// Build the Ollama client for `config`, preflight it, and run.
///
/// The client and its connection pool live exactly as long as this call.
pub async fn run_benchmark(
    config: &BenchConfig,
    canceller: Canceller,
    signal: CancelSignal,
) -> Result<RunOutcome, AppError> {
    let client = connect(config).await?;
    run_with_client(config, client, canceller, signal).await
}

/// Validate the configuration and build a ready client.
///
/// # Errors
///
/// Configuration problems, including an unreachable host when preflight is
/// enabled, come back as [`AppError::Config`] before any request is issued.
pub async fn connect(config: &BenchConfig) -> Result<Arc<OllamaClient>, AppError> {
    config.validate()?;

    let client = OllamaClient::new(config.client_config())?;
    if config.preflight {
        client.preflight().await.map_err(|e| {
            AppError::Config(format!("Host {} is not reachable: {}", config.host, e))
        })?;
    }

    Ok(Arc::new(client))
}

/// Run against an already built client.
pub async fn run_with_client<C: TargetClient + ?Sized + 'static>(
    config: &BenchConfig,
    client: Arc<C>,
    canceller: Canceller,
    signal: CancelSignal,
) -> Result<RunOutcome, AppError> {
    config.validate()?;

    let meta = RunMetadata {
        timestamp: Utc::now(),
        model: config.model.clone(),
        host: config.host.clone(),
        concurrency: config.concurrency,
        requests: config.requests,
        prompt_len: config.prompt.chars().count(),
        tokens: config.tokens,
    };

    let mut sink = config
        .csv
        .as_ref()
        .map(|path| FileSink::create(path))
        .transpose()?;
    let progress = if config.progress {
        Some(progress_bar(config.requests as u64)?)
    } else {
        None
    };

    tracing::info!(
        model = %config.model,
        host = %config.host,
        requests = config.requests,
        concurrency = config.concurrency,
        "benchmark started"
    );

    let dispatcher = Dispatcher::new(config.dispatch_config());
    let mut stream = dispatcher.spawn(client, config.generate_request(), signal);
    let mut aggregator = Aggregator::with_capacity(config.requests);

    while let Some(record) = stream.next().await {
        if let Some(sink) = sink.as_mut() {
            if let Err(e) = sink.append(&record) {
                canceller.cancel();
                return Err(e);
            }
        }
        aggregator.push(record);

        if let Some(pb) = &progress {
            pb.set_message(format!(
                "Success: {} | Failed: {}",
                aggregator.completed() - aggregator.failures(),
                aggregator.failures()
            ));
            pb.set_position(aggregator.completed() as u64);
        }

        if should_abort(config, &aggregator) && !canceller.is_cancelled() {
            tracing::warn!(
                failures = aggregator.failures(),
                completed = aggregator.completed(),
                "error rate threshold exceeded, no new requests will be admitted"
            );
            canceller.cancel();
        }
    }

    let report = stream.finish().await?;
    if let Some(pb) = &progress {
        pb.finish_with_message(if report.cancelled {
            "Benchmark cancelled"
        } else {
            "Benchmark completed"
        });
    }

    let summary = aggregator.summarize(&meta, report.elapsed);
    tracing::info!(
        completed = report.completed,
        failures = aggregator.failures(),
        total_time = summary.total_time,
        "benchmark finished"
    );

    Ok(RunOutcome {
        summary,
        report,
        records: aggregator.into_records(),
    })
}

/// Abort once enough samples exist and the running error rate is above the
/// configured ceiling.
fn should_abort(config: &BenchConfig, aggregator: &Aggregator) -> bool {
    match (config.max_error_rate, aggregator.running_error_rate()) {
        (Some(max), Some(rate)) => {
            aggregator.completed() >= config.min_samples.max(1) && rate > max
        }
        _ => false,
    }
}

fn progress_bar(len: u64) -> Result<ProgressBar, AppError> {
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
        .map_err(|e| AppError::Runtime(format!("Invalid progress bar template: {}", e)))?
        .progress_chars("#>-");

    let pb = ProgressBar::new(len);
    pb.set_style(style);
    pb.set_message("Starting benchmark...");
    Ok(pb)
}
