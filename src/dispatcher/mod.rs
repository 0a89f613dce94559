//! Bounded-concurrency request dispatcher.
//!
//! Issues N requests against a [`TargetClient`], never letting more than C
//! be in flight, and streams a [`RequestRecord`] for each as it completes.
pub mod cancel;
pub mod config;
pub mod retry;

pub use cancel::{cancellation, CancelSignal, Canceller};
pub use config::DispatchConfig;
pub use retry::RetryPolicy;

use crate::error::{AppError, RequestError};
use crate::http::client::{GenerateRequest, TargetClient};
use crate::record::RequestRecord;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

/// Bookkeeping returned once a dispatch run has fully drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Requests admitted through the gate
    pub issued: usize,
    /// Records delivered, always equal to `issued` once drained
    pub completed: usize,
    /// Whether the run stopped early
    pub cancelled: bool,
    /// Span from first dispatch to last completion
    pub elapsed: Duration,
}

/// Lazily consumed sequence of records from a running dispatch.
pub struct RecordStream {
    records: mpsc::UnboundedReceiver<RequestRecord>,
    handle: JoinHandle<Result<DispatchReport, AppError>>,
}

impl RecordStream {
    /// Next completed record, `None` once every issued request has reported.
    pub async fn next(&mut self) -> Option<RequestRecord> {
        self.records.recv().await
    }

    /// Wait for the dispatch task and return its report.
    pub async fn finish(self) -> Result<DispatchReport, AppError> {
        self.handle
            .await
            .map_err(|e| AppError::Runtime(format!("Dispatcher task failed: {}", e)))?
    }

    /// Drain every record, then finish.
    pub async fn collect(mut self) -> Result<(Vec<RequestRecord>, DispatchReport), AppError> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await {
            records.push(record);
        }
        let report = self.finish().await?;
        Ok((records, report))
    }
}

/// Issues requests through a counting admission gate.
pub struct Dispatcher {
    config: DispatchConfig,
}

impl Dispatcher {
    /// Create a new dispatcher.
    pub fn new(config: DispatchConfig) -> Self {
        Self { config }
    }

    /// Start the run in the background and return its record stream.
    ///
    /// Must be called within a Tokio runtime.
    pub fn spawn<C: TargetClient + ?Sized + 'static>(
        &self,
        client: Arc<C>,
        request: GenerateRequest,
        cancel: CancelSignal,
    ) -> RecordStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = self.config.clone();
        let handle = tokio::spawn(dispatch(config, client, Arc::new(request), cancel, tx));

        RecordStream {
            records: rx,
            handle,
        }
    }
}

async fn dispatch<C: TargetClient + ?Sized + 'static>(
    config: DispatchConfig,
    client: Arc<C>,
    request: Arc<GenerateRequest>,
    mut cancel: CancelSignal,
    tx: mpsc::UnboundedSender<RequestRecord>,
) -> Result<DispatchReport, AppError> {
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let mut handles = Vec::with_capacity(config.requests);
    let mut started = None;
    let mut cancelled = false;

    tracing::info!(
        requests = config.requests,
        concurrency = config.concurrency,
        provider = client.provider_name(),
        "dispatch started"
    );

    for index in 0..config.requests {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                cancelled = true;
                break;
            }
            permit = semaphore.clone().acquire_owned() => permit.map_err(|e| {
                AppError::Runtime(format!("Failed to acquire semaphore permit: {}", e))
            })?,
        };
        started.get_or_insert_with(Instant::now);

        let client = client.clone();
        let request = request.clone();
        let tx = tx.clone();
        let attempt_timeout = config.timeout;
        let retry = config.retry;

        let handle = tokio::spawn(async move {
            let _permit = permit;
            let record = execute_request(client.as_ref(), index, &request, attempt_timeout, retry).await;
            let finished = Instant::now();
            tracing::debug!(
                index,
                latency_ms = record.latency().as_millis() as u64,
                status = %record.status(),
                "request completed"
            );
            // Receiver gone means nobody is listening; the run still drains.
            let _ = tx.send(record);
            finished
        });
        handles.push((index, handle));
    }

    let issued = handles.len();
    let mut last_completion = started;
    for (index, handle) in handles {
        match handle.await {
            Ok(finished) => {
                last_completion = last_completion.max(Some(finished));
            }
            Err(e) => {
                let record = RequestRecord::failure(
                    index,
                    Duration::ZERO,
                    &RequestError::Other(format!("Task join error: {}", e)),
                );
                let _ = tx.send(record);
                last_completion = last_completion.max(Some(Instant::now()));
            }
        }
    }

    let elapsed = match (started, last_completion) {
        (Some(start), Some(end)) => end.duration_since(start),
        _ => Duration::ZERO,
    };

    if cancelled {
        tracing::warn!(issued, requested = config.requests, "dispatch cancelled");
    }
    tracing::info!(issued, elapsed_ms = elapsed.as_millis() as u64, "dispatch finished");

    Ok(DispatchReport {
        issued,
        completed: issued,
        cancelled,
        elapsed,
    })
}

/// Run a request, retrying failed tries per `retry`, and turn the final
/// outcome into a record.
///
/// Each try is bounded by `attempt_timeout` on its own. The recorded latency
/// spans every try and the backoff between them.
async fn execute_request<C: TargetClient + ?Sized>(
    client: &C,
    index: usize,
    request: &GenerateRequest,
    attempt_timeout: Duration,
    retry: RetryPolicy,
) -> RequestRecord {
    let start = Instant::now();
    let mut attempt = 0;
    let outcome = loop {
        let result = match timeout(attempt_timeout, client.send_request(index, request)).await {
            Ok(result) => result,
            Err(_) => Err(RequestError::Timeout),
        };
        match result {
            Err(e) if attempt < retry.retries => {
                tracing::debug!(index, attempt, error = %e, "retrying request");
                sleep(retry.backoff(attempt)).await;
                attempt += 1;
            }
            result => break result,
        }
    };
    let latency = start.elapsed();

    match outcome {
        Ok(completion) => RequestRecord::success(index, latency, completion),
        Err(e) => RequestRecord::failure(index, latency, &e),
    }
}
