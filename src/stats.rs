//! Latency and throughput aggregation.
//!
//! Percentiles use linear interpolation between closest ranks: for the
//! ascending sorted successful latencies `v` of length `n`, the value at
//! fraction `p` sits at rank `h = p * (n - 1)` and is
//! `v[floor(h)] + (h - floor(h)) * (v[floor(h) + 1] - v[floor(h)])`.
//! So `[1, 2, 3, 4]` gives p50 = 2.5 and p95 = 3.85.
use crate::record::RequestRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::time::Duration;

/// Run parameters copied verbatim into the summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetadata {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub host: String,
    pub concurrency: usize,
    pub requests: usize,
    pub prompt_len: usize,
    pub tokens: u32,
}

/// Aggregate report of one run.
///
/// `None` means undefined: no successful requests for the percentiles,
/// zero elapsed time for `rps`, no completed requests for `error_rate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    #[serde(serialize_with = "rfc3339")]
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub host: String,
    pub concurrency: usize,
    pub requests: usize,
    pub prompt_len: usize,
    pub tokens: u32,
    pub p50_latency: Option<f64>,
    pub p95_latency: Option<f64>,
    pub rps: Option<f64>,
    pub error_rate: Option<f64>,
    pub total_time: f64,
}

/// Build the summary for a set of records.
///
/// Pure: the same records, metadata and span always give the same summary.
/// `error_rate` and `rps` are computed over the records actually completed,
/// which is N for a run that was not cancelled.
pub fn summarize(records: &[RequestRecord], meta: &RunMetadata, total_time: Duration) -> Summary {
    let mut latencies: Vec<f64> = records
        .iter()
        .filter(|r| r.is_success())
        .map(|r| r.latency_secs())
        .collect();
    latencies.sort_by(f64::total_cmp);

    let completed = records.len();
    let failures = records.iter().filter(|r| !r.is_success()).count();
    let total_secs = total_time.as_secs_f64();

    Summary {
        timestamp: meta.timestamp,
        model: meta.model.clone(),
        host: meta.host.clone(),
        concurrency: meta.concurrency,
        requests: meta.requests,
        prompt_len: meta.prompt_len,
        tokens: meta.tokens,
        p50_latency: percentile(&latencies, 0.50),
        p95_latency: percentile(&latencies, 0.95),
        rps: (total_secs > 0.0).then(|| completed as f64 / total_secs),
        error_rate: (completed > 0).then(|| failures as f64 / completed as f64),
        total_time: total_secs,
    }
}

/// Percentile of an ascending slice, `p` in `[0, 1]`.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = p.clamp(0.0, 1.0) * last as f64;
    let lower = rank.floor() as usize;
    let upper = (lower + 1).min(last);
    let frac = rank - lower as f64;
    Some(sorted[lower] + frac * (sorted[upper] - sorted[lower]))
}

/// Collects records as they stream in from the dispatcher.
#[derive(Debug, Default)]
pub struct Aggregator {
    records: Vec<RequestRecord>,
    failures: usize,
}

impl Aggregator {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            failures: 0,
        }
    }

    pub fn push(&mut self, record: RequestRecord) {
        if !record.is_success() {
            self.failures += 1;
        }
        self.records.push(record);
    }

    pub fn completed(&self) -> usize {
        self.records.len()
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Error rate over what has completed so far.
    pub fn running_error_rate(&self) -> Option<f64> {
        (!self.records.is_empty()).then(|| self.failures as f64 / self.records.len() as f64)
    }

    pub fn records(&self) -> &[RequestRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<RequestRecord> {
        self.records
    }

    pub fn summarize(&self, meta: &RunMetadata, total_time: Duration) -> Summary {
        summarize(&self.records, meta, total_time)
    }
}

fn rfc3339<S: serde::Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(value))
}

/// UTC timestamp with seconds precision, e.g. `2024-05-01T12:00:00Z`.
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RequestError;
    use crate::record::Completion;
    use chrono::TimeZone;

    fn meta(requests: usize) -> RunMetadata {
        RunMetadata {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            model: "llama3:8b".into(),
            host: "http://127.0.0.1:11434".into(),
            concurrency: 4,
            requests,
            prompt_len: 30,
            tokens: 128,
        }
    }

    fn ok(index: usize, secs: f64) -> RequestRecord {
        RequestRecord::success(
            index,
            Duration::from_secs_f64(secs),
            Completion {
                code: 200,
                tokens: Some(5),
                service_duration: None,
            },
        )
    }

    fn failed(index: usize, secs: f64) -> RequestRecord {
        RequestRecord::failure(index, Duration::from_secs_f64(secs), &RequestError::Timeout)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn percentiles_interpolate_linearly() {
        let records = vec![ok(0, 3.0), ok(1, 1.0), ok(2, 4.0), ok(3, 2.0)];
        let summary = summarize(&records, &meta(4), Duration::from_secs(4));

        assert!(close(summary.p50_latency.unwrap(), 2.5));
        assert!(close(summary.p95_latency.unwrap(), 3.85));
    }

    #[test]
    fn single_sample_is_every_percentile() {
        assert_eq!(percentile(&[0.7], 0.5), Some(0.7));
        assert_eq!(percentile(&[0.7], 0.95), Some(0.7));
        assert_eq!(percentile(&[], 0.5), None);
    }

    #[test]
    fn percentile_bounds_hit_extremes() {
        let sorted = [1.0, 2.0, 3.0];
        assert_eq!(percentile(&sorted, 0.0), Some(1.0));
        assert_eq!(percentile(&sorted, 1.0), Some(3.0));
    }

    #[test]
    fn failures_are_excluded_from_percentiles() {
        let records = vec![ok(0, 1.0), failed(1, 100.0), ok(2, 3.0)];
        let summary = summarize(&records, &meta(3), Duration::from_secs(3));
        assert!(close(summary.p50_latency.unwrap(), 2.0));
    }

    #[test]
    fn zero_successes_leave_percentiles_undefined() {
        let records = vec![failed(0, 1.0), failed(1, 2.0)];
        let summary = summarize(&records, &meta(2), Duration::from_secs(2));

        assert_eq!(summary.p50_latency, None);
        assert_eq!(summary.p95_latency, None);
        assert_eq!(summary.error_rate, Some(1.0));
    }

    #[test]
    fn zero_elapsed_leaves_rps_undefined() {
        let summary = summarize(&[ok(0, 0.0)], &meta(1), Duration::ZERO);
        assert_eq!(summary.rps, None);
        assert_eq!(summary.total_time, 0.0);
    }

    #[test]
    fn no_records_leave_error_rate_undefined() {
        let summary = summarize(&[], &meta(10), Duration::from_millis(5));
        assert_eq!(summary.error_rate, None);
        assert_eq!(summary.rps, Some(0.0));
    }

    #[test]
    fn error_rate_is_exact_for_mixed_outcomes() {
        let records: Vec<_> = (0..8)
            .map(|i| if i % 4 == 0 { failed(i, 0.5) } else { ok(i, 0.5) })
            .collect();
        let summary = summarize(&records, &meta(8), Duration::from_secs(2));

        assert_eq!(summary.error_rate, Some(0.25));
        assert!(close(summary.rps.unwrap(), 4.0));
    }

    #[test]
    fn summarize_is_deterministic() {
        let records = vec![ok(0, 0.3), failed(1, 0.1), ok(2, 0.2)];
        let first = summarize(&records, &meta(3), Duration::from_millis(600));
        let second = summarize(&records, &meta(3), Duration::from_millis(600));
        assert_eq!(first, second);
    }

    #[test]
    fn aggregator_tracks_running_error_rate() {
        let mut agg = Aggregator::with_capacity(4);
        assert_eq!(agg.running_error_rate(), None);

        agg.push(ok(0, 0.1));
        agg.push(failed(1, 0.1));
        assert_eq!(agg.completed(), 2);
        assert_eq!(agg.failures(), 1);
        assert_eq!(agg.running_error_rate(), Some(0.5));

        let summary = agg.summarize(&meta(4), Duration::from_secs(1));
        assert_eq!(summary, summarize(agg.records(), &meta(4), Duration::from_secs(1)));
    }

    #[test]
    fn timestamp_formats_with_seconds_precision() {
        let summary = summarize(&[], &meta(1), Duration::from_secs(1));
        assert_eq!(format_timestamp(&summary.timestamp), "2024-05-01T12:00:00Z");
    }
}
