/// Summary formatters.
use crate::error::AppError;
use crate::stats::{format_timestamp, Summary};

/// Renders a finished summary for display.
pub trait Formatter {
    fn format_summary(&self, summary: &Summary) -> Result<String, AppError>;
}

/// Fixed-field `key: value` block, one line per summary field.
pub struct TextFormatter;

/// Pretty-printed JSON object; undefined values become `null`.
pub struct JsonFormatter;

const UNDEFINED: &str = "NA";

fn opt(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{:.*}", precision, v))
        .unwrap_or_else(|| UNDEFINED.to_string())
}

impl Formatter for TextFormatter {
    fn format_summary(&self, summary: &Summary) -> Result<String, AppError> {
        let fields = [
            ("timestamp", format_timestamp(&summary.timestamp)),
            ("model", summary.model.clone()),
            ("host", summary.host.clone()),
            ("concurrency", summary.concurrency.to_string()),
            ("requests", summary.requests.to_string()),
            ("prompt_len", summary.prompt_len.to_string()),
            ("tokens", summary.tokens.to_string()),
            ("p50_latency", opt(summary.p50_latency, 4)),
            ("p95_latency", opt(summary.p95_latency, 4)),
            ("rps", opt(summary.rps, 2)),
            ("error_rate", opt(summary.error_rate, 4)),
            ("total_time", format!("{:.3}", summary.total_time)),
        ];

        let mut output = vec!["――― Summary ―――".to_string()];
        output.extend(
            fields
                .iter()
                .map(|(key, value)| format!("{:>15}: {}", key, value)),
        );
        Ok(output.join("\n"))
    }
}

impl Formatter for JsonFormatter {
    fn format_summary(&self, summary: &Summary) -> Result<String, AppError> {
        Ok(serde_json::to_string_pretty(summary)?)
    }
}

/// One line per sweep level: `  8c | p95=1.23s | err=0.0% | rps=4.56`.
pub fn format_sweep_line(summary: &Summary) -> String {
    let p95 = summary
        .p95_latency
        .map(|v| format!("{:.2}s", v))
        .unwrap_or_else(|| UNDEFINED.to_string());
    let err = summary
        .error_rate
        .map(|v| format!("{:.1}%", v * 100.0))
        .unwrap_or_else(|| UNDEFINED.to_string());

    format!(
        "{:>3}c | p95={} | err={} | rps={}",
        summary.concurrency,
        p95,
        err,
        opt(summary.rps, 2)
    )
}
