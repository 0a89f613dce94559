/// Append-only CSV persistence for records and summaries.
use crate::error::AppError;
use crate::record::RequestRecord;
use crate::stats::{format_timestamp, Summary};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Column header of the per-request file.
pub const RECORD_HEADER: &str = "latency,status,tokens,total_duration,error";

/// Column header of the sweep summary file.
pub const SUMMARY_HEADER: &str = "timestamp,model,host,concurrency,requests,prompt_len,tokens,p50_latency,p95_latency,rps,error_rate,total_time";

/// Streams one row per record; each row is flushed as it is written so an
/// aborted run still leaves everything that completed.
pub struct CsvSink<W: Write> {
    writer: W,
    rows: usize,
}

/// A sink backed by a file on disk.
pub type FileSink = CsvSink<BufWriter<File>>;

impl FileSink {
    /// Create (or truncate) the file at `path` and write the header.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let file = File::create(path.as_ref()).map_err(|e| {
            AppError::Io(std::io::Error::other(format!(
                "Failed to create {}: {}",
                path.as_ref().display(),
                e
            )))
        })?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> CsvSink<W> {
    pub fn new(mut writer: W) -> Result<Self, AppError> {
        writeln!(writer, "{}", RECORD_HEADER)?;
        writer.flush()?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn append(&mut self, record: &RequestRecord) -> Result<(), AppError> {
        let tokens = record.tokens().map(|t| t.to_string()).unwrap_or_default();
        writeln!(
            self.writer,
            "{:.6},{},{},{:.6},{}",
            record.latency_secs(),
            escape(&record.status().to_string()),
            tokens,
            record.total_duration().as_secs_f64(),
            escape(record.error())
        )?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Append one summary row, writing the header first if the file is new or
/// empty.
pub fn append_summary(path: impl AsRef<Path>, summary: &Summary) -> Result<(), AppError> {
    let path = path.as_ref();
    let needs_header = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if needs_header {
        writeln!(file, "{}", SUMMARY_HEADER)?;
    }

    let opt = |value: Option<f64>| value.map(|v| format!("{:.6}", v)).unwrap_or_default();
    writeln!(
        file,
        "{},{},{},{},{},{},{},{},{},{},{},{:.6}",
        format_timestamp(&summary.timestamp),
        escape(&summary.model),
        escape(&summary.host),
        summary.concurrency,
        summary.requests,
        summary.prompt_len,
        summary.tokens,
        opt(summary.p50_latency),
        opt(summary.p95_latency),
        opt(summary.rps),
        opt(summary.error_rate),
        summary.total_time
    )?;
    Ok(())
}

/// Quote a field when it contains a delimiter, quote or line break.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RequestError;
    use crate::record::Completion;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use tempfile::TempDir;

    fn summary(concurrency: usize) -> Summary {
        Summary {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            model: "gemma3:27b".into(),
            host: "http://127.0.0.1:11434".into(),
            concurrency,
            requests: 50,
            prompt_len: 30,
            tokens: 128,
            p50_latency: Some(1.5),
            p95_latency: None,
            rps: Some(3.0),
            error_rate: Some(0.0),
            total_time: 16.0,
        }
    }

    #[test]
    fn escape_quotes_only_when_needed() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a,b"), "\"a,b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn sink_writes_header_then_rows() {
        let mut sink = CsvSink::new(Vec::new()).unwrap();
        sink.append(&RequestRecord::success(
            0,
            Duration::from_millis(1500),
            Completion {
                code: 200,
                tokens: Some(42),
                service_duration: Some(Duration::from_millis(1400)),
            },
        ))
        .unwrap();
        sink.append(&RequestRecord::failure(
            1,
            Duration::from_millis(250),
            &RequestError::Connection("refused, retry later".into()),
        ))
        .unwrap();
        assert_eq!(sink.rows(), 2);

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], RECORD_HEADER);
        assert_eq!(lines[1], "1.500000,200,42,1.400000,");
        assert_eq!(
            lines[2],
            "0.250000,connection,,0.250000,\"connection error: refused, retry later\""
        );
    }

    #[test]
    fn sink_file_survives_without_explicit_close() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.csv");

        let mut sink = FileSink::create(&path).unwrap();
        sink.append(&RequestRecord::failure(
            0,
            Duration::from_secs(1),
            &RequestError::Timeout,
        ))
        .unwrap();

        // Read back while the sink is still open.
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("timeout"));
        drop(sink);
    }

    #[test]
    fn summaries_append_with_single_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sweep.csv");

        append_summary(&path, &summary(1)).unwrap();
        append_summary(&path, &summary(2)).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], SUMMARY_HEADER);
        assert_eq!(
            lines[1],
            "2024-05-01T12:00:00Z,gemma3:27b,http://127.0.0.1:11434,1,50,30,128,1.500000,,3.000000,0.000000,16.000000"
        );
        assert!(lines[2].contains(",2,50,"));
    }
}
