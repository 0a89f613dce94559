/// Output: per-request CSV sink and summary presentation.
pub mod csv;
pub mod summary;

pub use csv::{append_summary, CsvSink, FileSink};
pub use summary::{format_sweep_line, Formatter, JsonFormatter, TextFormatter};
