/// CLI argument parsing and command execution.
use crate::config::{
    BenchConfig, DEFAULT_CONCURRENCY, DEFAULT_HOST, DEFAULT_MIN_SAMPLES, DEFAULT_PROMPT,
    DEFAULT_REQUESTS, DEFAULT_TIMEOUT_SECS, DEFAULT_TOKENS,
};
use crate::dispatcher::{cancellation, Canceller};
use crate::driver::run_benchmark;
use crate::error::AppError;
use crate::output::{format_sweep_line, Formatter, JsonFormatter, TextFormatter};
use crate::sweep::{
    run_sweep, SweepConfig, DEFAULT_ERROR_THRESHOLD, DEFAULT_LATENCY_THRESHOLD, DEFAULT_LEVELS,
    DEFAULT_SWEEP_REQUESTS,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// ollama-bench - Measure how many concurrent requests an LLM server can take.
#[derive(Parser, Debug)]
#[command(name = "ollama-bench")]
#[command(about = "Benchmark how many concurrent requests an Ollama server can handle")]
#[command(
    long_about = r#"ollama-bench - Concurrency benchmark for Ollama-compatible inference servers

Issues a fixed number of /api/generate requests while never letting more than
the configured number be in flight, then prints p50/p95 latency, requests per
second and error rate.

EXAMPLES:
  # Quick smoke test with defaults (32 parallel requests, 100 total)
  ollama-bench run --model llama3:8b

  # Custom settings, save per-request metrics to CSV
  ollama-bench run --model gemma3:27b -c 64 -n 1000 --tokens 256 --csv results.csv

  # Find the concurrency level where latency or errors blow up
  ollama-bench sweep --model gemma3:27b -c 1 2 4 8 16"#
)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one benchmark at a fixed concurrency
    Run(RunArgs),

    /// Run benchmarks over ascending concurrency levels
    Sweep(SweepArgs),
}

/// Arguments shared by both commands.
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Model identifier as known to Ollama, e.g. llama3:8b or gemma3:27b
    #[arg(short, long)]
    pub model: String,

    /// Base URL of the Ollama server
    #[arg(long, env = "OLLAMA_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Prompt text to send
    #[arg(long, default_value = DEFAULT_PROMPT)]
    pub prompt: String,

    /// Maximum tokens per response (num_predict)
    #[arg(long, default_value_t = DEFAULT_TOKENS)]
    pub tokens: u32,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Skip the reachability check before the first request
    #[arg(long)]
    pub no_preflight: bool,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Parallel requests
    #[arg(short, long, default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Total number of requests to send
    #[arg(short = 'n', long, default_value_t = DEFAULT_REQUESTS)]
    pub requests: usize,

    /// Write per-request metrics to this CSV file
    #[arg(long, value_name = "FILE")]
    pub csv: Option<PathBuf>,

    /// Extra tries for a failed request, each bounded by --timeout
    #[arg(long, default_value_t = 0)]
    pub retry: u32,

    /// Stop admitting requests once the error rate exceeds this fraction
    #[arg(long)]
    pub max_error_rate: Option<f64>,

    /// Completed requests needed before --max-error-rate applies
    #[arg(long, default_value_t = DEFAULT_MIN_SAMPLES)]
    pub min_samples: usize,

    /// Summary output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Args, Debug)]
pub struct SweepArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Concurrency levels to test
    #[arg(short = 'c', long = "concurrency-list", num_args = 1.., default_values_t = DEFAULT_LEVELS)]
    pub concurrency_list: Vec<usize>,

    /// Requests per concurrency level
    #[arg(short = 'n', long, default_value_t = DEFAULT_SWEEP_REQUESTS)]
    pub requests: usize,

    /// p95 latency threshold in seconds
    #[arg(long, default_value_t = DEFAULT_LATENCY_THRESHOLD)]
    pub latency_threshold: f64,

    /// Error-rate threshold
    #[arg(long, default_value_t = DEFAULT_ERROR_THRESHOLD)]
    pub error_threshold: f64,

    /// Append each level's summary to this CSV file
    #[arg(long, value_name = "FILE")]
    pub csv: Option<PathBuf>,
}

/// Summary output format options.
#[derive(Debug, Clone, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable key: value block
    Text,
    /// JSON output for scripting
    Json,
}

impl TargetArgs {
    fn bench_config(&self) -> BenchConfig {
        let mut config = BenchConfig::new(self.model.clone());
        config.host = self.host.clone();
        config.prompt = self.prompt.clone();
        config.tokens = self.tokens;
        config.timeout = Duration::from_secs(self.timeout);
        config.preflight = !self.no_preflight;
        config
    }
}

impl RunArgs {
    pub fn bench_config(&self) -> BenchConfig {
        let mut config = self.target.bench_config();
        config.concurrency = self.concurrency;
        config.requests = self.requests;
        config.csv = self.csv.clone();
        config.retry = self.retry;
        config.max_error_rate = self.max_error_rate;
        config.min_samples = self.min_samples;
        config.progress = !self.quiet;
        config
    }
}

impl SweepArgs {
    pub fn sweep_config(&self) -> SweepConfig {
        let mut base = self.target.bench_config();
        base.requests = self.requests;

        let mut config = SweepConfig::new(base);
        config.levels = self.concurrency_list.clone();
        config.latency_threshold = self.latency_threshold;
        config.error_threshold = self.error_threshold;
        config.csv = self.csv.clone();
        config
    }
}

impl Cli {
    /// Execute the CLI command.
    pub fn run(self) -> Result<(), AppError> {
        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| AppError::Runtime(format!("Failed to create async runtime: {}", e)))?;

        match self.command {
            Command::Run(args) => rt.block_on(Self::run_single(args)),
            Command::Sweep(args) => rt.block_on(Self::run_sweep(args)),
        }
    }

    /// Run one benchmark and print its summary.
    async fn run_single(args: RunArgs) -> Result<(), AppError> {
        let config = args.bench_config();
        config.validate()?;

        let (canceller, signal) = cancellation();
        Self::cancel_on_ctrl_c(canceller.clone());

        eprintln!(
            "Starting benchmark of '{}' at {} with {} requests at concurrency {}",
            config.model, config.host, config.requests, config.concurrency
        );

        let outcome = run_benchmark(&config, canceller, signal).await?;
        if outcome.report.cancelled {
            eprintln!(
                "Run stopped early: {} of {} requests completed",
                outcome.report.completed, config.requests
            );
        }

        let formatter: Box<dyn Formatter> = match args.format {
            OutputFormat::Text => Box::new(TextFormatter),
            OutputFormat::Json => Box::new(JsonFormatter),
        };
        println!("\n{}", formatter.format_summary(&outcome.summary)?);

        if let Some(path) = &config.csv {
            eprintln!("\nDetailed metrics written to {}", path.display());
        }
        Ok(())
    }

    /// Run a concurrency sweep and print one line per level.
    async fn run_sweep(args: SweepArgs) -> Result<(), AppError> {
        let config = args.sweep_config();
        config.validate()?;

        let (canceller, signal) = cancellation();
        Self::cancel_on_ctrl_c(canceller);

        for level in &config.levels {
            eprintln!("Queued {}-way concurrency", level);
        }

        let report = run_sweep(&config, signal).await?;

        println!("\n――― Sweep Summary ―――");
        for summary in &report.summaries {
            println!("{}", format_sweep_line(summary));
        }

        if report.interrupted {
            println!("\nSweep interrupted after {} level(s).", report.summaries.len());
        }
        match report.trouble_at {
            Some(level) => println!(
                "\nPerformance degrades starting from >= {} concurrent requests.",
                level
            ),
            None => println!("\nNo degradation detected within tested range."),
        }
        Ok(())
    }

    /// Stop admitting requests on Ctrl-C; in-flight requests still finish.
    fn cancel_on_ctrl_c(canceller: Canceller) {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, draining in-flight requests");
                canceller.cancel();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_run_arguments_with_defaults() {
        let cli = Cli::try_parse_from(["ollama-bench", "run", "--model", "llama3:8b"])
            .expect("run args should parse");

        let Command::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        let config = args.bench_config();

        assert_eq!(config.model, "llama3:8b");
        assert_eq!(config.concurrency, 32);
        assert_eq!(config.requests, 100);
        assert_eq!(config.tokens, 128);
        assert_eq!(config.prompt, DEFAULT_PROMPT);
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert!(config.preflight);
        assert!(config.progress);
        assert!(config.csv.is_none());
        assert_eq!(config.retry, 0);
        assert_eq!(args.format, OutputFormat::Text);
    }

    #[test]
    fn parse_run_arguments_with_overrides() {
        let cli = Cli::try_parse_from([
            "ollama-bench",
            "-vv",
            "run",
            "--model",
            "gemma3:27b",
            "--host",
            "http://gpu-box:11434",
            "-c",
            "64",
            "-n",
            "1000",
            "--prompt",
            "Explain TCP three-way handshake",
            "--tokens",
            "256",
            "--csv",
            "results.csv",
            "--max-error-rate",
            "0.2",
            "--retry",
            "3",
            "--format",
            "json",
            "--quiet",
            "--no-preflight",
        ])
        .expect("run args should parse with overrides");

        assert_eq!(cli.verbose, 2);
        let Command::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        let config = args.bench_config();

        assert_eq!(config.host, "http://gpu-box:11434");
        assert_eq!(config.concurrency, 64);
        assert_eq!(config.requests, 1000);
        assert_eq!(config.tokens, 256);
        assert_eq!(config.csv, Some(PathBuf::from("results.csv")));
        assert_eq!(config.max_error_rate, Some(0.2));
        assert_eq!(config.retry, 3);
        assert_eq!(config.dispatch_config().retry.retries, 3);
        assert!(!config.progress);
        assert!(!config.preflight);
        assert_eq!(args.format, OutputFormat::Json);
    }

    #[test]
    fn model_is_required() {
        assert!(Cli::try_parse_from(["ollama-bench", "run"]).is_err());
    }

    #[test]
    fn parse_sweep_arguments() {
        let cli = Cli::try_parse_from([
            "ollama-bench",
            "sweep",
            "--model",
            "llama3:8b",
            "-c",
            "4",
            "8",
            "12",
            "--latency-threshold",
            "10",
        ])
        .expect("sweep args should parse");

        let Command::Sweep(args) = cli.command else {
            panic!("expected sweep subcommand");
        };
        let config = args.sweep_config();

        assert_eq!(config.levels, vec![4, 8, 12]);
        assert_eq!(config.base.requests, 50);
        assert_eq!(config.latency_threshold, 10.0);
        assert_eq!(config.error_threshold, 0.05);
    }

    #[test]
    fn sweep_defaults_to_powers_of_two() {
        let cli = Cli::try_parse_from(["ollama-bench", "sweep", "--model", "m"]).unwrap();
        let Command::Sweep(args) = cli.command else {
            panic!("expected sweep subcommand");
        };
        assert_eq!(args.concurrency_list, vec![1, 2, 4, 8, 16, 32, 64]);
    }
}
