/// ollama-bench - Concurrency benchmark for Ollama-compatible LLM servers.
///
/// Issues N generate requests with at most C in flight and reports latency
/// percentiles, throughput and error rate.
use clap::Parser;
use ollama_bench::cli::Cli;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = cli.run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Log to stderr so the summary on stdout stays machine-readable.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "ollama_bench=warn",
        1 => "ollama_bench=info",
        _ => "ollama_bench=debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
