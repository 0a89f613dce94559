/// ollama-bench library - exposes the dispatcher, aggregator and driver for
/// testing and embedding.
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod http;
pub mod output;
pub mod record;
pub mod stats;
pub mod sweep;
