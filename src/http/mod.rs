/// HTTP clients for the benchmarked endpoint.
pub mod client;
pub mod providers;

pub use client::{ClientConfig, GenerateRequest, TargetClient};
pub use providers::ollama::OllamaClient;
