/// Target server implementations.
pub mod ollama;
