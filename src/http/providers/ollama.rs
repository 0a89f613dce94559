/// Ollama `/api/generate` client implementation.
use crate::error::{AppError, RequestError};
use crate::http::client::{ClientConfig, GenerateRequest, TargetClient};
use crate::record::Completion;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest response body kept when a request fails with a non-2xx status.
const MAX_BODY_LEN: usize = 200;

/// Ollama API client.
///
/// Owns one connection pool; share it across the run behind an `Arc`.
#[derive(Debug)]
pub struct OllamaClient {
    client: Client,
    config: ClientConfig,
}

/// Ollama generate request payload.
#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    num_predict: u32,
}

/// Fields of the non-streaming generate response that matter here.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    /// Generated tokens
    #[serde(default)]
    eval_count: Option<u64>,
    /// Total processing time in nanoseconds
    #[serde(default)]
    total_duration: Option<u64>,
}

impl OllamaClient {
    /// Create a new Ollama client.
    pub fn new(config: ClientConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn generate_endpoint(&self) -> String {
        self.config.url("/api/generate")
    }
}

#[async_trait::async_trait]
impl TargetClient for OllamaClient {
    async fn send_request(
        &self,
        _index: usize,
        request: &GenerateRequest,
    ) -> Result<Completion, RequestError> {
        let payload = OllamaRequest {
            model: &request.model,
            prompt: &request.prompt,
            stream: false,
            options: OllamaOptions {
                num_predict: request.max_tokens,
            },
        };

        let mut req = self.client.post(self.generate_endpoint());
        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }

        let response = req
            .json(&payload)
            .send()
            .await
            .map_err(|e| RequestError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(RequestError::Status {
                code: status.as_u16(),
                body: body.chars().take(MAX_BODY_LEN).collect(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RequestError::from_reqwest(&e))?;
        let parsed: OllamaResponse =
            serde_json::from_slice(&body).map_err(|e| RequestError::Decode(e.to_string()))?;

        Ok(Completion {
            code: status.as_u16(),
            tokens: parsed.eval_count,
            service_duration: parsed.total_duration.map(Duration::from_nanos),
        })
    }

    async fn preflight(&self) -> Result<(), RequestError> {
        let response = self
            .client
            .get(self.config.url("/"))
            .timeout(self.config.preflight_timeout.min(self.config.timeout))
            .send()
            .await
            .map_err(|e| RequestError::from_reqwest(&e))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(RequestError::Status {
                code: status.as_u16(),
                body: String::new(),
            })
        }
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }
}
