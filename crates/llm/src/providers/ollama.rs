//! Ollama generation provider.
//!
//! Talks to the local Ollama runtime through `/api/generate` with streaming
//! disabled. Each attempt runs under the configured deadline; failed attempts
//! are retried after a fixed delay.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use regcite_core::config::LlmSettings;
use regcite_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const GENERATE_ENDPOINT: &str = "/api/generate";

/// Sampling options nested under `options` in the Ollama payload.
#[derive(Debug, Serialize, PartialEq)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Ollama API request format.
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    options: OllamaOptions,
    stream: bool,
}

/// Ollama API response format.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    model: String,
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

/// Ollama generation client.
pub struct OllamaClient {
    /// Base URL for Ollama API
    base_url: String,

    /// HTTP client
    client: reqwest::Client,

    /// Deadline for one attempt
    timeout: Duration,

    /// Attempts before the last error is surfaced
    max_attempts: u32,

    /// Pause between attempts
    retry_delay: Duration,
}

impl OllamaClient {
    /// Create a client against the default local endpoint.
    pub fn new() -> Self {
        Self::from_settings(&LlmSettings::default())
    }

    /// Create a client from generation settings.
    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self {
            base_url: settings.endpoint.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(settings.timeout_secs),
            max_attempts: settings.max_attempts.max(1),
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
        }
    }

    /// Convert LlmRequest to Ollama format.
    fn to_ollama_request(&self, request: &LlmRequest) -> OllamaRequest {
        OllamaRequest {
            model: request.model.clone(),
            prompt: request.prompt.clone(),
            system: request.system.clone(),
            options: OllamaOptions {
                temperature: request.temperature,
                top_p: request.top_p,
                num_predict: request.max_tokens,
            },
            stream: false,
        }
    }

    fn convert_response(&self, response: OllamaResponse) -> LlmResponse {
        let usage = LlmUsage::new(
            response.prompt_eval_count.unwrap_or(0),
            response.eval_count.unwrap_or(0),
        );

        LlmResponse {
            content: response.response,
            model: response.model,
            usage,
        }
    }

    /// One request, bounded by the per-attempt deadline.
    async fn send_once(&self, payload: &OllamaRequest) -> AppResult<LlmResponse> {
        let url = format!("{}{}", self.base_url, GENERATE_ENDPOINT);

        let call = async {
            let response = self
                .client
                .post(&url)
                .json(payload)
                .send()
                .await
                .map_err(|e| AppError::Llm(format!("Failed to send request to Ollama: {}", e)))?;

            if !response.status().is_success() {
                let status = response.status();
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(AppError::Llm(format!(
                    "Ollama API error ({}): {}",
                    status, error_text
                )));
            }

            response
                .json::<OllamaResponse>()
                .await
                .map_err(|e| AppError::Llm(format!("Failed to parse Ollama response: {}", e)))
        };

        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map(|body| self.convert_response(body)),
            Err(_) => Err(AppError::timeout("generation", self.timeout)),
        }
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    #[instrument(skip(self, request), fields(model = %request.model, prompt_len = request.prompt.len()))]
    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let payload = self.to_ollama_request(request);
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match self.send_once(&payload).await {
                Ok(response) => {
                    info!(attempt, "Received completion from Ollama");
                    debug!(
                        prompt_tokens = response.usage.prompt_tokens,
                        completion_tokens = response.usage.completion_tokens,
                        "Completion usage"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    warn!(
                        "Generation failed (attempt {}/{}): {}",
                        attempt, self.max_attempts, e
                    );
                    last_error = Some(e);

                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::Llm("No generation attempt was made".to_string())))
    }
}
