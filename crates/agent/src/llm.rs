//! Text-generation client over OpenAI-compatible chat completions

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

use pesto_core::config::LlmConfig;

const BASE_BACKOFF_MS: u64 = 250;
const MAX_BACKOFF_MS: u64 = 8_000;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("llm returned status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("llm response could not be parsed: {0}")]
    InvalidResponse(String),
    #[error("llm returned an empty completion")]
    EmptyCompletion,
    #[error("llm client misconfigured: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    /// Overrides the client's default model
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), ..Self::default() }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}

/// Chat-completions client for OpenAI and Ollama's compatible endpoint.
#[derive(Clone, Debug)]
pub struct OpenAiChatClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_retries: u32,
    base_backoff_ms: u64,
}

impl OpenAiChatClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(api_key) = &config.api_key {
            let api_key = api_key.expose_secret().trim();
            if !api_key.is_empty() {
                let bearer = format!("Bearer {api_key}");
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&bearer).map_err(|e| {
                        LlmError::Configuration(format!("invalid API key header: {e}"))
                    })?,
                );
            }
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            client,
            base_url: config.effective_base_url(),
            model: config.model.clone(),
            max_retries: config.max_retries,
            base_backoff_ms: BASE_BACKOFF_MS,
        })
    }

    pub fn with_retry(mut self, max_retries: u32, base_backoff_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.base_backoff_ms = base_backoff_ms;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn chat_completions_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            return base.to_string();
        }

        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl LlmClient for OpenAiChatClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let body = build_chat_body(model, &request);
        let url = self.chat_completions_url();

        for attempt in 0..=self.max_retries {
            let sent = self
                .client
                .post(&url)
                .header("x-pesto-retry-attempt", attempt.to_string())
                .json(&body)
                .send()
                .await;
            match sent {
                Ok(response) => {
                    let status = response.status();
                    let raw = response.text().await?;
                    if status.is_success() {
                        return parse_chat_response(&raw);
                    }

                    if attempt < self.max_retries && should_retry_status(status.as_u16()) {
                        let backoff_ms = backoff_ms(self.base_backoff_ms, attempt);
                        warn!(
                            event_name = "llm.retry",
                            status = status.as_u16(),
                            attempt,
                            backoff_ms,
                            "llm request failed, retrying"
                        );
                        sleep(Duration::from_millis(backoff_ms)).await;
                        continue;
                    }

                    return Err(LlmError::HttpStatus { status: status.as_u16(), body: raw });
                }
                Err(error) => {
                    if attempt < self.max_retries && (error.is_timeout() || error.is_connect()) {
                        let backoff_ms = backoff_ms(self.base_backoff_ms, attempt);
                        warn!(
                            event_name = "llm.retry",
                            error = %error,
                            attempt,
                            backoff_ms,
                            "llm transport error, retrying"
                        );
                        sleep(Duration::from_millis(backoff_ms)).await;
                        continue;
                    }
                    return Err(LlmError::Http(error));
                }
            }
        }

        Err(LlmError::InvalidResponse("retry loop exhausted".to_string()))
    }
}

fn build_chat_body(model: &str, request: &CompletionRequest) -> Value {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &request.system {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.push(json!({ "role": "user", "content": request.prompt }));

    let mut body = json!({ "model": model, "messages": messages });
    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }
    body
}

pub(crate) fn parse_chat_response(raw: &str) -> Result<String, LlmError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
    let content = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.pointer("/message/content"))
        .and_then(Value::as_str)
        .ok_or_else(|| LlmError::InvalidResponse("missing choices[0].message.content".to_string()))?
        .trim();

    if content.is_empty() {
        return Err(LlmError::EmptyCompletion);
    }
    Ok(content.to_string())
}

pub fn should_retry_status(status: u16) -> bool {
    status == 408 || status == 429 || status >= 500
}

pub fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(1_u64 << attempt.min(10)).min(MAX_BACKOFF_MS)
}
