//! Chat model client for OpenAI-compatible endpoints.
//!
//! Defines the [`ChatModel`] seam the pipeline stages call through, a
//! reqwest-backed [`HttpChatModel`] implementation, and
//! [`complete_json`], which decodes a model reply into a typed value and
//! re-prompts the model a bounded number of times when the reply does
//! not match the expected schema.
//!
//! Retry policy mirrors the embedding client: 429 and 5xx responses and
//! network errors back off exponentially; other 4xx responses fail
//! immediately.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::{HttpConfig, ModelConfig};

/// Errors produced by chat model calls.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The endpoint returned a non-success HTTP status that is not
    /// retryable (or retries were exhausted).
    #[error("Chat API error {status}: {body}")]
    Api { status: u16, body: String },

    /// Network-level failure (connection refused, timeout, bad payload).
    #[error("Chat transport error: {0}")]
    Transport(String),

    /// The model replied, but the reply did not decode into the expected
    /// JSON shape even after corrective re-prompts.
    #[error("Model reply did not match the expected schema: {reason}")]
    SchemaViolation { reason: String, payload: String },
}

/// One message in a chat conversation.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A single chat completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Ask the endpoint for a JSON-object response format.
    pub json_mode: bool,
}

/// Seam between the pipeline stages and the model endpoint. Tests
/// substitute scripted implementations.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

/// Chat client for any OpenAI-compatible `/chat/completions` endpoint
/// (OpenAI, Ollama, vLLM, llama.cpp server).
pub struct HttpChatModel {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl HttpChatModel {
    pub fn new(models: &ModelConfig, http: &HttpConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: models.base_url.trim_end_matches('/').to_string(),
            api_key: models.api_key.clone(),
            client,
            max_retries: http.max_retries,
        })
    }

    fn request_body(request: &ChatRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if request.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        body
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let body = Self::request_body(request);
        let url = format!("{}/chat/completions", self.base_url);

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    let text = response
                        .text()
                        .await
                        .map_err(|e| LlmError::Transport(e.to_string()))?;

                    if status.is_success() {
                        // Some proxies return an HTML error page with a 200.
                        if text.trim_start().starts_with('<') {
                            return Err(LlmError::Transport(format!(
                                "Endpoint returned HTML instead of JSON (check {})",
                                url
                            )));
                        }
                        let json: serde_json::Value = serde_json::from_str(&text)
                            .map_err(|e| LlmError::Transport(format!("Bad JSON reply: {}", e)))?;
                        let content = json["choices"][0]["message"]["content"]
                            .as_str()
                            .ok_or_else(|| {
                                LlmError::Transport(
                                    "Reply has no choices[0].message.content".to_string(),
                                )
                            })?;
                        return Ok(content.to_string());
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(LlmError::Api {
                            status: status.as_u16(),
                            body: text,
                        });
                        continue;
                    }

                    return Err(LlmError::Api {
                        status: status.as_u16(),
                        body: text,
                    });
                }
                Err(e) => {
                    last_err = Some(LlmError::Transport(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| LlmError::Transport("Chat completion failed after retries".into())))
    }
}

/// Strip Markdown code fences some models wrap JSON replies in.
pub fn strip_json_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// Run a chat completion and decode the reply into `T`.
///
/// When the reply fails to decode, the bad reply and a corrective user
/// message are appended to the conversation and the model is asked
/// again, up to `schema_retries` extra attempts. The final failure
/// surfaces as [`LlmError::SchemaViolation`] carrying the last payload.
pub async fn complete_json<T: DeserializeOwned>(
    chat: &dyn ChatModel,
    mut request: ChatRequest,
    schema_retries: u32,
) -> Result<T, LlmError> {
    let mut last_reason = String::new();
    let mut last_payload = String::new();

    for attempt in 0..=schema_retries {
        let reply = chat.complete(&request).await?;
        let cleaned = strip_json_fences(&reply);

        match serde_json::from_str::<T>(cleaned) {
            Ok(value) => return Ok(value),
            Err(e) => {
                last_reason = e.to_string();
                last_payload = cleaned.to_string();

                if attempt < schema_retries {
                    request.messages.push(ChatMessage::assistant(reply.clone()));
                    request.messages.push(ChatMessage::user(format!(
                        "Your previous reply was not valid: {}. \
                         Reply again with ONLY the JSON object in the requested shape, \
                         with no extra fields and no surrounding text.",
                        e
                    )));
                }
            }
        }
    }

    Err(LlmError::SchemaViolation {
        reason: last_reason,
        payload: last_payload,
    })
}
