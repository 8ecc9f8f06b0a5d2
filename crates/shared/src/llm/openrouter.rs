use std::time::Duration;

use eventsource_stream::{EventStreamError, Eventsource};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use super::gateway::{
    LlmChatRequest, LlmGateway, LlmGatewayError, LlmStreamFuture, LlmStreamSummary,
};
use crate::config_env::optional_trimmed_env;

const DEFAULT_CHAT_COMPLETIONS_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";

#[derive(Debug, Clone)]
pub struct OpenRouterGatewayConfig {
    pub chat_completions_url: String,
    pub api_key: String,
    pub timeout_ms: u64,
    pub model: String,
}

impl OpenRouterGatewayConfig {
    pub fn from_env() -> Result<Self, OpenRouterConfigError> {
        let api_key = optional_trimmed_env("OPENROUTER_API_KEY")
            .ok_or_else(|| OpenRouterConfigError::MissingVar("OPENROUTER_API_KEY".to_string()))?;
        let chat_completions_url = optional_trimmed_env("OPENROUTER_CHAT_COMPLETIONS_URL")
            .unwrap_or_else(|| DEFAULT_CHAT_COMPLETIONS_URL.to_string());
        if !chat_completions_url.starts_with("http://")
            && !chat_completions_url.starts_with("https://")
        {
            return Err(OpenRouterConfigError::InvalidConfiguration(
                "OPENROUTER_CHAT_COMPLETIONS_URL must start with http:// or https://".to_string(),
            ));
        }

        let timeout_ms = match optional_trimmed_env("OPENROUTER_TIMEOUT_MS") {
            Some(value) => value
                .parse::<u64>()
                .map_err(|_| OpenRouterConfigError::ParseInt {
                    key: "OPENROUTER_TIMEOUT_MS".to_string(),
                    value,
                })?,
            None => DEFAULT_TIMEOUT_MS,
        };

        Ok(Self {
            chat_completions_url,
            api_key,
            timeout_ms,
            model: optional_trimmed_env("OPENROUTER_MODEL")
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }
}

#[derive(Debug, Error)]
pub enum OpenRouterConfigError {
    #[error("missing required env var {0}")]
    MissingVar(String),
    #[error("invalid integer in env var {key}: {value}")]
    ParseInt { key: String, value: String },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("failed to build OpenRouter http client: {0}")]
    HttpClient(String),
}

/// OpenAI-compatible streaming chat completions over server-sent events.
/// A failed stream is never retried; whatever was forwarded stays forwarded.
#[derive(Clone)]
pub struct OpenRouterGateway {
    client: reqwest::Client,
    config: OpenRouterGatewayConfig,
}

impl OpenRouterGateway {
    pub fn new(config: OpenRouterGatewayConfig) -> Result<Self, OpenRouterConfigError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| OpenRouterConfigError::HttpClient(err.to_string()))?;

        Ok(Self { client, config })
    }

    fn request_body(&self, request: &LlmChatRequest) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(json!({ "role": "system", "content": request.system_prompt }));
        messages.extend(
            request
                .messages
                .iter()
                .map(|message| json!({ "role": message.role, "content": message.content })),
        );

        let mut body = json!({
            "model": self.config.model,
            "messages": messages,
            "stream": true,
        });
        if let Some(requester_id) = request.requester_id.as_deref() {
            body["user"] = json!(requester_id);
        }
        body
    }

    async fn stream_once(
        &self,
        request: LlmChatRequest,
        chunk_tx: mpsc::Sender<String>,
    ) -> Result<LlmStreamSummary, LlmGatewayError> {
        let response = self
            .client
            .post(&self.config.chat_completions_url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(&request))
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    LlmGatewayError::Timeout
                } else {
                    LlmGatewayError::ProviderFailure("request_unavailable".to_string())
                }
            })?;

        let status = response.status();
        let mut provider_request_id = header_request_id(response.headers());
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmGatewayError::ProviderFailure(format!(
                "status={} code={}",
                status.as_u16(),
                parse_provider_error_code(&body)
            )));
        }

        let mut events = response.bytes_stream().eventsource();
        let mut text = String::new();
        let mut model = None;
        let mut finished = false;

        while let Some(event) = events.next().await {
            let event = event.map_err(|err| match err {
                EventStreamError::Transport(err) if err.is_timeout() => LlmGatewayError::Timeout,
                EventStreamError::Transport(_) => {
                    LlmGatewayError::StreamInterrupted("body_read_failed".to_string())
                }
                EventStreamError::Utf8(_) | EventStreamError::Parser(_) => {
                    LlmGatewayError::InvalidProviderPayload("stream_framing_invalid".to_string())
                }
            })?;

            match parse_event_data(&event.data)? {
                StreamData::Done => {
                    finished = true;
                    break;
                }
                StreamData::Chunk(chunk) => {
                    if provider_request_id.is_none() {
                        provider_request_id = chunk.id;
                    }
                    if model.is_none() {
                        model = chunk.model;
                    }

                    for choice in chunk.choices {
                        if let Some(content) = choice.delta.and_then(|delta| delta.content)
                            && !content.is_empty()
                        {
                            text.push_str(&content);
                            let _ = chunk_tx.send(content).await;
                        }
                        if choice.finish_reason.is_some() {
                            finished = true;
                        }
                    }
                }
            }
        }

        if !finished {
            return Err(LlmGatewayError::StreamInterrupted(
                "stream_closed_before_completion".to_string(),
            ));
        }

        debug!(
            model = model.as_deref().unwrap_or(self.config.model.as_str()),
            chars = text.len(),
            "llm stream completed"
        );

        Ok(LlmStreamSummary {
            model: model.unwrap_or_else(|| self.config.model.clone()),
            provider_request_id,
            text,
        })
    }
}

impl LlmGateway for OpenRouterGateway {
    fn stream_chat<'a>(
        &'a self,
        request: LlmChatRequest,
        chunk_tx: mpsc::Sender<String>,
    ) -> LlmStreamFuture<'a> {
        Box::pin(self.stream_once(request, chunk_tx))
    }
}

enum StreamData {
    Done,
    Chunk(StreamChunk),
}

/// Interprets the `data` of one server-sent event. Comments and keep-alives
/// never reach here; the event parser drops them.
fn parse_event_data(data: &str) -> Result<StreamData, LlmGatewayError> {
    if data.trim() == "[DONE]" {
        return Ok(StreamData::Done);
    }

    let chunk = serde_json::from_str::<StreamChunk>(data).map_err(|_| {
        LlmGatewayError::InvalidProviderPayload("stream_chunk_parse_failed".to_string())
    })?;

    if let Some(error) = chunk.error {
        return Err(LlmGatewayError::ProviderFailure(format!(
            "stream_error code={}",
            provider_code_string(error.code)
        )));
    }

    Ok(StreamData::Chunk(chunk))
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    id: Option<String>,
    model: Option<String>,
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<ProviderErrorDetails>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetails {
    code: Option<Value>,
}

fn header_request_id(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
}

fn parse_provider_error_code(body: &str) -> String {
    #[derive(Deserialize)]
    struct ProviderErrorEnvelope {
        error: Option<ProviderErrorDetails>,
    }

    let code = serde_json::from_str::<ProviderErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error)
        .and_then(|details| details.code);
    provider_code_string(code)
}

fn provider_code_string(code: Option<Value>) -> String {
    match code {
        Some(Value::String(code)) => code,
        Some(Value::Number(code)) => code.to_string(),
        _ => "unknown".to_string(),
    }
}
