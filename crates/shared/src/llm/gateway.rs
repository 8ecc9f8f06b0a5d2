use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::Message;

pub type LlmStreamFuture<'a> =
    Pin<Box<dyn Future<Output = Result<LlmStreamSummary, LlmGatewayError>> + Send + 'a>>;

#[derive(Debug, Clone)]
pub struct LlmChatRequest {
    pub requester_id: Option<String>,
    pub system_prompt: String,
    pub messages: Vec<Message>,
}

impl LlmChatRequest {
    pub fn new(system_prompt: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            requester_id: None,
            system_prompt: system_prompt.into(),
            messages,
        }
    }

    pub fn with_requester_id(mut self, requester_id: impl AsRef<str>) -> Self {
        let trimmed = requester_id.as_ref().trim();
        if !trimmed.is_empty() {
            self.requester_id = Some(trimmed.to_string());
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmStreamSummary {
    pub model: String,
    pub provider_request_id: Option<String>,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum LlmGatewayError {
    #[error("llm provider request timed out")]
    Timeout,
    #[error("llm provider request failed: {0}")]
    ProviderFailure(String),
    #[error("llm provider returned an invalid payload: {0}")]
    InvalidProviderPayload(String),
    #[error("llm stream ended early: {0}")]
    StreamInterrupted(String),
}

/// Streaming chat completion. Text deltas are sent on `chunk_tx` as they
/// arrive; the future resolves once the provider closes the stream.
pub trait LlmGateway: Send + Sync {
    fn stream_chat<'a>(
        &'a self,
        request: LlmChatRequest,
        chunk_tx: mpsc::Sender<String>,
    ) -> LlmStreamFuture<'a>;
}
