use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::constants; // For OLLAMA_URL, IROCA_CHAT_MODEL and CHAT_TIMEOUT
use crate::error::ChatServiceError;

/// One role-tagged message sent to the chat service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// A stateless chat completion service: the whole transcript goes out on
/// every call and the assistant's text comes back.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, ChatServiceError>;

    fn model_name(&self) -> &str;
}

// Structures matching Ollama's /api/chat endpoint
#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool, // We want the full response, not a stream
}

#[derive(Deserialize, Debug)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
    // done, timings etc. are ignored
}

#[derive(Deserialize, Debug)]
struct OllamaResponseMessage {
    content: String,
}

/// Ollama chat client.
#[derive(Clone, Debug)]
pub struct OllamaChat {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaChat {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ChatServiceError> {
        let base_url = base_url.into();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ChatServiceError::Transport {
                url: base_url.clone(),
                source,
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    /// Client configured from the environment defaults.
    pub fn from_env() -> Result<Self, ChatServiceError> {
        Self::new(
            constants::OLLAMA_URL.as_str(),
            constants::IROCA_CHAT_MODEL.as_str(),
            *constants::CHAT_TIMEOUT,
        )
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }
}

#[async_trait]
impl ChatBackend for OllamaChat {
    #[instrument(skip(self, messages), fields(model = %self.model, messages = messages.len()))]
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, ChatServiceError> {
        let url = self.chat_url();
        let request_payload = OllamaChatRequest {
            model: &self.model,
            messages,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&request_payload)
            .send()
            .await
            .map_err(|source| {
                if source.is_timeout() {
                    ChatServiceError::Timeout { url: url.clone() }
                } else {
                    ChatServiceError::Transport {
                        url: url.clone(),
                        source,
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %error_body, "Ollama API request failed");
            return Err(ChatServiceError::Status {
                status: status.as_u16(),
                body: error_body,
            });
        }

        let ollama_response = response
            .json::<OllamaChatResponse>()
            .await
            .map_err(|e| ChatServiceError::InvalidResponse(e.to_string()))?;

        debug!(response = ?ollama_response.message.content, "Received Ollama response");
        Ok(ollama_response.message.content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
