//! LLM collaborator
//!
//! The orchestrator only sees the [`LlmClient`] trait: chat messages in,
//! text out. Retries and the process-wide concurrency cap live inside the
//! client; a returned [`LlmError`] means the request is finished and the
//! caller should treat the chunk as failed.

mod openai;
mod vision;

pub use openai::OpenAiClient;
pub use vision::{VisionDescriber, VISION_PROMPT};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classified LLM failures
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("{model} rate limited: {message}")]
    RateLimited { model: String, message: String },

    #[error("{model} client error {status}: {message}")]
    Client {
        model: String,
        status: u16,
        message: String,
    },

    #[error("{model} server error {status}: {message}")]
    Server {
        model: String,
        status: u16,
        message: String,
    },

    #[error("Unknown LLM error: {0}")]
    Unknown(String),

    #[error("LLM not configured: {0}")]
    NotConfigured(String),
}

impl LlmError {
    /// Whether another attempt could succeed
    ///
    /// Client errors (bad request, auth, payload too large) and missing
    /// configuration never get better by retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. } | LlmError::Server { .. } | LlmError::Unknown(_)
        )
    }
}

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Image reference inside a multimodal message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// One part of a multimodal message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// Message body: plain text or a list of parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    /// User message carrying an image followed by an instruction
    pub fn user_with_image(image_url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.into(),
                        detail: Some("high".to_string()),
                    },
                },
                ContentPart::Text { text: text.into() },
            ]),
        }
    }

    /// Text of the message, ignoring image parts
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Chat completion service
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Runs one chat completion and returns the reply text
    ///
    /// An empty string means the model answered with no content.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String, LlmError>;
}
