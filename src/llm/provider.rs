//! LLM client abstraction consumed by the detector.
//!
//! The pipeline depends only on [`LlmClient`]; the bundled
//! [`crate::llm::OpenAiChatClient`] is the production implementation and
//! [`crate::llm::MockLlmClient`] drives tests.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::LlmError;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Wire name for OpenAI-compatible APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A JSON-mode chat completion request.
///
/// The provider must honor `response_format: json_object` semantics: the
/// returned `content` is expected to be a single JSON object.
#[derive(Debug, Clone)]
pub struct ChatJsonRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    /// Per-attempt deadline.
    pub timeout: Duration,
    /// Zero-based attempt number, for provider-side logging.
    pub attempt: u32,
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Response to a JSON-mode chat completion.
#[derive(Debug, Clone)]
pub struct ChatJsonResponse {
    /// The model's message content, expected to be a JSON object.
    pub content: String,
    /// Usage counts, when the provider reports them.
    pub usage: Option<TokenUsage>,
}

/// A chat-completion provider capable of strict-JSON responses.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a JSON-mode completion request.
    async fn chat_json(&self, req: ChatJsonRequest) -> Result<ChatJsonResponse, LlmError>;
}
