//! LLM client abstraction and implementations.
//!
//! The detector consumes the [`LlmClient`] trait. [`OpenAiChatClient`]
//! speaks the OpenAI-compatible chat completions API with JSON response
//! mode; [`MockLlmClient`] replays scripted outcomes for tests.

mod mock;
mod openai_chat;
mod provider;

pub use mock::MockLlmClient;
pub use openai_chat::{OpenAiChatClient, OpenAiChatConfig};
pub use provider::{ChatJsonRequest, ChatJsonResponse, ChatMessage, LlmClient, Role, TokenUsage};
