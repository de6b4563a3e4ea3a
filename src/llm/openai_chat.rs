//! OpenAI-compatible chat completions client.
//!
//! Speaks the standard `/v1/chat/completions` API with API key auth and
//! `response_format: json_object`. Any provider exposing this surface works.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::llm::provider::{
    ChatJsonRequest, ChatJsonResponse, ChatMessage, LlmClient, TokenUsage,
};

/// Configuration for [`OpenAiChatClient`].
#[derive(Debug, Clone)]
pub struct OpenAiChatConfig {
    /// API base URL, e.g. `https://api.openai.com`.
    pub base_url: String,
    /// Bearer token.
    pub api_key: SecretString,
}

/// OpenAI-compatible chat completions provider.
pub struct OpenAiChatClient {
    client: Client,
    config: OpenAiChatConfig,
}

const PROVIDER: &str = "openai_chat";

impl OpenAiChatClient {
    /// Create a new client.
    pub fn new(config: OpenAiChatConfig) -> Self {
        let client = Client::builder().build().unwrap_or_else(|_| Client::new());
        Self { client, config }
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl LlmClient for OpenAiChatClient {
    async fn chat_json(&self, req: ChatJsonRequest) -> Result<ChatJsonResponse, LlmError> {
        let url = self.api_url("chat/completions");
        let body = ChatCompletionRequest {
            model: req.model,
            messages: req.messages.iter().map(wire_message).collect(),
            temperature: req.temperature,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let timeout_ms = req.timeout.as_millis() as u64;
        tracing::debug!(attempt = req.attempt, timeout_ms, "sending chat completion request");

        let started = std::time::Instant::now();
        let response = self
            .client
            .post(&url)
            .timeout(req.timeout)
            .header(
                "Authorization",
                format!("Bearer {}", self.config.api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        provider: PROVIDER.to_string(),
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    }
                } else {
                    LlmError::RequestFailed {
                        provider: PROVIDER.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let response_text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(match status.as_u16() {
                401 => LlmError::AuthFailed {
                    provider: PROVIDER.to_string(),
                },
                400 => LlmError::InvalidRequest {
                    provider: PROVIDER.to_string(),
                    reason: response_text,
                },
                429 => LlmError::RateLimited {
                    provider: PROVIDER.to_string(),
                    retry_after,
                },
                _ => LlmError::RequestFailed {
                    provider: PROVIDER.to_string(),
                    reason: format!("HTTP {}: {}", status, response_text),
                },
            });
        }

        let parsed: ChatCompletionResponse =
            serde_json::from_str(&response_text).map_err(|e| LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: format!("JSON parse error: {}", e),
            })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: "no message content in response".to_string(),
            })?;

        let usage = parsed.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        });

        Ok(ChatJsonResponse { content, usage })
    }
}

fn wire_message(msg: &ChatMessage) -> ChatCompletionMessage {
    ChatCompletionMessage {
        role: msg.role.as_str(),
        content: msg.content.clone(),
    }
}

// OpenAI-compatible wire types.

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatCompletionMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
    usage: Option<ChatCompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: Option<ChatCompletionResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url_normalization() {
        let client = OpenAiChatClient::new(OpenAiChatConfig {
            base_url: "https://api.example.com/".to_string(),
            api_key: SecretString::from("sk-test"),
        });
        assert_eq!(
            client.api_url("/chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_response_parsing_shape() {
        let raw = r#"{
            "id": "cmpl-1",
            "choices": [{"message": {"role": "assistant", "content": "{\"entities\": []}"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 120, "completion_tokens": 8, "total_tokens": 128}
        }"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        let usage = parsed.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 120);
        assert_eq!(
            parsed.choices[0].message.as_ref().unwrap().content.as_deref(),
            Some("{\"entities\": []}")
        );
    }
}
