//! Scripted LLM client for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::llm::provider::{ChatJsonRequest, ChatJsonResponse, LlmClient, TokenUsage};

/// An [`LlmClient`] that replays a scripted sequence of outcomes.
///
/// Each call pops the next scripted outcome; an exhausted script yields an
/// empty entity list. Requests are recorded for assertions on prompts,
/// timeouts, and attempt numbers.
#[derive(Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<ChatJsonResponse, LlmError>>>,
    requests: Mutex<Vec<ChatJsonRequest>>,
}

impl MockLlmClient {
    /// Create a client with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful JSON response with default usage counts.
    pub fn push_json(&self, content: impl Into<String>) {
        self.push_json_with_usage(content, Some(TokenUsage {
            prompt_tokens: 100,
            completion_tokens: 20,
        }));
    }

    /// Queue a successful JSON response with explicit usage.
    pub fn push_json_with_usage(&self, content: impl Into<String>, usage: Option<TokenUsage>) {
        self.script
            .lock()
            .expect("mock script lock poisoned")
            .push_back(Ok(ChatJsonResponse {
                content: content.into(),
                usage,
            }));
    }

    /// Queue a failure.
    pub fn push_error(&self, error: LlmError) {
        self.script
            .lock()
            .expect("mock script lock poisoned")
            .push_back(Err(error));
    }

    /// Requests observed so far.
    pub fn requests(&self) -> Vec<ChatJsonRequest> {
        self.requests
            .lock()
            .expect("mock request lock poisoned")
            .clone()
    }

    /// Number of calls made.
    pub fn call_count(&self) -> usize {
        self.requests
            .lock()
            .expect("mock request lock poisoned")
            .len()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn chat_json(&self, req: ChatJsonRequest) -> Result<ChatJsonResponse, LlmError> {
        self.requests
            .lock()
            .expect("mock request lock poisoned")
            .push(req);
        let next = self
            .script
            .lock()
            .expect("mock script lock poisoned")
            .pop_front();
        match next {
            Some(outcome) => outcome,
            None => Ok(ChatJsonResponse {
                content: r#"{"entities": []}"#.to_string(),
                usage: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn request() -> ChatJsonRequest {
        ChatJsonRequest {
            model: "test-model".to_string(),
            messages: vec![],
            temperature: 0.0,
            timeout: Duration::from_secs(30),
            attempt: 0,
        }
    }

    #[test]
    fn test_script_replays_in_order() {
        tokio_test::block_on(async {
            let mock = MockLlmClient::new();
            mock.push_json(r#"{"entities": [1]}"#);
            mock.push_error(LlmError::RateLimited {
                provider: "mock".into(),
                retry_after: None,
            });

            assert!(mock.chat_json(request()).await.is_ok());
            assert!(mock.chat_json(request()).await.is_err());
            // Exhausted script falls back to an empty entity list.
            let fallback = mock.chat_json(request()).await.unwrap();
            assert_eq!(fallback.content, r#"{"entities": []}"#);
            assert_eq!(mock.call_count(), 3);
        });
    }
}
