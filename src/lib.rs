//! Hybrid PII detection and redaction pipeline.
//!
//! textveil accepts free-form text (coaching transcripts, assessments,
//! session notes), identifies spans containing personally identifiable
//! information, replaces them with typed placeholders, and returns an
//! audit record describing what was detected, by which method, and at
//! what cost.
//!
//! Detection is hybrid: compiled regex patterns handle well-structured
//! identifiers (emails, phone numbers, SSNs, card numbers, IPs, ZIPs)
//! with full confidence, while a chat-completion model finds semantic
//! entities (names, addresses, medical/financial/employer references)
//! with the regex-covered regions masked out of the prompt. Long inputs
//! are split at natural boundaries and processed in parallel under a
//! concurrency bound, with per-request adaptive timeouts and retry with
//! exponential backoff against the provider.
//!
//! The pipeline never fails: on any degradation the caller receives the
//! original text together with a diagnostic audit.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use secrecy::SecretString;
//! use textveil::{
//!     OpenAiChatClient, OpenAiChatConfig, ScrubConfig, Scrubber,
//! };
//!
//! # async fn example() {
//! let client = Arc::new(OpenAiChatClient::new(OpenAiChatConfig {
//!     base_url: "https://api.openai.com".to_string(),
//!     api_key: SecretString::from("sk-..."),
//! }));
//! let scrubber = Scrubber::new(ScrubConfig::default()).with_llm_client(client);
//!
//! let result = scrubber
//!     .scrub("Email me at jane@example.com", "transcript", None)
//!     .await;
//! assert_eq!(result.content, "Email me at [EMAIL]");
//! # }
//! ```

pub mod audit;
pub mod chunk;
pub mod config;
pub mod detect;
pub mod entity;
pub mod error;
pub mod expense;
pub mod llm;
pub mod merge;
pub mod redact;
pub mod scrubber;

pub use audit::{Audit, AuditBuilder, AuditMethod, ChunkStats};
pub use chunk::{Chunk, Chunker};
pub use config::{ScrubConfig, ScrubOptions};
pub use detect::{LlmDetector, RegexDetector};
pub use entity::{Entity, EntityType, Method};
pub use error::{LlmError, ScrubError};
pub use expense::{ExpenseEvent, ExpenseTracker, MemoryExpenseTracker};
pub use llm::{
    ChatJsonRequest, ChatJsonResponse, ChatMessage, LlmClient, MockLlmClient, OpenAiChatClient,
    OpenAiChatConfig,
};
pub use redact::{RedactionStrategy, RedactionValidation, Redactor};
pub use scrubber::{ScrubResult, Scrubber};
