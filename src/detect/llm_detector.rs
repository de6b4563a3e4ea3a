//! Context-aware PII detection through a chat-completion model.
//!
//! The detector masks regex-covered regions, asks the model for a strict
//! JSON entity list, and re-locates every returned span in the original
//! text because model-reported offsets are unreliable. It never raises:
//! any failure degrades to an empty detection.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use regex::RegexBuilder;
use serde_json::Value;

use crate::config::ScrubConfig;
use crate::entity::{Entity, EntityType, Method};
use crate::expense::{ExpenseEvent, ExpenseMetadata, ExpenseTracker};
use crate::llm::{ChatJsonRequest, ChatMessage, LlmClient};

/// Placeholder spliced over skip regions before the text is sent out.
const DETECTED_MASK: &str = "[DETECTED]";

const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a PII detection system for professional coaching content \
(transcripts, assessments, session notes). Identify personally \
identifiable information precisely and conservatively. Never flag: \
assessment names (DiSC, StrengthsFinder, Enneagram, MBTI, Hogan), \
coaching frameworks and models (GROW, Co-Active, Immunity to Change), \
generic roles or titles (manager, director, coach, client, VP), or \
generic company types (a tech startup, a consulting firm). Respond only \
with JSON.";

/// Semantic entity detector backed by an [`LlmClient`].
#[derive(Clone)]
pub struct LlmDetector {
    client: Arc<dyn LlmClient>,
    tracker: Option<Arc<dyn ExpenseTracker>>,
}

impl LlmDetector {
    /// Create a detector over the given client.
    pub fn new(client: Arc<dyn LlmClient>, tracker: Option<Arc<dyn ExpenseTracker>>) -> Self {
        Self { client, tracker }
    }

    /// Detect semantic PII in `text`.
    ///
    /// `skip_regions` are spans already covered by the regex detector;
    /// they are masked out of the prompt so the model neither re-detects
    /// them nor spends tokens on them. Returns an empty slice on any
    /// failure.
    pub async fn detect(
        &self,
        text: &str,
        data_type: &str,
        skip_regions: &[Range<usize>],
        config: &ScrubConfig,
    ) -> Vec<Entity> {
        let masked = mask_skip_regions(text, skip_regions);
        let messages = vec![
            ChatMessage::system(
                config
                    .system_prompt
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            ),
            ChatMessage::user(user_prompt(&masked, data_type)),
        ];
        let timeout = config.timeout_for(text.len());

        for attempt in 0..=config.max_retries {
            let request = ChatJsonRequest {
                model: config.model.clone(),
                messages: messages.clone(),
                temperature: config.temperature,
                timeout,
                attempt,
            };

            match self.client.chat_json(request).await {
                Ok(response) => {
                    if let (Some(tracker), Some(usage)) = (&self.tracker, &response.usage) {
                        tracker
                            .track(ExpenseEvent {
                                model: config.model.clone(),
                                operation: "pii_detection".to_string(),
                                input_tokens: usage.prompt_tokens,
                                output_tokens: usage.completion_tokens,
                                metadata: ExpenseMetadata {
                                    attempt,
                                    text_length: text.len(),
                                    timeout_ms: timeout.as_millis() as u64,
                                    adaptive_timeout: config.use_adaptive_timeout,
                                },
                            })
                            .await;
                    }
                    return parse_entities(&response.content, text);
                }
                Err(e) if !e.is_retryable() => {
                    tracing::warn!(error = %e, "LLM detection failed fatally, skipping");
                    return Vec::new();
                }
                Err(e) if attempt < config.max_retries => {
                    let backoff = Duration::from_secs(2u64.saturating_pow(attempt));
                    tracing::warn!(
                        error = %e,
                        attempt,
                        backoff_secs = backoff.as_secs(),
                        "LLM detection attempt failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "LLM detection exhausted retries");
                    return Vec::new();
                }
            }
        }
        Vec::new()
    }
}

fn user_prompt(masked_text: &str, data_type: &str) -> String {
    format!(
        "Detect the following PII categories in the text below:\n\
         - NAME: full or partial person names\n\
         - ADDRESS: street or mailing addresses\n\
         - DOB: dates of birth\n\
         - MEDICAL: medical conditions, medications, providers\n\
         - FINANCIAL: salaries, account details, personal financial figures\n\
         - EMPLOYER: specific employer or company names\n\
         \n\
         Do not flag assessment names, coaching frameworks or models, \
         generic roles or titles, or generic company types. Regions shown \
         as [DETECTED] are already handled; ignore them.\n\
         \n\
         Respond with strict JSON:\n\
         {{\"entities\": [{{\"text\": string, \"type\": \
         \"NAME|ADDRESS|DOB|MEDICAL|FINANCIAL|EMPLOYER\", \"start\": int, \
         \"end\": int, \"confidence\": number}}]}}\n\
         \n\
         If no PII is present, respond {{\"entities\": []}}.\n\
         \n\
         Text (type: {data_type}):\n\
         \"\"\"\n\
         {masked_text}\n\
         \"\"\""
    )
}

/// Replace every skip region with the literal `[DETECTED]` placeholder.
///
/// Length is not preserved; the masked text is only ever sent to the
/// model, never used for offsets.
fn mask_skip_regions(text: &str, regions: &[Range<usize>]) -> String {
    if regions.is_empty() {
        return text.to_string();
    }
    let mut sorted: Vec<&Range<usize>> = regions.iter().collect();
    sorted.sort_by_key(|r| (r.start, r.end));

    let mut out = String::with_capacity(text.len());
    let mut pos = 0usize;
    for region in sorted {
        let end = region.end.min(text.len());
        if region.start < pos || region.start >= end {
            continue;
        }
        out.push_str(&text[pos..region.start]);
        out.push_str(DETECTED_MASK);
        pos = end;
    }
    out.push_str(&text[pos..]);
    out
}

/// Defensively parse the model's JSON and relocate each entity.
///
/// Unknown fields are ignored, a missing `entities` array means no
/// detections, and anything malformed is dropped entity-by-entity. Spans
/// are re-located as the first case-insensitive occurrence of the entity
/// text in the original (unmasked) chunk; unfindable entities are dropped.
fn parse_entities(content: &str, original: &str) -> Vec<Entity> {
    let value: Value = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "discarding unparseable LLM detection response");
            return Vec::new();
        }
    };
    let Some(items) = value.get("entities").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut seen = std::collections::HashSet::new();
    let mut entities = Vec::new();
    for item in items {
        let Some(raw_text) = item.get("text").and_then(Value::as_str) else {
            tracing::debug!("dropping LLM entity without text");
            continue;
        };
        let trimmed = raw_text.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some(entity_type) = item
            .get("type")
            .and_then(Value::as_str)
            .and_then(EntityType::from_llm_label)
        else {
            tracing::debug!("dropping LLM entity with unrecognized type");
            continue;
        };
        let confidence = item
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.9)
            .clamp(0.0, 1.0);
        let Some((start, end)) = locate(original, trimmed) else {
            tracing::debug!(
                entity_type = entity_type.as_str(),
                "dropping LLM entity not found in source text"
            );
            continue;
        };
        if !seen.insert((start, end)) {
            continue;
        }
        entities.push(Entity {
            text: original[start..end].to_string(),
            entity_type,
            start,
            end,
            confidence,
            method: Method::Llm,
            description: entity_type.label().to_string(),
        });
    }

    entities.sort_by_key(|e| (e.start, e.end));
    entities
}

/// First case-insensitive occurrence of `needle` in `haystack`.
fn locate(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    let pattern = RegexBuilder::new(&regex::escape(needle))
        .case_insensitive(true)
        .build()
        .ok()?;
    pattern.find(haystack).map(|m| (m.start(), m.end()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::MockLlmClient;

    fn detector(mock: Arc<MockLlmClient>) -> LlmDetector {
        LlmDetector::new(mock, None)
    }

    fn config() -> ScrubConfig {
        ScrubConfig::default()
    }

    #[tokio::test]
    async fn test_relocation_overrides_model_offsets() {
        let mock = Arc::new(MockLlmClient::new());
        // Model reports nonsense offsets; relocation must fix them.
        mock.push_json(
            r#"{"entities": [{"text": "Sarah Johnson", "type": "NAME", "start": 999, "end": 1200, "confidence": 0.97}]}"#,
        );
        let text = "Notes: Sarah Johnson attended.";
        let entities = detector(Arc::clone(&mock)).detect(text, "note", &[], &config()).await;
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].start, 7);
        assert_eq!(entities[0].end, 20);
        assert_eq!(&text[entities[0].start..entities[0].end], "Sarah Johnson");
        assert_eq!(entities[0].confidence, 0.97);
        assert_eq!(entities[0].method, Method::Llm);
    }

    #[tokio::test]
    async fn test_missing_confidence_defaults() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_json(r#"{"entities": [{"text": "Acme Corp", "type": "EMPLOYER"}]}"#);
        let entities = detector(mock)
            .detect("Works at Acme Corp now.", "note", &[], &config())
            .await;
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].confidence, 0.9);
    }

    #[tokio::test]
    async fn test_unfindable_entity_dropped_others_kept() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_json(
            r#"{"entities": [
                {"text": "Ghost Person", "type": "NAME", "confidence": 0.9},
                {"text": "Sarah", "type": "NAME", "confidence": 0.9}
            ]}"#,
        );
        let entities = detector(mock)
            .detect("Sarah attended the session.", "note", &[], &config())
            .await;
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].text, "Sarah");
    }

    #[tokio::test]
    async fn test_bad_types_and_shapes_dropped() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_json(
            r#"{"entities": [
                {"text": "Sarah", "type": "WIZARD"},
                {"type": "NAME", "confidence": 0.9},
                {"text": "   ", "type": "NAME"},
                {"text": "Sarah", "type": "NAME"}
            ], "extra": "ignored"}"#,
        );
        let entities = detector(mock)
            .detect("Sarah attended.", "note", &[], &config())
            .await;
        assert_eq!(entities.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_json_yields_empty() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_json("this is not json at all");
        let entities = detector(Arc::clone(&mock))
            .detect("Sarah attended the session.", "note", &[], &config())
            .await;
        assert!(entities.is_empty());
        // A parse failure is not a transport failure; no retries.
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_errors_then_succeeds() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_error(LlmError::RateLimited {
            provider: "mock".into(),
            retry_after: None,
        });
        mock.push_error(LlmError::Timeout {
            provider: "mock".into(),
            elapsed_ms: 30_000,
        });
        mock.push_json(r#"{"entities": [{"text": "Sarah", "type": "NAME"}]}"#);

        let entities = detector(Arc::clone(&mock))
            .detect("Sarah attended the session.", "note", &[], &config())
            .await;
        assert_eq!(entities.len(), 1);
        assert_eq!(mock.call_count(), 3);
        let attempts: Vec<u32> = mock.requests().iter().map(|r| r.attempt).collect();
        assert_eq!(attempts, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_yield_empty() {
        let mock = Arc::new(MockLlmClient::new());
        for _ in 0..3 {
            mock.push_error(LlmError::RequestFailed {
                provider: "mock".into(),
                reason: "HTTP 503".into(),
            });
        }
        let entities = detector(Arc::clone(&mock))
            .detect("Sarah attended the session.", "note", &[], &config())
            .await;
        assert!(entities.is_empty());
        // max_retries = 2 means three attempts total.
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_auth_errors_not_retried() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_error(LlmError::AuthFailed {
            provider: "mock".into(),
        });
        let entities = detector(Arc::clone(&mock))
            .detect("Sarah attended the session.", "note", &[], &config())
            .await;
        assert!(entities.is_empty());
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_skip_regions_masked_in_prompt() {
        let mock = Arc::new(MockLlmClient::new());
        let text = "Email jane@example.com about Sarah.";
        let email_start = text.find("jane@").unwrap();
        let regions = vec![email_start..email_start + "jane@example.com".len()];
        detector(Arc::clone(&mock))
            .detect(text, "note", &regions, &config())
            .await;

        let requests = mock.requests();
        let user_message = &requests[0].messages[1].content;
        assert!(user_message.contains("[DETECTED]"));
        assert!(!user_message.contains("jane@example.com"));
        assert!(user_message.contains("Sarah"));
    }

    #[tokio::test]
    async fn test_expense_tracked_on_success() {
        use crate::expense::MemoryExpenseTracker;

        let mock = Arc::new(MockLlmClient::new());
        mock.push_json(r#"{"entities": []}"#);
        let tracker = Arc::new(MemoryExpenseTracker::new());
        let det = LlmDetector::new(Arc::clone(&mock) as Arc<dyn LlmClient>, Some(Arc::clone(&tracker) as Arc<dyn ExpenseTracker>));
        det.detect("Sarah attended the session.", "note", &[], &config())
            .await;

        let events = tracker.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].operation, "pii_detection");
        assert_eq!(events[0].metadata.attempt, 0);
        assert!(events[0].metadata.adaptive_timeout);
    }

    #[test]
    fn test_mask_skip_regions_shapes() {
        let text = "abc 123-45-6789 def";
        let masked = mask_skip_regions(text, &[4..15]);
        assert_eq!(masked, "abc [DETECTED] def");
        // Out-of-order and overlapping regions are tolerated.
        let masked = mask_skip_regions(text, &[16..19, 4..15, 5..9]);
        assert_eq!(masked, "abc [DETECTED] [DETECTED]");
        assert_eq!(mask_skip_regions(text, &[]), text);
    }

    #[test]
    fn test_adaptive_timeout_reaches_request() {
        tokio_test::block_on(async {
            let mock = Arc::new(MockLlmClient::new());
            let text = "x".repeat(10_000);
            detector(Arc::clone(&mock))
                .detect(&text, "note", &[], &config())
                .await;
            let requests = mock.requests();
            // 30s base + 10 KB * 10s/KB.
            assert_eq!(requests[0].timeout, Duration::from_millis(130_000));
        });
    }
}
