//! Pipeline orchestration.
//!
//! [`Scrubber::scrub`] is a total function: every input produces a
//! `{content, audit}` pair and errors surface only through the audit.
//! Degraded paths return the original text so an upstream write is never
//! blocked by a detection or redaction failure.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;

use crate::audit::{Audit, AuditBuilder, AuditMethod, AuditParams, ChunkStats};
use crate::chunk::{Chunker, validate_chunks};
use crate::config::{ScrubConfig, ScrubOptions};
use crate::detect::{LlmDetector, RegexDetector};
use crate::entity::Entity;
use crate::error::ScrubError;
use crate::expense::ExpenseTracker;
use crate::llm::LlmClient;
use crate::merge::{ChunkDetection, merge_across_chunks, merge_within_chunk};
use crate::redact::Redactor;

/// Result of a scrub: redacted content (or the original text on any
/// degradation) plus the audit describing what happened.
#[derive(Debug, Clone)]
pub struct ScrubResult {
    pub content: String,
    pub audit: Audit,
}

/// Hybrid PII scrubber.
///
/// Constructed once and immutable afterwards; safe for concurrent
/// [`scrub`](Self::scrub) calls.
pub struct Scrubber {
    config: ScrubConfig,
    regex_detector: Arc<RegexDetector>,
    llm_client: Option<Arc<dyn LlmClient>>,
    expense_tracker: Option<Arc<dyn ExpenseTracker>>,
}

impl Scrubber {
    /// Create a scrubber without an LLM client (regex detection only).
    pub fn new(config: ScrubConfig) -> Self {
        Self {
            config,
            regex_detector: Arc::new(RegexDetector::new()),
            llm_client: None,
            expense_tracker: None,
        }
    }

    /// Attach the chat-completion client used for semantic detection.
    pub fn with_llm_client(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.llm_client = Some(client);
        self
    }

    /// Attach an expense tracker for LLM call cost events.
    pub fn with_expense_tracker(mut self, tracker: Arc<dyn ExpenseTracker>) -> Self {
        self.expense_tracker = Some(tracker);
        self
    }

    /// Detect and redact PII in `text`.
    ///
    /// Never fails: invalid or too-short inputs short-circuit, detector
    /// and redaction failures degrade to returning the original text, and
    /// the audit records which path was taken.
    pub async fn scrub(
        &self,
        text: &str,
        data_type: &str,
        opts: Option<ScrubOptions>,
    ) -> ScrubResult {
        let started = Instant::now();
        let config = match &opts {
            Some(o) => o.apply(&self.config),
            None => self.config.clone(),
        };
        let audits = AuditBuilder::new(config.version.clone(), config.include_entity_details);

        if text.is_empty() {
            return ScrubResult {
                content: String::new(),
                audit: audits.short_circuit(
                    AuditMethod::SkippedInvalidInput,
                    data_type,
                    text,
                    started.elapsed(),
                    None,
                ),
            };
        }
        if text.trim().chars().count() < config.min_length {
            return ScrubResult {
                content: text.to_string(),
                audit: audits.short_circuit(
                    AuditMethod::SkippedTooShort,
                    data_type,
                    text,
                    started.elapsed(),
                    None,
                ),
            };
        }

        // Semantic detection requires both the flag and a client.
        let llm = if config.enable_llm {
            self.llm_client.as_ref().map(|client| {
                LlmDetector::new(Arc::clone(client), self.expense_tracker.clone())
            })
        } else {
            None
        };
        let method = base_method(config.enable_regex, llm.is_some());
        if method == AuditMethod::Disabled {
            return ScrubResult {
                content: text.to_string(),
                audit: audits.short_circuit(
                    AuditMethod::Disabled,
                    data_type,
                    text,
                    started.elapsed(),
                    None,
                ),
            };
        }

        if config.enable_chunking && text.len() > config.chunk_threshold {
            self.scrub_chunked(text, data_type, config, llm, method, started, &audits)
                .await
        } else {
            self.scrub_single(text, data_type, config, llm, method, started, &audits)
                .await
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn scrub_single(
        &self,
        text: &str,
        data_type: &str,
        config: ScrubConfig,
        llm: Option<LlmDetector>,
        method: AuditMethod,
        started: Instant,
        audits: &AuditBuilder,
    ) -> ScrubResult {
        let regex_entities = if config.enable_regex {
            self.regex_detector.detect(text)
        } else {
            Vec::new()
        };
        let skip_regions: Vec<Range<usize>> =
            regex_entities.iter().map(|e| e.start..e.end).collect();
        let llm_entities = match &llm {
            Some(detector) => detector.detect(text, data_type, &skip_regions, &config).await,
            None => Vec::new(),
        };
        let entities = merge_within_chunk(regex_entities, llm_entities);

        finish(text, data_type, &config, method, entities, None, started, audits)
    }

    #[allow(clippy::too_many_arguments)]
    async fn scrub_chunked(
        &self,
        text: &str,
        data_type: &str,
        config: ScrubConfig,
        llm: Option<LlmDetector>,
        base: AuditMethod,
        started: Instant,
        audits: &AuditBuilder,
    ) -> ScrubResult {
        let method = base.chunked();
        let chunker = Chunker::new(&config);
        let mut metadata = HashMap::new();
        metadata.insert("data_type".to_string(), data_type.to_string());
        let chunks = chunker.chunk(text, metadata);

        if let Err(e) = validate_chunks(text, &chunks) {
            tracing::error!(error = %e, "chunking produced invalid windows");
            return ScrubResult {
                content: text.to_string(),
                audit: audits.short_circuit(
                    AuditMethod::ErrorChunked,
                    data_type,
                    text,
                    started.elapsed(),
                    Some(e.to_string()),
                ),
            };
        }
        let chunk_stats =
            ChunkStats::from_chunks(&chunks, config.overlap_size, config.max_chunk_size);
        tracing::debug!(
            chunks = chunks.len(),
            max_concurrent = config.max_concurrent_chunks,
            "processing chunked input"
        );

        let config = Arc::new(config);
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_chunks.max(1)));
        let mut handles = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let semaphore = Arc::clone(&semaphore);
            let regex_detector = config
                .enable_regex
                .then(|| Arc::clone(&self.regex_detector));
            let llm = llm.clone();
            let config = Arc::clone(&config);
            let data_type = data_type.to_string();

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        let failure = ScrubError::ChunkFailed {
                            index: chunk.chunk_index,
                            reason: format!("semaphore closed: {e}"),
                        };
                        return ChunkDetection {
                            chunk_index: chunk.chunk_index,
                            start_offset: chunk.start_offset,
                            entities: Vec::new(),
                            success: false,
                            error: Some(failure.to_string()),
                        };
                    }
                };

                let regex_entities = regex_detector
                    .map(|d| d.detect(&chunk.content))
                    .unwrap_or_default();
                let skip_regions: Vec<Range<usize>> =
                    regex_entities.iter().map(|e| e.start..e.end).collect();
                let llm_entities = match &llm {
                    Some(detector) => {
                        detector
                            .detect(&chunk.content, &data_type, &skip_regions, &config)
                            .await
                    }
                    None => Vec::new(),
                };

                ChunkDetection {
                    chunk_index: chunk.chunk_index,
                    start_offset: chunk.start_offset,
                    entities: merge_within_chunk(regex_entities, llm_entities),
                    success: true,
                    error: None,
                }
            }));
        }

        let mut detections = Vec::with_capacity(handles.len());
        for (index, outcome) in futures::future::join_all(handles)
            .await
            .into_iter()
            .enumerate()
        {
            match outcome {
                Ok(detection) => detections.push(detection),
                Err(e) => {
                    // A panicking chunk degrades to a failed chunk; the
                    // merge skips it and the scrub still completes.
                    let failure = ScrubError::ChunkFailed {
                        index,
                        reason: e.to_string(),
                    };
                    tracing::error!(error = %failure, "chunk worker failed");
                    detections.push(ChunkDetection {
                        chunk_index: index,
                        start_offset: 0,
                        entities: Vec::new(),
                        success: false,
                        error: Some(failure.to_string()),
                    });
                }
            }
        }

        let entities = merge_across_chunks(detections, text);
        finish(
            text,
            data_type,
            &config,
            method,
            entities,
            Some(chunk_stats),
            started,
            audits,
        )
    }
}

/// Shared redact → validate → audit tail of both paths.
#[allow(clippy::too_many_arguments)]
fn finish(
    text: &str,
    data_type: &str,
    config: &ScrubConfig,
    method: AuditMethod,
    entities: Vec<Entity>,
    chunk_stats: Option<ChunkStats>,
    started: Instant,
    audits: &AuditBuilder,
) -> ScrubResult {
    let redactor = Redactor::new(config);
    let chunked = chunk_stats.is_some();

    let redacted = match redactor.apply(text, &entities) {
        Ok(redacted) => redacted,
        Err(e) => {
            tracing::error!(error = %e, "redaction failed, returning original text");
            let error_method = if chunked {
                AuditMethod::ErrorChunked
            } else {
                AuditMethod::Error
            };
            return ScrubResult {
                content: text.to_string(),
                audit: audits.build(AuditParams {
                    method: error_method,
                    data_type,
                    entities: &entities,
                    original: text,
                    redacted: text,
                    scrubbed: false,
                    duration: started.elapsed(),
                    chunk_stats,
                    validation_errors: None,
                    error: Some(e.to_string()),
                }),
            };
        }
    };

    let validation = redactor.validate(text, &redacted, &entities);
    if !validation.valid {
        tracing::warn!(
            errors = validation.errors.len(),
            "redaction validation failed, returning original text"
        );
        return ScrubResult {
            content: text.to_string(),
            audit: audits.build(AuditParams {
                method,
                data_type,
                entities: &entities,
                original: text,
                redacted: text,
                scrubbed: false,
                duration: started.elapsed(),
                chunk_stats,
                validation_errors: Some(validation.errors),
                error: None,
            }),
        };
    }

    let audit = audits.build(AuditParams {
        method,
        data_type,
        entities: &entities,
        original: text,
        redacted: &redacted,
        scrubbed: true,
        duration: started.elapsed(),
        chunk_stats,
        validation_errors: None,
        error: None,
    });
    ScrubResult {
        content: redacted,
        audit,
    }
}

fn base_method(regex: bool, llm: bool) -> AuditMethod {
    match (regex, llm) {
        (true, true) => AuditMethod::Hybrid,
        (true, false) => AuditMethod::RegexOnly,
        (false, true) => AuditMethod::LlmOnly,
        (false, false) => AuditMethod::Disabled,
    }
}
