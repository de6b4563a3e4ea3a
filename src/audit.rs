//! Audit records describing what a scrub detected and at what cost.
//!
//! The serialized shape is a stable wire contract; field names are pinned
//! with serde attributes and evolve additively.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::entity::Entity;

/// How a scrub was performed, or why it was skipped or degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditMethod {
    #[serde(rename = "hybrid")]
    Hybrid,
    #[serde(rename = "hybrid_chunked")]
    HybridChunked,
    #[serde(rename = "regex_only")]
    RegexOnly,
    #[serde(rename = "llm_only")]
    LlmOnly,
    #[serde(rename = "disabled")]
    Disabled,
    #[serde(rename = "skipped_invalid_input")]
    SkippedInvalidInput,
    #[serde(rename = "skipped_too_short")]
    SkippedTooShort,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "error_chunked")]
    ErrorChunked,
}

impl AuditMethod {
    /// Chunked counterpart of this method, where one exists.
    pub fn chunked(self) -> Self {
        match self {
            Self::Hybrid => Self::HybridChunked,
            Self::Error => Self::ErrorChunked,
            other => other,
        }
    }
}

/// Immutable record returned with every scrub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Audit {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub method: AuditMethod,
    #[serde(rename = "dataType")]
    pub data_type: String,
    /// Whether the returned content is the redacted text.
    pub scrubbed: bool,
    pub entities: EntitySummary,
    pub performance: Performance,
    pub text_stats: TextStats,
    #[serde(rename = "chunkStats", skip_serializing_if = "Option::is_none")]
    pub chunk_stats: Option<ChunkStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated entity counts and confidence statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySummary {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_method: BTreeMap<String, usize>,
    pub by_confidence: ConfidenceSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<EntityDetail>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceSummary {
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub distribution: ConfidenceDistribution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceDistribution {
    #[serde(rename = "high (0.9-1.0)")]
    pub high: usize,
    #[serde(rename = "medium (0.7-0.9)")]
    pub medium: usize,
    #[serde(rename = "low (<0.7)")]
    pub low: usize,
}

/// Per-entity detail. Carries position and shape, never the raw text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDetail {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub method: String,
    pub confidence: f64,
    pub length: usize,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Performance {
    pub duration_ms: u64,
    pub entities_detected: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextStats {
    pub original_length: usize,
    pub redacted_length: usize,
    pub characters_redacted: usize,
    pub redaction_percentage: f64,
}

/// Shape of the chunking pass, recorded for chunked scrubs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkStats {
    pub count: usize,
    #[serde(rename = "avgSize")]
    pub avg_size: usize,
    #[serde(rename = "minSize")]
    pub min_size: usize,
    #[serde(rename = "maxSize")]
    pub max_size: usize,
    #[serde(rename = "totalSize")]
    pub total_size: usize,
    #[serde(rename = "overlapSize")]
    pub overlap_size: usize,
    #[serde(rename = "maxChunkSize")]
    pub max_chunk_size: usize,
}

impl ChunkStats {
    /// Summarize an emitted chunk set.
    pub fn from_chunks(chunks: &[Chunk], overlap_size: usize, max_chunk_size: usize) -> Self {
        let sizes: Vec<usize> = chunks.iter().map(|c| c.content.len()).collect();
        let total: usize = sizes.iter().sum();
        Self {
            count: chunks.len(),
            avg_size: if chunks.is_empty() { 0 } else { total / chunks.len() },
            min_size: sizes.iter().copied().min().unwrap_or(0),
            max_size: sizes.iter().copied().max().unwrap_or(0),
            total_size: total,
            overlap_size,
            max_chunk_size,
        }
    }
}

/// Inputs to [`AuditBuilder::build`].
pub struct AuditParams<'a> {
    pub method: AuditMethod,
    pub data_type: &'a str,
    pub entities: &'a [Entity],
    pub original: &'a str,
    pub redacted: &'a str,
    pub scrubbed: bool,
    pub duration: Duration,
    pub chunk_stats: Option<ChunkStats>,
    pub validation_errors: Option<Vec<String>>,
    pub error: Option<String>,
}

/// Pure aggregation of scrub results into an [`Audit`]. No I/O.
pub struct AuditBuilder {
    version: String,
    include_entity_details: bool,
}

impl AuditBuilder {
    /// Create a builder with the configured audit version.
    pub fn new(version: impl Into<String>, include_entity_details: bool) -> Self {
        Self {
            version: version.into(),
            include_entity_details,
        }
    }

    /// Aggregate a completed (or degraded) scrub.
    pub fn build(&self, params: AuditParams<'_>) -> Audit {
        let entities = params.entities;
        let characters_redacted: usize = entities.iter().map(Entity::len).sum();
        let redaction_percentage = if params.original.is_empty() {
            0.0
        } else {
            round2(100.0 * characters_redacted as f64 / params.original.len() as f64)
        };

        Audit {
            version: self.version.clone(),
            timestamp: Utc::now(),
            method: params.method,
            data_type: params.data_type.to_string(),
            scrubbed: params.scrubbed,
            entities: self.summarize(entities),
            performance: Performance {
                duration_ms: params.duration.as_millis() as u64,
                entities_detected: entities.len(),
            },
            text_stats: TextStats {
                original_length: params.original.len(),
                redacted_length: params.redacted.len(),
                characters_redacted,
                redaction_percentage,
            },
            chunk_stats: params.chunk_stats,
            validation_errors: params.validation_errors,
            error: params.error,
        }
    }

    /// Audit for a scrub that never ran detection (skipped or errored out
    /// before producing entities).
    pub fn short_circuit(
        &self,
        method: AuditMethod,
        data_type: &str,
        text: &str,
        duration: Duration,
        error: Option<String>,
    ) -> Audit {
        self.build(AuditParams {
            method,
            data_type,
            entities: &[],
            original: text,
            redacted: text,
            scrubbed: false,
            duration,
            chunk_stats: None,
            validation_errors: None,
            error,
        })
    }

    fn summarize(&self, entities: &[Entity]) -> EntitySummary {
        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_method: BTreeMap<String, usize> = BTreeMap::new();
        let mut distribution = ConfidenceDistribution {
            high: 0,
            medium: 0,
            low: 0,
        };
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        let mut sum = 0.0;

        for entity in entities {
            *by_type
                .entry(entity.entity_type.as_str().to_string())
                .or_default() += 1;
            *by_method
                .entry(entity.method.as_str().to_string())
                .or_default() += 1;
            sum += entity.confidence;
            min = min.min(entity.confidence);
            max = max.max(entity.confidence);
            if entity.confidence >= 0.9 {
                distribution.high += 1;
            } else if entity.confidence >= 0.7 {
                distribution.medium += 1;
            } else {
                distribution.low += 1;
            }
        }

        let by_confidence = if entities.is_empty() {
            ConfidenceSummary {
                average: 0.0,
                min: 0.0,
                max: 0.0,
                distribution,
            }
        } else {
            ConfidenceSummary {
                average: round2(sum / entities.len() as f64),
                min,
                max,
                distribution,
            }
        };

        let details = self.include_entity_details.then(|| {
            entities
                .iter()
                .map(|e| EntityDetail {
                    entity_type: e.entity_type.as_str().to_string(),
                    method: e.method.as_str().to_string(),
                    confidence: e.confidence,
                    length: e.len(),
                    position: Position {
                        start: e.start,
                        end: e.end,
                    },
                })
                .collect()
        });

        EntitySummary {
            total: entities.len(),
            by_type,
            by_method,
            by_confidence,
            details,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityType, Method};

    fn entity(entity_type: EntityType, start: usize, end: usize, confidence: f64, method: Method) -> Entity {
        Entity {
            text: "x".repeat(end - start),
            entity_type,
            start,
            end,
            confidence,
            method,
            description: entity_type.label().to_string(),
        }
    }

    fn sample_entities() -> Vec<Entity> {
        vec![
            entity(EntityType::Email, 0, 10, 1.0, Method::Regex),
            entity(EntityType::Name, 15, 20, 0.95, Method::Llm),
            entity(EntityType::Name, 30, 35, 0.8, Method::Llm),
            entity(EntityType::Medical, 40, 50, 0.5, Method::Llm),
        ]
    }

    fn build(entities: &[Entity]) -> Audit {
        AuditBuilder::new("1.0.0", true).build(AuditParams {
            method: AuditMethod::Hybrid,
            data_type: "transcript",
            entities,
            original: &"o".repeat(100),
            redacted: &"r".repeat(90),
            scrubbed: true,
            duration: Duration::from_millis(42),
            chunk_stats: None,
            validation_errors: None,
            error: None,
        })
    }

    #[test]
    fn test_counts_are_consistent() {
        let audit = build(&sample_entities());
        assert_eq!(audit.entities.total, 4);
        assert_eq!(audit.entities.by_type.values().sum::<usize>(), 4);
        assert_eq!(audit.entities.by_method.values().sum::<usize>(), 4);
        assert_eq!(audit.entities.by_type["NAME"], 2);
        assert_eq!(audit.entities.by_method["regex"], 1);
        assert_eq!(audit.entities.by_method["llm"], 3);
        assert_eq!(audit.performance.entities_detected, 4);
    }

    #[test]
    fn test_confidence_distribution_buckets() {
        let audit = build(&sample_entities());
        let dist = &audit.entities.by_confidence.distribution;
        assert_eq!(dist.high, 2);
        assert_eq!(dist.medium, 1);
        assert_eq!(dist.low, 1);
        assert_eq!(audit.entities.by_confidence.min, 0.5);
        assert_eq!(audit.entities.by_confidence.max, 1.0);
        assert_eq!(audit.entities.by_confidence.average, round2((1.0 + 0.95 + 0.8 + 0.5) / 4.0));
    }

    #[test]
    fn test_text_stats() {
        let audit = build(&sample_entities());
        // 10 + 5 + 5 + 10 characters covered by entity spans.
        assert_eq!(audit.text_stats.characters_redacted, 30);
        assert_eq!(audit.text_stats.redaction_percentage, 30.0);
        assert_eq!(audit.text_stats.original_length, 100);
        assert_eq!(audit.text_stats.redacted_length, 90);
    }

    #[test]
    fn test_details_never_carry_text() {
        let audit = build(&sample_entities());
        let json = serde_json::to_value(&audit).unwrap();
        let details = json["entities"]["details"].as_array().unwrap();
        assert_eq!(details.len(), 4);
        for detail in details {
            assert!(detail.get("text").is_none());
            assert!(detail.get("position").is_some());
        }
    }

    #[test]
    fn test_details_omitted_when_disabled() {
        let audit = AuditBuilder::new("1.0.0", false).build(AuditParams {
            method: AuditMethod::RegexOnly,
            data_type: "note",
            entities: &sample_entities(),
            original: "x",
            redacted: "x",
            scrubbed: true,
            duration: Duration::ZERO,
            chunk_stats: None,
            validation_errors: None,
            error: None,
        });
        assert!(audit.entities.details.is_none());
        let json = serde_json::to_value(&audit).unwrap();
        assert!(json["entities"].get("details").is_none());
    }

    #[test]
    fn test_wire_shape_keys() {
        let audit = build(&sample_entities());
        let json = serde_json::to_value(&audit).unwrap();
        assert_eq!(json["method"], "hybrid");
        assert!(json.get("dataType").is_some());
        assert!(json["entities"].get("by_type").is_some());
        assert!(json["entities"]["by_confidence"]["distribution"]
            .get("high (0.9-1.0)")
            .is_some());
        assert!(json["performance"].get("duration_ms").is_some());
        assert!(json["text_stats"].get("redaction_percentage").is_some());
        // Optional sections absent when unset.
        assert!(json.get("chunkStats").is_none());
        assert!(json.get("validation_errors").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_empty_entities_zero_confidence() {
        let audit = AuditBuilder::new("1.0.0", true).short_circuit(
            AuditMethod::SkippedTooShort,
            "note",
            "Hi Jane!",
            Duration::ZERO,
            None,
        );
        assert_eq!(audit.entities.total, 0);
        assert_eq!(audit.entities.by_confidence.average, 0.0);
        assert_eq!(audit.entities.by_confidence.min, 0.0);
        assert!(!audit.scrubbed);
        let json = serde_json::to_value(&audit).unwrap();
        assert_eq!(json["method"], "skipped_too_short");
    }

    #[test]
    fn test_chunk_stats_serialization() {
        let stats = ChunkStats {
            count: 3,
            avg_size: 100,
            min_size: 80,
            max_size: 120,
            total_size: 300,
            overlap_size: 20,
            max_chunk_size: 128,
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert!(json.get("avgSize").is_some());
        assert!(json.get("maxChunkSize").is_some());
    }
}
