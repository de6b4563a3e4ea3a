//! Merging detection results within and across chunks.

use std::collections::HashSet;

use crate::entity::{Entity, Method};

/// Detection output for one chunk, in chunk-local coordinates.
#[derive(Debug)]
pub struct ChunkDetection {
    /// Index of the chunk this came from.
    pub chunk_index: usize,
    /// Absolute start offset of the chunk in the source.
    pub start_offset: usize,
    /// Entities in chunk-local coordinates.
    pub entities: Vec<Entity>,
    /// Whether the chunk was processed successfully.
    pub success: bool,
    /// Failure description for unsuccessful chunks.
    pub error: Option<String>,
}

/// Merge regex and LLM entities detected over the same text.
///
/// Regex entities are authoritative: an LLM entity overlapping any regex
/// span is dropped. The union is returned sorted by start offset.
pub fn merge_within_chunk(regex_entities: Vec<Entity>, llm_entities: Vec<Entity>) -> Vec<Entity> {
    let mut merged = regex_entities;
    for candidate in llm_entities {
        let shadowed = merged
            .iter()
            .filter(|e| e.method == Method::Regex)
            .any(|e| e.overlaps(&candidate));
        if shadowed {
            tracing::debug!(
                entity_type = candidate.entity_type.as_str(),
                start = candidate.start,
                "dropping LLM entity overlapping a regex match"
            );
            continue;
        }
        merged.push(candidate);
    }
    merged.sort_by_key(|e| (e.start, e.end));
    merged
}

/// Merge per-chunk detections into absolute coordinates over the source.
///
/// Entities are translated by their chunk's start offset, bounds-checked
/// against the source, and deduplicated by `(start, end, lowercased text)`
/// with the first occurrence winning. Duplicates are expected: adjacent
/// chunks share an overlap region and both may detect the same span.
/// Failed chunks contribute nothing but do not abort the merge.
pub fn merge_across_chunks(mut detections: Vec<ChunkDetection>, source: &str) -> Vec<Entity> {
    detections.sort_by_key(|d| d.chunk_index);

    let mut seen: HashSet<(usize, usize, String)> = HashSet::new();
    let mut merged = Vec::new();

    for detection in detections {
        if !detection.success {
            tracing::warn!(
                chunk = detection.chunk_index,
                error = detection.error.as_deref().unwrap_or("unknown"),
                "skipping failed chunk in merge"
            );
            continue;
        }
        for mut entity in detection.entities {
            let start = entity.start + detection.start_offset;
            let end = entity.end + detection.start_offset;
            let Some(slice) = source.get(start..end) else {
                tracing::debug!(
                    chunk = detection.chunk_index,
                    start,
                    end,
                    "dropping entity outside source bounds"
                );
                continue;
            };
            if slice.is_empty() {
                continue;
            }
            let key = (start, end, slice.trim().to_lowercase());
            if !seen.insert(key) {
                continue;
            }
            entity.start = start;
            entity.end = end;
            merged.push(entity);
        }
    }

    merged.sort_by_key(|e| (e.start, e.end));
    merged
}
