//! Boundary-preserving chunking for long documents.
//!
//! Long inputs are split into overlapping windows so detectors keep enough
//! context near the cut points. Offsets are byte offsets into the source,
//! clamped to character boundaries.

use std::collections::HashMap;

use regex::Regex;

use crate::config::ScrubConfig;
use crate::error::ScrubError;

/// How far before the target end the boundary scan may reach.
const BOUNDARY_LOOKBEHIND: usize = 500;
/// How far past the target end the boundary scan may reach.
const BOUNDARY_LOOKAHEAD: usize = 100;

/// A contiguous window over the source text.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// The window's content, equal to `source[start_offset..end_offset]`.
    pub content: String,
    /// Absolute start byte offset (inclusive).
    pub start_offset: usize,
    /// Absolute end byte offset (exclusive).
    pub end_offset: usize,
    /// Zero-based index of this chunk.
    pub chunk_index: usize,
    /// Total number of chunks emitted for the source.
    pub total_chunks: usize,
    /// Caller-supplied context carried with each chunk.
    pub metadata: HashMap<String, String>,
}

/// Splits text at natural boundaries with overlap.
pub struct Chunker {
    max_chunk_size: usize,
    overlap_size: usize,
    preserve_boundaries: bool,
    /// Boundary classes in preference order: paragraph, sentence, word.
    boundary_patterns: Vec<Regex>,
}

impl Chunker {
    /// Build a chunker from the scrub configuration.
    pub fn new(config: &ScrubConfig) -> Self {
        let boundary_patterns = [r"\n{2,}", r"[.!?]\s+", r"\s+"]
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::error!(pattern = *p, error = %e, "skipping boundary pattern");
                    None
                }
            })
            .collect();
        Self {
            max_chunk_size: config.max_chunk_size.max(1),
            overlap_size: config.overlap_size,
            preserve_boundaries: config.preserve_boundaries,
            boundary_patterns,
        }
    }

    /// Split `text` into overlapping chunks.
    ///
    /// Text no longer than the maximum chunk size comes back as a single
    /// chunk covering the whole input.
    pub fn chunk(&self, text: &str, metadata: HashMap<String, String>) -> Vec<Chunk> {
        if text.len() <= self.max_chunk_size {
            return vec![Chunk {
                content: text.to_string(),
                start_offset: 0,
                end_offset: text.len(),
                chunk_index: 0,
                total_chunks: 1,
                metadata,
            }];
        }

        let len = text.len();
        let mut chunks = Vec::new();
        let mut p = 0usize;

        while p < len {
            let target = floor_char_boundary(text, (p + self.max_chunk_size).min(len));
            let mut e = target;
            if self.preserve_boundaries && e < len {
                e = self.refine_boundary(text, p, target);
            }
            if e <= p {
                // No usable boundary; fall back to the raw cut to guarantee
                // progress.
                e = target.max(ceil_char_boundary(text, p + 1));
            }

            chunks.push(Chunk {
                content: text[p..e].to_string(),
                start_offset: p,
                end_offset: e,
                chunk_index: chunks.len(),
                total_chunks: 0,
                metadata: metadata.clone(),
            });

            if e >= len {
                break;
            }
            let next = e.saturating_sub(self.overlap_size).max(p + 1);
            p = ceil_char_boundary(text, next);
        }

        let total = chunks.len();
        for chunk in &mut chunks {
            chunk.total_chunks = total;
        }
        chunks
    }

    /// Refine a cut point to the nearest natural boundary.
    ///
    /// Scans the window around `target` for each boundary class in
    /// preference order and picks the match whose end is closest to the
    /// target. Falls back to `target` when nothing usable matches.
    fn refine_boundary(&self, text: &str, start: usize, target: usize) -> usize {
        let window_start =
            ceil_char_boundary(text, target.saturating_sub(BOUNDARY_LOOKBEHIND).max(start));
        let window_end = floor_char_boundary(text, (target + BOUNDARY_LOOKAHEAD).min(text.len()));
        if window_start >= window_end {
            return target;
        }
        let window = &text[window_start..window_end];

        for pattern in &self.boundary_patterns {
            let best = pattern
                .find_iter(window)
                .map(|m| window_start + m.end())
                .filter(|&end| end > start)
                .min_by_key(|&end| end.abs_diff(target));
            if let Some(end) = best {
                return end;
            }
        }
        target
    }
}

/// Check the chunk invariants against the source text.
///
/// Chunks must be non-empty, match their offsets, be contiguous with
/// overlap (no gaps), start at zero, and reach the end of the source.
pub fn validate_chunks(source: &str, chunks: &[Chunk]) -> Result<(), ScrubError> {
    if chunks.is_empty() {
        return Err(ScrubError::Chunking("no chunks emitted".to_string()));
    }

    let mut errors = Vec::new();
    if chunks[0].start_offset != 0 {
        errors.push(format!(
            "first chunk starts at {} instead of 0",
            chunks[0].start_offset
        ));
    }
    if chunks[chunks.len() - 1].end_offset != source.len() {
        errors.push(format!(
            "last chunk ends at {} instead of {}",
            chunks[chunks.len() - 1].end_offset,
            source.len()
        ));
    }
    for (i, chunk) in chunks.iter().enumerate() {
        if chunk.start_offset >= chunk.end_offset {
            errors.push(format!("chunk {i} is empty"));
            continue;
        }
        if source.get(chunk.start_offset..chunk.end_offset) != Some(chunk.content.as_str()) {
            errors.push(format!("chunk {i} content does not match its offsets"));
        }
        if i > 0 && chunk.start_offset > chunks[i - 1].end_offset {
            errors.push(format!("gap between chunk {} and chunk {i}", i - 1));
        }
        if chunk.total_chunks != chunks.len() {
            errors.push(format!("chunk {i} has stale total_chunks"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ScrubError::Chunking(errors.join("; ")))
    }
}

/// Largest char boundary `<= i`.
fn floor_char_boundary(s: &str, i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    let mut i = i;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Smallest char boundary `>= i`.
fn ceil_char_boundary(s: &str, i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    let mut i = i;
    while !s.is_char_boundary(i) {
        i += 1;
    }
    i
}
