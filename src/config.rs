//! Scrubber configuration and per-call overrides.

use std::time::Duration;

use crate::redact::RedactionStrategy;

/// Configuration for a [`crate::scrubber::Scrubber`] instance.
///
/// Immutable once the scrubber is constructed; per-call adjustments go
/// through [`ScrubOptions`].
#[derive(Debug, Clone)]
pub struct ScrubConfig {
    /// Run the regex detector.
    pub enable_regex: bool,
    /// Run the LLM detector (requires a configured client).
    pub enable_llm: bool,

    /// Chat model identifier sent to the provider.
    pub model: String,
    /// Sampling temperature for detection calls.
    pub temperature: f32,
    /// Base request deadline in milliseconds.
    pub base_timeout_ms: u64,
    /// Additional deadline per KB of input, in milliseconds.
    pub timeout_per_kb_ms: u64,
    /// Upper bound on any request deadline, in milliseconds.
    pub max_timeout_ms: u64,
    /// Scale the deadline with input size; when false, `max_timeout_ms`
    /// is used directly.
    pub use_adaptive_timeout: bool,
    /// Retries after the first attempt (total attempts = `max_retries + 1`).
    pub max_retries: u32,
    /// Override for the detection system prompt.
    pub system_prompt: Option<String>,

    /// Split long inputs into chunks.
    pub enable_chunking: bool,
    /// Inputs longer than this many bytes take the chunked path.
    pub chunk_threshold: usize,
    /// Maximum chunk size in bytes.
    pub max_chunk_size: usize,
    /// Overlap between adjacent chunks in bytes.
    pub overlap_size: usize,
    /// Refine chunk ends to paragraph/sentence/word boundaries.
    pub preserve_boundaries: bool,
    /// Concurrency bound for chunk processing.
    pub max_concurrent_chunks: usize,

    /// Redaction strategy.
    pub strategy: RedactionStrategy,
    /// Key for the `hash` strategy's HMAC tag.
    pub hash_key: Option<Vec<u8>>,

    /// Version string recorded in every audit.
    pub version: String,
    /// Include per-entity details (positions, never text) in audits.
    pub include_entity_details: bool,

    /// Inputs with fewer trimmed characters than this are skipped.
    pub min_length: usize,
}

impl Default for ScrubConfig {
    fn default() -> Self {
        Self {
            enable_regex: true,
            enable_llm: true,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            base_timeout_ms: 30_000,
            timeout_per_kb_ms: 10_000,
            max_timeout_ms: 600_000,
            use_adaptive_timeout: true,
            max_retries: 2,
            system_prompt: None,
            enable_chunking: true,
            chunk_threshold: 5_000,
            max_chunk_size: 5_000,
            overlap_size: 500,
            preserve_boundaries: true,
            max_concurrent_chunks: 5,
            strategy: RedactionStrategy::Replace,
            hash_key: None,
            version: "1.0.0".to_string(),
            include_entity_details: true,
            min_length: 20,
        }
    }
}

impl ScrubConfig {
    /// Request deadline for an input of `text_len` bytes.
    ///
    /// Adaptive: `min(max, base + (len / 1000) * per_kb)`. Non-adaptive
    /// inputs always get the maximum deadline.
    pub fn timeout_for(&self, text_len: usize) -> Duration {
        let ms = if self.use_adaptive_timeout {
            let scaled = self
                .base_timeout_ms
                .saturating_add((text_len as u64 / 1000).saturating_mul(self.timeout_per_kb_ms));
            scaled.min(self.max_timeout_ms)
        } else {
            self.max_timeout_ms
        };
        Duration::from_millis(ms)
    }
}

/// Sparse per-call overlay of [`ScrubConfig`].
///
/// Every field left as `None` keeps the scrubber's configured value.
#[derive(Debug, Clone, Default)]
pub struct ScrubOptions {
    pub enable_regex: Option<bool>,
    pub enable_llm: Option<bool>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub base_timeout_ms: Option<u64>,
    pub timeout_per_kb_ms: Option<u64>,
    pub max_timeout_ms: Option<u64>,
    pub use_adaptive_timeout: Option<bool>,
    pub max_retries: Option<u32>,
    pub system_prompt: Option<String>,
    pub enable_chunking: Option<bool>,
    pub chunk_threshold: Option<usize>,
    pub max_chunk_size: Option<usize>,
    pub overlap_size: Option<usize>,
    pub preserve_boundaries: Option<bool>,
    pub max_concurrent_chunks: Option<usize>,
    pub strategy: Option<RedactionStrategy>,
    pub hash_key: Option<Vec<u8>>,
    pub include_entity_details: Option<bool>,
}

impl ScrubOptions {
    /// Merge this overlay over a base configuration.
    pub fn apply(&self, base: &ScrubConfig) -> ScrubConfig {
        let mut cfg = base.clone();
        if let Some(v) = self.enable_regex {
            cfg.enable_regex = v;
        }
        if let Some(v) = self.enable_llm {
            cfg.enable_llm = v;
        }
        if let Some(v) = &self.model {
            cfg.model = v.clone();
        }
        if let Some(v) = self.temperature {
            cfg.temperature = v;
        }
        if let Some(v) = self.base_timeout_ms {
            cfg.base_timeout_ms = v;
        }
        if let Some(v) = self.timeout_per_kb_ms {
            cfg.timeout_per_kb_ms = v;
        }
        if let Some(v) = self.max_timeout_ms {
            cfg.max_timeout_ms = v;
        }
        if let Some(v) = self.use_adaptive_timeout {
            cfg.use_adaptive_timeout = v;
        }
        if let Some(v) = self.max_retries {
            cfg.max_retries = v;
        }
        if let Some(v) = &self.system_prompt {
            cfg.system_prompt = Some(v.clone());
        }
        if let Some(v) = self.enable_chunking {
            cfg.enable_chunking = v;
        }
        if let Some(v) = self.chunk_threshold {
            cfg.chunk_threshold = v;
        }
        if let Some(v) = self.max_chunk_size {
            cfg.max_chunk_size = v;
        }
        if let Some(v) = self.overlap_size {
            cfg.overlap_size = v;
        }
        if let Some(v) = self.preserve_boundaries {
            cfg.preserve_boundaries = v;
        }
        if let Some(v) = self.max_concurrent_chunks {
            cfg.max_concurrent_chunks = v;
        }
        if let Some(v) = self.strategy {
            cfg.strategy = v;
        }
        if let Some(v) = &self.hash_key {
            cfg.hash_key = Some(v.clone());
        }
        if let Some(v) = self.include_entity_details {
            cfg.include_entity_details = v;
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ScrubConfig::default();
        assert!(cfg.enable_regex);
        assert!(cfg.enable_llm);
        assert_eq!(cfg.chunk_threshold, 5_000);
        assert_eq!(cfg.overlap_size, 500);
        assert_eq!(cfg.max_retries, 2);
        assert_eq!(cfg.min_length, 20);
    }

    #[test]
    fn test_adaptive_timeout_scales_with_input() {
        let cfg = ScrubConfig::default();
        assert_eq!(cfg.timeout_for(0), Duration::from_millis(30_000));
        assert_eq!(cfg.timeout_for(5_000), Duration::from_millis(80_000));
        // Capped at the maximum.
        assert_eq!(cfg.timeout_for(100_000_000), Duration::from_millis(600_000));
    }

    #[test]
    fn test_fixed_timeout_uses_maximum() {
        let cfg = ScrubConfig {
            use_adaptive_timeout: false,
            ..ScrubConfig::default()
        };
        assert_eq!(cfg.timeout_for(10), Duration::from_millis(600_000));
    }

    #[test]
    fn test_options_overlay() {
        let base = ScrubConfig::default();
        let opts = ScrubOptions {
            enable_llm: Some(false),
            max_chunk_size: Some(1_000),
            ..ScrubOptions::default()
        };
        let merged = opts.apply(&base);
        assert!(!merged.enable_llm);
        assert_eq!(merged.max_chunk_size, 1_000);
        // Untouched fields keep base values.
        assert!(merged.enable_regex);
        assert_eq!(merged.overlap_size, base.overlap_size);
    }
}
