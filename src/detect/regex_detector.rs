//! Regex detection of well-structured identifiers.

use regex::Regex;

use crate::entity::{Entity, EntityType, Method};

/// Detects structured PII (emails, phones, SSNs, card numbers, IPs, ZIPs)
/// with compiled patterns plus contextual post-validation.
///
/// Detection is pure and never fails: a pattern that cannot be compiled is
/// logged and skipped, and the remaining patterns still run.
pub struct RegexDetector {
    patterns: Vec<PatternSpec>,
}

struct PatternSpec {
    entity_type: EntityType,
    regex: Regex,
}

/// Pattern definitions in priority order. Earlier patterns win when matches
/// overlap (an email's digits must not resurface as a phone number).
const PATTERN_DEFS: &[(EntityType, &str)] = &[
    (
        EntityType::Email,
        r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
    ),
    (EntityType::Ssn, r"\b\d{3}-\d{2}-\d{4}\b"),
    (EntityType::CreditCard, r"\b(?:\d{4}[-\s]?){3}\d{4}\b"),
    (
        EntityType::Phone,
        r"(?:\+\d{1,2}[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}",
    ),
    (EntityType::IpAddress, r"\b(?:\d{1,3}\.){3}\d{1,3}\b"),
    (EntityType::ZipCode, r"\b\d{5}(?:-\d{4})?\b"),
];

impl RegexDetector {
    /// Compile the default pattern set.
    pub fn new() -> Self {
        let patterns = PATTERN_DEFS
            .iter()
            .filter_map(|(entity_type, pattern)| match Regex::new(pattern) {
                Ok(regex) => Some(PatternSpec {
                    entity_type: *entity_type,
                    regex,
                }),
                Err(e) => {
                    tracing::error!(
                        entity_type = entity_type.as_str(),
                        error = %e,
                        "skipping unparseable detection pattern"
                    );
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    /// Detect structured identifiers in `text`.
    ///
    /// Returns entities sorted by start offset, confidence 1.0.
    pub fn detect(&self, text: &str) -> Vec<Entity> {
        let mut accepted: Vec<Entity> = Vec::new();

        for spec in &self.patterns {
            for m in spec.regex.find_iter(text) {
                if !post_validate(spec.entity_type, text, m.start(), m.end()) {
                    continue;
                }
                if accepted
                    .iter()
                    .any(|e| e.start < m.end() && m.start() < e.end)
                {
                    continue;
                }
                accepted.push(Entity {
                    text: m.as_str().to_string(),
                    entity_type: spec.entity_type,
                    start: m.start(),
                    end: m.end(),
                    confidence: 1.0,
                    method: Method::Regex,
                    description: spec.entity_type.label().to_string(),
                });
            }
        }

        accepted.sort_by_key(|e| (e.start, e.end));
        accepted
    }
}

impl Default for RegexDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Contextual checks the patterns themselves cannot express (the regex
/// engine has no lookarounds).
fn post_validate(entity_type: EntityType, text: &str, start: usize, end: usize) -> bool {
    let prev = text[..start].chars().next_back();
    let next = text[end..].chars().next();
    let matched = &text[start..end];

    match entity_type {
        // Must not sit inside a longer token.
        EntityType::Email => prev.is_none_or(|c| c.is_whitespace() || c == '('),
        EntityType::Phone => {
            if prev.is_some_and(|c| c.is_ascii_digit())
                || next.is_some_and(|c| c.is_ascii_digit())
            {
                return false;
            }
            // A bare digit run is not a phone number: require a separator
            // or an international prefix (possibly consumed by the match
            // at `start - 1`).
            matched.contains(['-', '.', ' ', '(', ')'])
                || matched.starts_with('+')
                || prev == Some('+')
        }
        EntityType::CreditCard => {
            matched.chars().filter(char::is_ascii_digit).count() == 16
        }
        EntityType::IpAddress => matched
            .split('.')
            .all(|octet| octet.parse::<u8>().is_ok()),
        _ => true,
    }
}
