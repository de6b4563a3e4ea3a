//! Redaction strategies and output validation.
//!
//! Redaction works over the full set of occurrences rather than only the
//! detected spans: each entity's text is searched case-insensitively across
//! the whole document so repeated mentions are redacted consistently, and
//! NAME entities are expanded to surface variants (first/last token,
//! possessives). Replacements are spliced in descending position order so
//! earlier offsets stay valid without bookkeeping.

use std::collections::HashMap;

use aho_corasick::{AhoCorasick, MatchKind};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::ScrubConfig;
use crate::entity::{Entity, EntityType};
use crate::error::ScrubError;

type HmacSha256 = Hmac<Sha256>;

/// How detected spans are rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedactionStrategy {
    /// Typed placeholder, e.g. `[EMAIL]`.
    Replace,
    /// HMAC-tagged placeholder, e.g. `[EMAIL_1a2b3c4d]`.
    Hash,
    /// Partial masking that keeps a recognizable shape.
    Mask,
    /// Delete the span entirely.
    Remove,
}

/// Outcome of validating redacted output.
#[derive(Debug, Clone)]
pub struct RedactionValidation {
    /// Whether the output is safe to return.
    pub valid: bool,
    /// Reasons the output was rejected. Never contains raw entity text.
    pub errors: Vec<String>,
}

/// Applies a redaction strategy and validates the result.
pub struct Redactor {
    strategy: RedactionStrategy,
    hash_key: Vec<u8>,
}

/// Context requirements for an occurrence to be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoundaryRule {
    /// Accept anywhere.
    Any,
    /// The preceding character must be whitespace, `(`, or start-of-text.
    EmailStart,
    /// Both neighbors must be whitespace, `.`/`,`, parens, or text edges.
    NameVariant,
}

struct Needle {
    text: String,
    entity_idx: usize,
    rule: BoundaryRule,
}

struct Occurrence {
    start: usize,
    end: usize,
    needle_idx: usize,
}

impl Redactor {
    /// Build a redactor from the scrub configuration.
    pub fn new(config: &ScrubConfig) -> Self {
        Self {
            strategy: config.strategy,
            hash_key: config.hash_key.clone().unwrap_or_default(),
        }
    }

    /// Replace every occurrence of every entity in `text`.
    pub fn apply(&self, text: &str, entities: &[Entity]) -> Result<String, ScrubError> {
        if entities.is_empty() {
            return Ok(text.to_string());
        }
        let needles = build_needles(entities);
        if needles.is_empty() {
            return Ok(text.to_string());
        }

        let matcher = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::LeftmostLongest)
            .build(needles.iter().map(|n| n.text.as_str()))
            .map_err(|e| ScrubError::Redaction(format!("matcher build failed: {e}")))?;

        let mut occurrences: Vec<Occurrence> = Vec::new();
        for m in matcher.find_iter(text) {
            let needle_idx = m.pattern().as_usize();
            if !boundary_ok(needles[needle_idx].rule, text, m.start(), m.end()) {
                continue;
            }
            occurrences.push(Occurrence {
                start: m.start(),
                end: m.end(),
                needle_idx,
            });
        }

        // Splice replacements back-to-front; positions of unprocessed
        // occurrences stay valid. On overlap the first-sorted wins.
        occurrences.sort_by(|a, b| b.start.cmp(&a.start).then(b.end.cmp(&a.end)));
        let mut result = text.to_string();
        let mut applied_floor = usize::MAX;
        for occ in occurrences {
            if occ.end > applied_floor {
                continue;
            }
            let entity = &entities[needles[occ.needle_idx].entity_idx];
            let replacement = self.replacement_for(entity, &text[occ.start..occ.end]);
            result.replace_range(occ.start..occ.end, &replacement);
            applied_floor = occ.start;
        }
        Ok(result)
    }

    /// Check that no entity text survived redaction.
    ///
    /// The comparison is a case-sensitive literal substring test with no
    /// Unicode normalization. An empty output for non-empty input is also
    /// rejected, regardless of strategy.
    pub fn validate(
        &self,
        original: &str,
        redacted: &str,
        entities: &[Entity],
    ) -> RedactionValidation {
        let mut errors = Vec::new();

        if !original.is_empty() && redacted.is_empty() {
            errors.push("redacted output is empty for non-empty input".to_string());
        }
        for entity in entities {
            let trimmed = entity.text.trim();
            if !trimmed.is_empty() && redacted.contains(trimmed) {
                errors.push(format!(
                    "{} entity text ({} chars) still present in output",
                    entity.entity_type.as_str(),
                    trimmed.chars().count()
                ));
            }
        }

        RedactionValidation {
            valid: errors.is_empty(),
            errors,
        }
    }

    fn replacement_for(&self, entity: &Entity, matched: &str) -> String {
        match self.strategy {
            RedactionStrategy::Replace => entity.entity_type.placeholder().to_string(),
            RedactionStrategy::Remove => String::new(),
            RedactionStrategy::Hash => format!(
                "[{}_{}]",
                entity.entity_type.as_str(),
                self.hash_tag(entity.text.trim())
            ),
            RedactionStrategy::Mask => mask_value(entity.entity_type, matched),
        }
    }

    /// First 8 lowercase hex chars of HMAC-SHA256 over the entity text.
    fn hash_tag(&self, text: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.hash_key)
            .expect("HMAC accepts keys of any length");
        mac.update(text.as_bytes());
        let digest = mac.finalize().into_bytes();
        digest[..4].iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Expand entities into the needles searched during redaction.
///
/// Every entity contributes its trimmed text; NAME entities additionally
/// contribute first/last tokens and possessive forms, which only match at
/// word-like boundaries. Needles are deduplicated case-insensitively,
/// keeping the least restrictive boundary rule.
fn build_needles(entities: &[Entity]) -> Vec<Needle> {
    let mut needles: Vec<Needle> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (i, entity) in entities.iter().enumerate() {
        let trimmed = entity.text.trim();
        if trimmed.is_empty() {
            continue;
        }
        let base_rule = if entity.entity_type == EntityType::Email {
            BoundaryRule::EmailStart
        } else {
            BoundaryRule::Any
        };
        push_needle(&mut needles, &mut index, trimmed.to_string(), i, base_rule);

        if entity.entity_type == EntityType::Name {
            let tokens: Vec<&str> = trimmed.split_whitespace().collect();
            let mut variants: Vec<String> = Vec::new();
            if tokens.len() >= 2 {
                variants.push(tokens[0].to_string());
                variants.push(tokens[tokens.len() - 1].to_string());
            }
            variants.push(format!("{trimmed}'s"));
            for token in variants.clone() {
                if !token.ends_with("'s") {
                    variants.push(format!("{token}'s"));
                }
            }
            for variant in variants {
                push_needle(&mut needles, &mut index, variant, i, BoundaryRule::NameVariant);
            }
        }
    }
    needles
}

fn push_needle(
    needles: &mut Vec<Needle>,
    index: &mut HashMap<String, usize>,
    text: String,
    entity_idx: usize,
    rule: BoundaryRule,
) {
    if text.is_empty() {
        return;
    }
    let key = text.to_lowercase();
    match index.get(&key) {
        Some(&existing) => {
            // A duplicate with a looser rule relaxes the needle.
            if rule == BoundaryRule::Any {
                needles[existing].rule = BoundaryRule::Any;
            }
        }
        None => {
            index.insert(key, needles.len());
            needles.push(Needle {
                text,
                entity_idx,
                rule,
            });
        }
    }
}

fn boundary_ok(rule: BoundaryRule, text: &str, start: usize, end: usize) -> bool {
    let prev = text[..start].chars().next_back();
    let next = text[end..].chars().next();
    match rule {
        BoundaryRule::Any => true,
        BoundaryRule::EmailStart => prev.is_none_or(|c| c.is_whitespace() || c == '('),
        BoundaryRule::NameVariant => is_name_boundary(prev) && is_name_boundary(next),
    }
}

fn is_name_boundary(c: Option<char>) -> bool {
    match c {
        None => true,
        Some(c) => c.is_whitespace() || matches!(c, '.' | ',' | '(' | ')'),
    }
}

/// Type-specific partial masking.
fn mask_value(entity_type: EntityType, matched: &str) -> String {
    match entity_type {
        EntityType::Email => mask_email(matched),
        EntityType::Phone => {
            let digits: Vec<char> = matched.chars().filter(char::is_ascii_digit).collect();
            let last4: String = digits[digits.len().saturating_sub(4)..].iter().collect();
            format!("***-***-{last4}")
        }
        EntityType::Name => matched
            .split_whitespace()
            .map(|token| {
                let mut out = String::new();
                let mut chars = token.chars();
                if let Some(first) = chars.next() {
                    out.push(first);
                }
                out.extend(std::iter::repeat_n('*', chars.count().min(3)));
                out
            })
            .collect::<Vec<_>>()
            .join(" "),
        EntityType::Ssn | EntityType::CreditCard => {
            let total = matched.chars().count();
            matched
                .chars()
                .enumerate()
                .map(|(i, c)| if i + 4 < total { '*' } else { c })
                .collect()
        }
        _ => "*".repeat(matched.chars().count().min(8)),
    }
}

fn mask_email(matched: &str) -> String {
    if let Some((local, domain)) = matched.split_once('@') {
        if let Some((host, tld)) = domain.rsplit_once('.') {
            let l = local.chars().next().unwrap_or('*');
            let h = host.chars().next().unwrap_or('*');
            return format!("{l}***@{h}***.{tld}");
        }
    }
    "*".repeat(matched.chars().count().min(8))
}
