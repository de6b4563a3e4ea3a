//! Core value types for detected PII spans.

/// Category of a detected PII span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityType {
    Email,
    Phone,
    Ssn,
    CreditCard,
    IpAddress,
    ZipCode,
    Name,
    Address,
    Dob,
    Medical,
    Financial,
    Employer,
    /// Fallback for redaction of spans with no recognized category.
    Unknown,
}

impl EntityType {
    /// Wire name used in audits and LLM prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::Phone => "PHONE",
            Self::Ssn => "SSN",
            Self::CreditCard => "CREDIT_CARD",
            Self::IpAddress => "IP_ADDRESS",
            Self::ZipCode => "ZIP_CODE",
            Self::Name => "NAME",
            Self::Address => "ADDRESS",
            Self::Dob => "DOB",
            Self::Medical => "MEDICAL",
            Self::Financial => "FINANCIAL",
            Self::Employer => "EMPLOYER",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Human-readable label, used as the entity description.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Email => "Email address",
            Self::Phone => "Phone number",
            Self::Ssn => "Social Security number",
            Self::CreditCard => "Credit card number",
            Self::IpAddress => "IP address",
            Self::ZipCode => "ZIP code",
            Self::Name => "Person name",
            Self::Address => "Physical address",
            Self::Dob => "Date of birth",
            Self::Medical => "Medical information",
            Self::Financial => "Financial information",
            Self::Employer => "Employer name",
            Self::Unknown => "Sensitive information",
        }
    }

    /// Placeholder token for the `replace` redaction strategy.
    pub fn placeholder(&self) -> &'static str {
        match self {
            Self::Email => "[EMAIL]",
            Self::Phone => "[PHONE]",
            Self::Ssn => "[SSN]",
            Self::CreditCard => "[CREDIT_CARD]",
            Self::IpAddress => "[IP]",
            Self::ZipCode => "[ZIP]",
            Self::Name => "[NAME]",
            Self::Address => "[ADDRESS]",
            Self::Dob => "[DOB]",
            Self::Medical => "[MEDICAL_INFO]",
            Self::Financial => "[FINANCIAL_INFO]",
            Self::Employer => "[EMPLOYER]",
            Self::Unknown => "[REDACTED]",
        }
    }

    /// Parse a category name returned by the LLM.
    ///
    /// Only the semantic categories the model is asked for are accepted;
    /// anything else is treated as an invalid entity and dropped upstream.
    pub fn from_llm_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "NAME" => Some(Self::Name),
            "ADDRESS" => Some(Self::Address),
            "DOB" => Some(Self::Dob),
            "MEDICAL" => Some(Self::Medical),
            "FINANCIAL" => Some(Self::Financial),
            "EMPLOYER" => Some(Self::Employer),
            _ => None,
        }
    }
}

/// Which detector produced an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Regex,
    Llm,
}

impl Method {
    /// Wire name used in audits.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regex => "regex",
            Self::Llm => "llm",
        }
    }
}

/// A detected PII span.
///
/// Offsets are byte offsets into the source text, half-open, and always lie
/// on character boundaries because they originate from actual matches
/// against the source. `text` equals `source[start..end]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Literal substring found in the source.
    pub text: String,
    /// Category of the span.
    pub entity_type: EntityType,
    /// Start byte offset (inclusive).
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
    /// Detection confidence in `[0, 1]`. Regex matches are always 1.0.
    pub confidence: f64,
    /// Detector that produced the span.
    pub method: Method,
    /// Human-readable category label.
    pub description: String,
}

impl Entity {
    /// Half-open interval overlap test.
    pub fn overlaps(&self, other: &Entity) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Span length in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// True when the span is empty (never the case for valid entities).
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}
