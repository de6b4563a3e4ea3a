//! Cost tracking for LLM detection calls.
//!
//! The expense tracker is the only externally visible side effect of the
//! detector; with no tracker configured the pipeline is deterministic for
//! a fixed LLM response.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tokio::sync::Mutex;

/// One tracked LLM call.
#[derive(Debug, Clone, Serialize)]
pub struct ExpenseEvent {
    /// Model that served the call.
    pub model: String,
    /// Operation name, e.g. `pii_detection`.
    pub operation: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub metadata: ExpenseMetadata,
}

/// Request context recorded with each event.
#[derive(Debug, Clone, Serialize)]
pub struct ExpenseMetadata {
    /// Zero-based attempt that succeeded.
    pub attempt: u32,
    /// Input length in bytes.
    pub text_length: usize,
    /// Deadline applied to the call, in milliseconds.
    pub timeout_ms: u64,
    /// Whether the deadline was size-scaled.
    pub adaptive_timeout: bool,
}

/// Sink for expense events. Implementations must be safe to call from
/// concurrent chunk workers.
#[async_trait]
pub trait ExpenseTracker: Send + Sync {
    /// Record one event.
    async fn track(&self, event: ExpenseEvent);
}

/// In-memory tracker with per-1k-token cost estimation.
pub struct MemoryExpenseTracker {
    events: Mutex<Vec<ExpenseEvent>>,
    input_rate_per_1k: Decimal,
    output_rate_per_1k: Decimal,
}

impl MemoryExpenseTracker {
    /// Create a tracker with default rates.
    pub fn new() -> Self {
        Self::with_rates(dec!(0.003), dec!(0.015))
    }

    /// Create a tracker with explicit USD rates per 1K tokens.
    pub fn with_rates(input_rate_per_1k: Decimal, output_rate_per_1k: Decimal) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            input_rate_per_1k,
            output_rate_per_1k,
        }
    }

    /// Snapshot of all recorded events.
    pub async fn events(&self) -> Vec<ExpenseEvent> {
        self.events.lock().await.clone()
    }

    /// Total `(input, output)` tokens across recorded events.
    pub async fn total_tokens(&self) -> (u64, u64) {
        let events = self.events.lock().await;
        events.iter().fold((0, 0), |(input, output), e| {
            (input + e.input_tokens as u64, output + e.output_tokens as u64)
        })
    }

    /// Estimated cost of all recorded events.
    pub async fn estimated_cost(&self) -> Decimal {
        let (input, output) = self.total_tokens().await;
        (Decimal::from(input) / dec!(1000)) * self.input_rate_per_1k
            + (Decimal::from(output) / dec!(1000)) * self.output_rate_per_1k
    }
}

impl Default for MemoryExpenseTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExpenseTracker for MemoryExpenseTracker {
    async fn track(&self, event: ExpenseEvent) {
        self.events.lock().await.push(event);
    }
}
