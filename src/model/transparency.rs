//! AI-usage transparency record
//!
//! At most one record exists per session. A session may invoke the model more
//! than once, so resource-usage fields (tokens, cost, call count) accumulate
//! across calls while descriptive fields (model, temperature, confidence)
//! reflect the most recent call.

use serde::{Deserialize, Serialize};

/// Per-session AI-usage summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyRecord {
    pub session_id: String,

    /// Most recent model identity, e.g. "gpt-4"
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,

    /// Cumulative across all model calls in the session
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub estimated_cost: f64,

    pub confidence: Option<f64>,
    pub ai_processing_time_ms: Option<u64>,

    /// Number of model invocations reported for this session
    pub api_call_count: u32,
}

/// Partial input for `set_transparency`
///
/// Unset cumulative fields count as zero; unset descriptive fields leave the
/// stored value untouched. `api_call_count` defaults to one call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransparencyUpdate {
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,

    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    pub estimated_cost: Option<f64>,

    pub confidence: Option<f64>,
    pub ai_processing_time_ms: Option<u64>,

    pub api_call_count: Option<u32>,
}

impl TransparencyRecord {
    /// Create the session's record from the first reported update
    pub fn from_update(session_id: impl Into<String>, update: &TransparencyUpdate) -> Self {
        Self {
            session_id: session_id.into(),
            model: update.model.clone(),
            temperature: update.temperature,
            max_tokens: update.max_tokens,
            prompt_tokens: update.prompt_tokens.unwrap_or(0),
            completion_tokens: update.completion_tokens.unwrap_or(0),
            total_tokens: update.total_tokens.unwrap_or(0),
            estimated_cost: update.estimated_cost.unwrap_or(0.0),
            confidence: update.confidence,
            ai_processing_time_ms: update.ai_processing_time_ms,
            api_call_count: update.api_call_count.unwrap_or(1),
        }
    }

    /// Merge a later update: sum the cumulative fields, overwrite the
    /// point-in-time ones
    pub fn accumulate(&mut self, update: &TransparencyUpdate) {
        self.prompt_tokens += update.prompt_tokens.unwrap_or(0);
        self.completion_tokens += update.completion_tokens.unwrap_or(0);
        self.total_tokens += update.total_tokens.unwrap_or(0);
        self.estimated_cost += update.estimated_cost.unwrap_or(0.0);
        self.api_call_count += update.api_call_count.unwrap_or(1);

        if update.model.is_some() {
            self.model = update.model.clone();
        }
        if update.temperature.is_some() {
            self.temperature = update.temperature;
        }
        if update.max_tokens.is_some() {
            self.max_tokens = update.max_tokens;
        }
        if update.confidence.is_some() {
            self.confidence = update.confidence;
        }
        if update.ai_processing_time_ms.is_some() {
            self.ai_processing_time_ms = update.ai_processing_time_ms;
        }
    }
}
