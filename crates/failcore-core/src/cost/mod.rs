// crates/failcore-core/src/cost/mod.rs
// ============================================================================
// Module: Failcore Cost Model
// Description: Budgets, estimates, usage records, and usage extraction.
// Purpose: Provide the data model consumed by the cost guardian.
// Dependencies: crate::core::decision, serde, serde_json
// ============================================================================

//! ## Overview
//! The cost model tracks per-run USD spend, token counts, and API calls.
//! Usage is extracted from common tool output shapes
//! (`usage.prompt_tokens`/`input_tokens`, `completion_tokens`/`output_tokens`,
//! `total_tokens`) and normalised into one record. Missing pricing yields a
//! zero-cost estimate flagged `estimated`; it never blocks by itself.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod guardian;
pub mod pricing;

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::decision::ErrorCode;

// ============================================================================
// SECTION: Budget
// ============================================================================

/// Per-run budget limits; `None` disables the corresponding limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    /// Total spend limit in USD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost_usd: Option<f64>,
    /// Total token limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    /// Total API call limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_api_calls: Option<u64>,
    /// Burn-rate limit in USD per minute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_usd_per_minute: Option<f64>,
    /// Burn-rate limit in USD per hour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_usd_per_hour: Option<f64>,
}

// ============================================================================
// SECTION: Estimates and Usage
// ============================================================================

/// Pre-execution cost estimate for one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Estimated spend in USD.
    pub cost_usd: f64,
    /// Estimated token count.
    pub tokens: u64,
    /// The estimate is a guess (pricing missing or heuristic).
    #[serde(default)]
    pub estimated: bool,
}

/// Post-execution usage extracted from tool output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostUsage {
    /// Actual spend in USD.
    pub cost_usd: f64,
    /// Input token count.
    pub input_tokens: u64,
    /// Output token count.
    pub output_tokens: u64,
    /// Total token count.
    pub total_tokens: u64,
    /// API calls represented by this record.
    pub api_calls: u64,
}

/// Cumulative totals for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostTotals {
    /// Cumulative spend in USD.
    pub cost_usd: f64,
    /// Cumulative total tokens.
    pub total_tokens: u64,
    /// Cumulative input tokens.
    pub input_tokens: u64,
    /// Cumulative output tokens.
    pub output_tokens: u64,
    /// Cumulative API calls.
    pub api_calls: u64,
}

impl CostTotals {
    /// Accumulates one usage record.
    pub fn apply(&mut self, usage: &CostUsage) {
        self.cost_usd += usage.cost_usd;
        self.total_tokens = self.total_tokens.saturating_add(usage.total_tokens);
        self.input_tokens = self.input_tokens.saturating_add(usage.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(usage.output_tokens);
        self.api_calls = self.api_calls.saturating_add(usage.api_calls);
    }
}

// ============================================================================
// SECTION: Limits and Alerts
// ============================================================================

/// Enforced budget dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    /// Total USD budget.
    CostUsd,
    /// Total token budget.
    Tokens,
    /// Total API call budget.
    ApiCalls,
    /// USD-per-minute burn rate.
    UsdPerMinute,
    /// USD-per-hour burn rate.
    UsdPerHour,
}

impl LimitKind {
    /// Returns the decision code for exceeding this limit.
    #[must_use]
    pub const fn error_code(self) -> ErrorCode {
        match self {
            Self::CostUsd => ErrorCode::EconomicBudgetExceeded,
            Self::Tokens => ErrorCode::EconomicTokenLimit,
            Self::ApiCalls => ErrorCode::EconomicApiCallLimit,
            Self::UsdPerMinute | Self::UsdPerHour => ErrorCode::EconomicBurnRateExceeded,
        }
    }
}

/// Threshold alert raised while recording usage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostAlert {
    /// Limit dimension approaching exhaustion.
    pub limit: LimitKind,
    /// Threshold that fired (`0.80`, `0.90`, or `0.95`).
    pub threshold: f64,
    /// Consumed fraction of the limit when the alert fired.
    pub ratio: f64,
}

/// Alert thresholds checked against each enforced limit.
pub const ALERT_THRESHOLDS: [f64; 3] = [0.80, 0.90, 0.95];

// ============================================================================
// SECTION: Check Outcome
// ============================================================================

/// Outcome of a pre-execution budget check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostCheck {
    /// The operation may proceed.
    pub allowed: bool,
    /// Denial reason, when refused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Denial code, when refused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

impl CostCheck {
    /// Returns an allowing check.
    #[must_use]
    pub const fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
            error_code: None,
        }
    }

    /// Returns a denying check for the given limit.
    #[must_use]
    pub fn denied(limit: LimitKind, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            error_code: Some(limit.error_code()),
        }
    }
}

// ============================================================================
// SECTION: Usage Extraction
// ============================================================================

/// Extracts a usage record from common tool output shapes.
///
/// Recognises `{"usage": {...}}` and bare usage objects with
/// `prompt_tokens`/`input_tokens` and `completion_tokens`/`output_tokens`
/// members. Returns `None` when no usage shape is present.
#[must_use]
pub fn extract_usage(output: &Value) -> Option<CostUsage> {
    let usage = output.get("usage").unwrap_or(output);
    let input = field_u64(usage, &["prompt_tokens", "input_tokens"]);
    let output_tokens = field_u64(usage, &["completion_tokens", "output_tokens"]);
    let total = field_u64(usage, &["total_tokens"]);
    if input.is_none() && output_tokens.is_none() && total.is_none() {
        return None;
    }
    let input = input.unwrap_or(0);
    let output_tokens = output_tokens.unwrap_or(0);
    let total = total.unwrap_or_else(|| input.saturating_add(output_tokens));
    Some(CostUsage {
        cost_usd: usage.get("cost_usd").and_then(Value::as_f64).unwrap_or(0.0),
        input_tokens: input,
        output_tokens,
        total_tokens: total,
        api_calls: 1,
    })
}

/// Reads the first present unsigned integer member among aliases.
fn field_u64(value: &Value, names: &[&str]) -> Option<u64> {
    names.iter().find_map(|name| value.get(*name).and_then(Value::as_u64))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only panic-based assertions are permitted.")]

    use serde_json::json;

    use super::extract_usage;

    /// Tests the OpenAI-style usage shape.
    #[test]
    fn test_extract_prompt_completion_shape() {
        let output = json!({"usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}});
        let usage = extract_usage(&output).unwrap();
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.output_tokens, 5);
        assert_eq!(usage.total_tokens, 15);
        assert_eq!(usage.api_calls, 1);
    }

    /// Tests the input/output alias shape with a derived total.
    #[test]
    fn test_extract_input_output_shape() {
        let output = json!({"usage": {"input_tokens": 7, "output_tokens": 3}});
        let usage = extract_usage(&output).unwrap();
        assert_eq!(usage.total_tokens, 10);
    }

    /// Tests outputs without usage yield nothing.
    #[test]
    fn test_extract_absent_usage() {
        assert!(extract_usage(&json!({"result": "ok"})).is_none());
    }
}
