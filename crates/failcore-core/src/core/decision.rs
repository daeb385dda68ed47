// crates/failcore-core/src/core/decision.rs
// ============================================================================
// Module: Failcore Decision Contract
// Description: Stable verdict-and-evidence unit emitted by validators.
// Purpose: Provide the append-only DecisionV1 structure and its closed enums.
// Dependencies: crate::core::identifiers, serde, serde_json
// ============================================================================

//! ## Overview
//! `DecisionV1` is the stable unit every validator produces and every gate
//! consumes. Codes are normalised against a closed taxonomy; unknown upstream
//! codes collapse to `UNKNOWN` while security codes are preserved verbatim.
//! Evidence is safe to share: secret material is always replaced by
//! `(hash, last4, category)` summaries before it reaches a decision.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::ValidatorId;

// ============================================================================
// SECTION: Evidence
// ============================================================================

/// Structured evidence carried by a decision.
///
/// Keys are ordered deterministically; values never contain raw secret data.
pub type Evidence = BTreeMap<String, Value>;

/// Evidence key naming the finding class used for deduplication.
pub const EVIDENCE_FINDING_CLASS: &str = "finding_class";
/// Evidence key naming the matched parameter used for deduplication.
pub const EVIDENCE_MATCHED_PARAM: &str = "matched_param";
/// Evidence key listing codes suppressed in favour of this decision.
pub const EVIDENCE_SUPPRESSED_CODES: &str = "suppressed_codes";
/// Evidence key flagging a scan-cache hit.
pub const EVIDENCE_SCAN_CACHE_HIT: &str = "scan_cache_hit";
/// Evidence key carrying the shortened scan hash.
pub const EVIDENCE_SCAN_HASH: &str = "scan_hash";

// ============================================================================
// SECTION: Verdict
// ============================================================================

/// Final action class for a decision or an aggregated verdict.
///
/// # Invariants
/// - Precedence is `BLOCK > SANITIZE > WARN > ALLOW`; the ordering of the
///   variants encodes increasing strength.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Permit the action unchanged.
    Allow,
    /// Permit the action and record a warning.
    Warn,
    /// Permit the action with redacted parameters substituted.
    Sanitize,
    /// Refuse the action; terminal for the step.
    Block,
}

impl Verdict {
    /// Returns the stronger of two verdicts.
    #[must_use]
    pub fn strongest(self, other: Self) -> Self {
        self.max(other)
    }

    /// Returns the stable wire form of the verdict.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "ALLOW",
            Self::Warn => "WARN",
            Self::Sanitize => "SANITIZE",
            Self::Block => "BLOCK",
        }
    }
}

// ============================================================================
// SECTION: Risk Level
// ============================================================================

/// Severity classification attached to a decision.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Informational risk.
    Low,
    /// Elevated risk.
    Medium,
    /// Serious risk.
    High,
    /// Maximum risk.
    Critical,
}

impl RiskLevel {
    /// Returns the stable wire form of the risk level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

// ============================================================================
// SECTION: Decision Domain
// ============================================================================

/// Domain that produced a decision, used for dedup precedence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DecisionDomain {
    /// Security checks (paths, network, sandbox).
    Security,
    /// Data-loss-prevention checks.
    Dlp,
    /// Semantic intent checks over parsed structure.
    Semantic,
    /// Taint-flow provenance checks.
    TaintFlow,
    /// Post-run parameter drift.
    Drift,
    /// Economic budget checks.
    Cost,
    /// Per-tool contract checks.
    Contract,
    /// Anything else, including synthetic engine decisions.
    Other,
}

impl DecisionDomain {
    /// Returns the dedup precedence rank; higher ranks win suppression.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Security => 100,
            Self::Dlp => 80,
            Self::Semantic => 60,
            Self::TaintFlow => 40,
            Self::Drift => 20,
            Self::Cost | Self::Contract | Self::Other => 0,
        }
    }

    /// Returns a stable label for ordering tie-breaks.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::Dlp => "dlp",
            Self::Semantic => "semantic",
            Self::TaintFlow => "taint_flow",
            Self::Drift => "drift",
            Self::Cost => "cost",
            Self::Contract => "contract",
            Self::Other => "other",
        }
    }
}

// ============================================================================
// SECTION: Error Codes
// ============================================================================

/// Closed, wire-stable decision code taxonomy.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
/// - Unknown upstream codes must be normalised through [`ErrorCode::normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Security.
    /// Action denied by explicit policy.
    PolicyDenied,
    /// Path escaped the configured sandbox root.
    SandboxViolation,
    /// Relative path traversal detected.
    PathTraversal,
    /// Path failed structural validation.
    PathInvalid,
    /// Absolute path outside the allowlist.
    AbsolutePath,
    /// Symlink resolution escaped the sandbox.
    SymlinkEscape,
    /// Server-side request forgery attempt blocked.
    SsrfBlocked,
    /// Private or link-local network target blocked.
    PrivateNetworkBlocked,
    /// Semantic rule violation.
    SemanticViolation,
    /// Predicted side effect crossed the declared boundary.
    SideEffectBoundaryCrossed,
    // Resource.
    /// Step wall-clock limit exceeded.
    ResourceLimitTimeout,
    /// Output size limit exceeded.
    ResourceLimitOutput,
    /// Event count limit exceeded.
    ResourceLimitEvents,
    /// File size limit exceeded.
    ResourceLimitFile,
    /// Concurrency limit exceeded.
    ResourceLimitConcurrency,
    // Cost.
    /// Total cost budget exhausted.
    EconomicBudgetExceeded,
    /// Token budget exhausted.
    EconomicTokenLimit,
    /// Burn-rate window limit exceeded.
    EconomicBurnRateExceeded,
    /// API call count limit exceeded.
    EconomicApiCallLimit,
    /// Cost estimation failed.
    EconomicCostEstimationFailed,
    // DLP / taint.
    /// Sensitive data egress prevented.
    DataLeakPrevented,
    /// Tainted data reached a sink.
    DataTainted,
    /// Parameters require sanitization before use.
    SanitizationRequired,
    /// Observed parameters drifted from the tool's baseline.
    ContractDrift,
    // Generic.
    /// Unrecognised upstream code.
    Unknown,
    /// Internal validator or engine failure.
    InternalError,
    /// Malformed argument.
    InvalidArgument,
    /// Required precondition missing.
    PreconditionFailed,
    /// Behaviour not implemented.
    NotImplemented,
    /// Operation timed out.
    Timeout,
    /// Run was cancelled.
    Cancelled,
}

impl ErrorCode {
    /// Returns the stable wire form of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PolicyDenied => "POLICY_DENIED",
            Self::SandboxViolation => "SANDBOX_VIOLATION",
            Self::PathTraversal => "PATH_TRAVERSAL",
            Self::PathInvalid => "PATH_INVALID",
            Self::AbsolutePath => "ABSOLUTE_PATH",
            Self::SymlinkEscape => "SYMLINK_ESCAPE",
            Self::SsrfBlocked => "SSRF_BLOCKED",
            Self::PrivateNetworkBlocked => "PRIVATE_NETWORK_BLOCKED",
            Self::SemanticViolation => "SEMANTIC_VIOLATION",
            Self::SideEffectBoundaryCrossed => "SIDE_EFFECT_BOUNDARY_CROSSED",
            Self::ResourceLimitTimeout => "RESOURCE_LIMIT_TIMEOUT",
            Self::ResourceLimitOutput => "RESOURCE_LIMIT_OUTPUT",
            Self::ResourceLimitEvents => "RESOURCE_LIMIT_EVENTS",
            Self::ResourceLimitFile => "RESOURCE_LIMIT_FILE",
            Self::ResourceLimitConcurrency => "RESOURCE_LIMIT_CONCURRENCY",
            Self::EconomicBudgetExceeded => "ECONOMIC_BUDGET_EXCEEDED",
            Self::EconomicTokenLimit => "ECONOMIC_TOKEN_LIMIT",
            Self::EconomicBurnRateExceeded => "ECONOMIC_BURN_RATE_EXCEEDED",
            Self::EconomicApiCallLimit => "ECONOMIC_API_CALL_LIMIT",
            Self::EconomicCostEstimationFailed => "ECONOMIC_COST_ESTIMATION_FAILED",
            Self::DataLeakPrevented => "DATA_LEAK_PREVENTED",
            Self::DataTainted => "DATA_TAINTED",
            Self::SanitizationRequired => "SANITIZATION_REQUIRED",
            Self::ContractDrift => "CONTRACT_DRIFT",
            Self::Unknown => "UNKNOWN",
            Self::InternalError => "INTERNAL_ERROR",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::PreconditionFailed => "PRECONDITION_FAILED",
            Self::NotImplemented => "NOT_IMPLEMENTED",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Returns `true` when the code belongs to the security group.
    #[must_use]
    pub const fn is_security(self) -> bool {
        matches!(
            self,
            Self::PolicyDenied
                | Self::SandboxViolation
                | Self::PathTraversal
                | Self::PathInvalid
                | Self::AbsolutePath
                | Self::SymlinkEscape
                | Self::SsrfBlocked
                | Self::PrivateNetworkBlocked
                | Self::SemanticViolation
                | Self::SideEffectBoundaryCrossed
        )
    }

    /// Normalises an upstream code string against the closed taxonomy.
    ///
    /// Unknown codes collapse to [`ErrorCode::Unknown`]; recognised codes,
    /// including all security codes, are preserved.
    #[must_use]
    pub fn normalize(code: &str) -> Self {
        serde_json::from_value(Value::String(code.to_string())).unwrap_or(Self::Unknown)
    }
}

// ============================================================================
// SECTION: Remediation
// ============================================================================

/// Templated fix hint attached to a blocked or warned decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remediation {
    /// Remediation template with `{var}` placeholders.
    pub template: String,
    /// Template variable bindings.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, String>,
}

// ============================================================================
// SECTION: DecisionV1
// ============================================================================

/// Stable, append-only verdict-and-evidence unit.
///
/// # Invariants
/// - `evidence` never contains raw secret material.
/// - Fields are append-only; removing or renaming fields is a breaking change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionV1 {
    /// Normalised decision code.
    pub code: ErrorCode,
    /// Action class for this decision.
    pub decision: Verdict,
    /// Severity classification.
    pub risk_level: RiskLevel,
    /// Producing domain.
    pub domain: DecisionDomain,
    /// Validator that produced the decision.
    pub validator_id: ValidatorId,
    /// Human-readable, redacted message.
    pub message: String,
    /// Structured, shareable findings.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub evidence: Evidence,
    /// Optional templated remediation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<Remediation>,
    /// Optional one-line fix suggestion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Optional LLM-oriented hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Code of the decision that suppressed this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppressed_by: Option<String>,
    /// Stable suppression reason label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppression_reason: Option<String>,
    /// Human-readable suppression explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppression_explanation: Option<String>,
    /// Free-form tags (`shadow`, `breakglass`, ...).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Indicates the action would need live approval.
    #[serde(default)]
    pub requires_approval: bool,
    /// Indicates the decision may be overridden with a token.
    #[serde(default)]
    pub overrideable: bool,
}

impl DecisionV1 {
    /// Creates a decision with empty evidence and no hints.
    #[must_use]
    pub fn new(
        validator_id: ValidatorId,
        code: ErrorCode,
        decision: Verdict,
        risk_level: RiskLevel,
        domain: DecisionDomain,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            decision,
            risk_level,
            domain,
            validator_id,
            message: message.into(),
            evidence: Evidence::new(),
            remediation: None,
            suggestion: None,
            hint: None,
            suppressed_by: None,
            suppression_reason: None,
            suppression_explanation: None,
            tags: Vec::new(),
            requires_approval: false,
            overrideable: false,
        }
    }

    /// Creates the synthetic fail-open decision for an internal validator error.
    #[must_use]
    pub fn internal_error(validator_id: ValidatorId, cause: impl Into<String>) -> Self {
        let mut decision = Self::new(
            validator_id,
            ErrorCode::InternalError,
            Verdict::Warn,
            RiskLevel::Low,
            DecisionDomain::Other,
            "validator failed internally; action not blocked",
        );
        decision.evidence.insert("cause".to_string(), Value::String(cause.into()));
        decision
    }

    /// Returns `true` when this decision was suppressed by deduplication.
    #[must_use]
    pub const fn is_suppressed(&self) -> bool {
        self.suppressed_by.is_some()
    }

    /// Returns `true` when this decision is observation-only shadow output.
    #[must_use]
    pub fn is_shadow(&self) -> bool {
        self.tags.iter().any(|tag| tag == "shadow")
    }

    /// Returns the dedup suppression key when the evidence carries one.
    #[must_use]
    pub fn suppression_key(&self) -> Option<(String, String)> {
        let class = self.evidence.get(EVIDENCE_FINDING_CLASS)?.as_str()?;
        let param = self.evidence.get(EVIDENCE_MATCHED_PARAM)?.as_str()?;
        Some((param.to_string(), class.to_string()))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::DecisionDomain;
    use super::ErrorCode;
    use super::Verdict;

    /// Tests verdict precedence ordering.
    #[test]
    fn test_verdict_precedence() {
        assert!(Verdict::Block > Verdict::Sanitize);
        assert!(Verdict::Sanitize > Verdict::Warn);
        assert!(Verdict::Warn > Verdict::Allow);
        assert_eq!(Verdict::Warn.strongest(Verdict::Block), Verdict::Block);
    }

    /// Tests unknown codes collapse while security codes survive.
    #[test]
    fn test_code_normalization() {
        assert_eq!(ErrorCode::normalize("PATH_TRAVERSAL"), ErrorCode::PathTraversal);
        assert_eq!(ErrorCode::normalize("SSRF_BLOCKED"), ErrorCode::SsrfBlocked);
        assert_eq!(ErrorCode::normalize("SOMETHING_NEW"), ErrorCode::Unknown);
    }

    /// Tests domain dedup ranks.
    #[test]
    fn test_domain_ranks() {
        assert_eq!(DecisionDomain::Security.rank(), 100);
        assert_eq!(DecisionDomain::Dlp.rank(), 80);
        assert_eq!(DecisionDomain::Semantic.rank(), 60);
        assert_eq!(DecisionDomain::TaintFlow.rank(), 40);
        assert_eq!(DecisionDomain::Drift.rank(), 20);
        assert_eq!(DecisionDomain::Cost.rank(), 0);
    }
}
