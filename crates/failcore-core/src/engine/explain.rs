// crates/failcore-core/src/engine/explain.rs
// ============================================================================
// Module: Failcore Explain Output
// Description: Redacted, human-readable rendering of an attempt's outcome.
// Purpose: Make every verdict, suppression, and downgrade auditable.
// Dependencies: crate::{core, policy}, serde
// ============================================================================

//! ## Overview
//! `explain` renders the full picture of one attempt: the verdict, every
//! decision (suppressed and shadow entries included), and any breakglass
//! audit entries. The rendering is built from already-redacted structures,
//! so it is safe to show to operators and models alike.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;

use serde::Deserialize;
use serde::Serialize;

use crate::core::decision::DecisionV1;
use crate::core::trace::VerdictSummary;
use crate::policy::BreakglassAuditEntry;

// ============================================================================
// SECTION: Explain Report
// ============================================================================

/// Structured explain output for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainReport {
    /// Aggregated verdict.
    pub verdict: VerdictSummary,
    /// Full decision list, suppressed entries included.
    pub decisions: Vec<DecisionV1>,
    /// Breakglass audit entries in effect.
    pub breakglass: Vec<BreakglassAuditEntry>,
}

impl ExplainReport {
    /// Builds a report from an attempt's parts.
    #[must_use]
    pub fn new(
        verdict: VerdictSummary,
        decisions: Vec<DecisionV1>,
        breakglass: Vec<BreakglassAuditEntry>,
    ) -> Self {
        Self {
            verdict,
            decisions,
            breakglass,
        }
    }

    /// Renders the report as operator-facing text.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "verdict: {} ({}, {}, {})",
            self.verdict.decision.as_str(),
            self.verdict.code.as_str(),
            self.verdict.domain.as_str(),
            self.verdict.risk_level.as_str(),
        );
        let _ = writeln!(out, "decisions:");
        for decision in &self.decisions {
            let mut line = format!(
                "  - [{}] {} {}: {}",
                decision.decision.as_str(),
                decision.code.as_str(),
                decision.validator_id,
                decision.message,
            );
            if decision.is_shadow() {
                line.push_str(" [shadow]");
            }
            if let (Some(by), Some(reason)) =
                (&decision.suppressed_by, &decision.suppression_reason)
            {
                let _ = write!(line, " (suppressed by {by}: {reason})");
            }
            let _ = writeln!(out, "{line}");
            if let Some(suggestion) = &decision.suggestion {
                let _ = writeln!(out, "      suggestion: {suggestion}");
            }
            if let Some(remediation) = &decision.remediation {
                let _ = writeln!(out, "      remediation: {}", remediation.template);
            }
            if let Some(hint) = &decision.hint {
                let _ = writeln!(out, "      hint: {hint}");
            }
        }
        if !self.breakglass.is_empty() {
            let _ = writeln!(out, "breakglass:");
            for entry in &self.breakglass {
                let _ = writeln!(
                    out,
                    "  - by {} ({}), expires_at {}, affected: {}",
                    entry.enabled_by,
                    entry.reason,
                    entry.expires_at,
                    entry.affected_decisions.join(", "),
                );
            }
        }
        out
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::ExplainReport;
    use crate::core::decision::DecisionDomain;
    use crate::core::decision::DecisionV1;
    use crate::core::decision::ErrorCode;
    use crate::core::decision::Evidence;
    use crate::core::decision::RiskLevel;
    use crate::core::decision::Verdict;
    use crate::core::trace::VerdictSummary;

    /// Tests suppression and suggestions surface in the rendering.
    #[test]
    fn test_render_includes_suppression() {
        let verdict = VerdictSummary {
            decision: Verdict::Block,
            code: ErrorCode::PolicyDenied,
            risk_level: RiskLevel::Critical,
            domain: DecisionDomain::Security,
            evidence: Evidence::new(),
        };
        let mut winner = DecisionV1::new(
            "command_security".into(),
            ErrorCode::PolicyDenied,
            Verdict::Block,
            RiskLevel::Critical,
            DecisionDomain::Security,
            "destructive command",
        );
        winner.suggestion = Some("narrow the target".to_string());
        let mut loser = DecisionV1::new(
            "semantic_intent".into(),
            ErrorCode::SemanticViolation,
            Verdict::Block,
            RiskLevel::Critical,
            DecisionDomain::Semantic,
            "rule SEC-004 violated",
        );
        loser.suppressed_by = Some("POLICY_DENIED".to_string());
        loser.suppression_reason = Some("duplicate_domain_lower_priority".to_string());

        let report = ExplainReport::new(verdict, vec![winner, loser], Vec::new());
        let rendered = report.render();
        assert!(rendered.contains("verdict: BLOCK"));
        assert!(rendered.contains("suggestion: narrow the target"));
        assert!(rendered.contains("suppressed by POLICY_DENIED"));
    }
}
