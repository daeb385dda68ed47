// crates/failcore-core/src/engine/gate.rs
// ============================================================================
// Module: Failcore Gate
// Description: Verdict resolution over deduplicated decision lists.
// Purpose: Be the only authority that converts decisions into a verdict.
// Dependencies: crate::{core, engine}, serde
// ============================================================================

//! ## Overview
//! Two gate instances exist over one implementation: the preflight gate
//! wraps the validator set before execution, and the egress gate applies
//! the same semantics where a response leaves the chokepoint. The gate
//! computes the strongest surviving decision under the precedence
//! `BLOCK > SANITIZE > WARN > ALLOW`; suppressed and shadow decisions do
//! not participate. A BLOCK verdict is terminal for the step. Gates add no
//! evidence of their own: the verdict carries the strongest decision's
//! evidence verbatim.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::decision::DecisionDomain;
use crate::core::decision::DecisionV1;
use crate::core::decision::ErrorCode;
use crate::core::decision::Evidence;
use crate::core::decision::RiskLevel;
use crate::core::decision::Verdict;
use crate::core::trace::VerdictSummary;

// ============================================================================
// SECTION: Gate Kind
// ============================================================================

/// Which boundary a gate instance guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    /// Before tool execution.
    Preflight,
    /// Before a response leaves the chokepoint.
    Egress,
}

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Verdict authority over a decision list.
#[derive(Debug, Clone, Copy)]
pub struct Gate {
    /// Boundary guarded by this instance.
    kind: GateKind,
}

impl Gate {
    /// Creates the preflight gate.
    #[must_use]
    pub const fn preflight() -> Self {
        Self {
            kind: GateKind::Preflight,
        }
    }

    /// Creates the egress gate.
    #[must_use]
    pub const fn egress() -> Self {
        Self {
            kind: GateKind::Egress,
        }
    }

    /// Returns the boundary this gate guards.
    #[must_use]
    pub const fn kind(&self) -> GateKind {
        self.kind
    }

    /// Resolves the verdict over a deduplicated decision list.
    ///
    /// Only surviving decisions participate: suppressed and shadow entries
    /// are recorded but never drive the verdict.
    #[must_use]
    pub fn resolve(&self, decisions: &[DecisionV1]) -> VerdictSummary {
        let strongest = decisions
            .iter()
            .filter(|decision| !decision.is_suppressed() && !decision.is_shadow())
            .max_by_key(|decision| {
                (decision.decision, decision.risk_level, decision.domain.rank())
            });

        strongest.map_or_else(allow_summary, |decision| VerdictSummary {
            decision: decision.decision,
            code: decision.code,
            risk_level: decision.risk_level,
            domain: decision.domain,
            evidence: decision.evidence.clone(),
        })
    }
}

/// The verdict for a step with no surviving findings.
fn allow_summary() -> VerdictSummary {
    VerdictSummary {
        decision: Verdict::Allow,
        code: ErrorCode::Unknown,
        risk_level: RiskLevel::Low,
        domain: DecisionDomain::Other,
        evidence: Evidence::new(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
