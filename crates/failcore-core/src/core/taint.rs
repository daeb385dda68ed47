// crates/failcore-core/src/core/taint.rs
// ============================================================================
// Module: Failcore Taint Model
// Description: Taint tags, sensitivity lattice, and flow edges.
// Purpose: Provide stable provenance markers consumed by validators.
// Dependencies: crate::core::identifiers, serde
// ============================================================================

//! ## Overview
//! Taint tags mark data that flowed out of classified source tools. Tags are
//! carried across steps by the run-scoped flow tracker and consumed by the
//! DLP and taint-flow validators. The sensitivity lattice is totally ordered;
//! `max_sensitivity` computations rely on that ordering.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::StepId;
use crate::core::identifiers::ToolName;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default maximum depth for flow chain reconstruction.
pub const DEFAULT_MAX_FLOW_DEPTH: usize = 10;

// ============================================================================
// SECTION: Taint Source
// ============================================================================

/// Origin class of tainted data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaintSource {
    /// Data typed or supplied by the user.
    User,
    /// Data produced by the model.
    Model,
    /// Data returned by a tool.
    Tool,
    /// Data injected by the hosting system.
    System,
}

// ============================================================================
// SECTION: Sensitivity
// ============================================================================

/// Data sensitivity lattice, ordered from least to most sensitive.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    /// Publishable data.
    Public,
    /// Internal-only data.
    Internal,
    /// Confidential business data.
    Confidential,
    /// Personally identifiable information.
    Pii,
    /// Secret material (keys, credentials).
    Secret,
}

impl Sensitivity {
    /// Returns a stable label for evidence records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Internal => "internal",
            Self::Confidential => "confidential",
            Self::Pii => "pii",
            Self::Secret => "secret",
        }
    }
}

// ============================================================================
// SECTION: Taint Tag
// ============================================================================

/// Provenance marker attached to data flowing out of a classified source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaintTag {
    /// Origin class.
    pub source: TaintSource,
    /// Sensitivity classification.
    pub sensitivity: Sensitivity,
    /// Tool that produced the data.
    pub source_tool: ToolName,
    /// Step that produced the data.
    pub source_step: StepId,
}

// ============================================================================
// SECTION: Binding Confidence
// ============================================================================

/// Confidence that a flow edge binds a real data dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingConfidence {
    /// Step-id substring match.
    High,
    /// Common parameter name match.
    Medium,
    /// Recursive nested traversal match.
    Low,
}

// ============================================================================
// SECTION: Flow Edge
// ============================================================================

/// Directed provenance edge between two steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEdge {
    /// Step whose output was consumed.
    pub source_step: StepId,
    /// Step whose parameters consumed it.
    pub sink_step: StepId,
    /// Optional dotted field path within the sink parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_path: Option<String>,
    /// Confidence of the binding.
    pub binding_confidence: BindingConfidence,
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::Sensitivity;

    /// Tests the sensitivity lattice ordering.
    #[test]
    fn test_sensitivity_ordering() {
        assert!(Sensitivity::Secret > Sensitivity::Pii);
        assert!(Sensitivity::Pii > Sensitivity::Confidential);
        assert!(Sensitivity::Confidential > Sensitivity::Internal);
        assert!(Sensitivity::Internal > Sensitivity::Public);
    }
}
