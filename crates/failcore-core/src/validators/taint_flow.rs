// crates/failcore-core/src/validators/taint_flow.rs
// ============================================================================
// Module: Failcore Taint Flow Validator
// Description: Warns when tainted data reaches a high-risk sink.
// Purpose: Surface provenance evidence without ever blocking.
// Dependencies: crate::{core, taint, validators}, serde_json
// ============================================================================

//! ## Overview
//! The taint flow validator is observation-only: it emits WARN decisions
//! when data from a classified source reaches a configured high-risk sink
//! tool or carries sensitivity at or above the configured floor. Evidence
//! includes the reconstructed flow chain, the weakest binding confidence
//! along it, and the contributing source steps.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use serde_json::json;

use crate::core::context::ContextV1;
use crate::core::decision::DecisionDomain;
use crate::core::decision::DecisionV1;
use crate::core::decision::EVIDENCE_FINDING_CLASS;
use crate::core::decision::EVIDENCE_MATCHED_PARAM;
use crate::core::decision::ErrorCode;
use crate::core::decision::RiskLevel;
use crate::core::decision::Verdict;
use crate::core::identifiers::ValidatorId;
use crate::core::taint::BindingConfidence;
use crate::core::taint::DEFAULT_MAX_FLOW_DEPTH;
use crate::core::taint::Sensitivity;
use crate::validators::ID_TAINT_FLOW;
use crate::validators::Validator;
use crate::validators::ValidatorSettings;
use crate::validators::setting_str;
use crate::validators::setting_str_list;

// ============================================================================
// SECTION: Taint Flow Validator
// ============================================================================

/// Observation-only provenance validator.
#[derive(Debug, Clone)]
pub struct TaintFlowValidator {
    /// Explicit high-risk sink tools.
    sink_tools: Vec<String>,
    /// Sensitivity floor that triggers a warning on any sink.
    sensitivity_floor: Sensitivity,
    /// Depth cap for chain reconstruction.
    max_depth: usize,
}

impl Default for TaintFlowValidator {
    fn default() -> Self {
        Self {
            sink_tools: Vec::new(),
            sensitivity_floor: Sensitivity::Confidential,
            max_depth: DEFAULT_MAX_FLOW_DEPTH,
        }
    }
}

impl TaintFlowValidator {
    /// Builds the validator from policy settings.
    #[must_use]
    pub fn from_settings(settings: &ValidatorSettings) -> Self {
        let sensitivity_floor = setting_str(settings, "sensitivity_floor")
            .and_then(|floor| serde_json::from_value(Value::String(floor)).ok())
            .unwrap_or(Sensitivity::Confidential);
        let max_depth = settings
            .get("max_depth")
            .and_then(Value::as_u64)
            .and_then(|depth| usize::try_from(depth).ok())
            .unwrap_or(DEFAULT_MAX_FLOW_DEPTH);
        Self {
            sink_tools: setting_str_list(settings, "sink_tools"),
            sensitivity_floor,
            max_depth,
        }
    }
}

impl Validator for TaintFlowValidator {
    fn id(&self) -> ValidatorId {
        ValidatorId::new(ID_TAINT_FLOW)
    }

    fn evaluate(&self, ctx: &ContextV1) -> Vec<DecisionV1> {
        let Some(taint) = ctx.state.taint_context() else {
            return Vec::new();
        };
        let tags = taint.tags_for_sink(&ctx.step_id);
        if tags.is_empty() {
            return Vec::new();
        }

        let is_sink_tool = self.sink_tools.iter().any(|tool| tool == ctx.tool.as_str());
        let max_sensitivity =
            tags.iter().map(|tag| tag.sensitivity).max().unwrap_or(Sensitivity::Public);
        if !is_sink_tool && max_sensitivity < self.sensitivity_floor {
            return Vec::new();
        }

        let chain = taint.get_flow_chain(&ctx.step_id, self.max_depth);
        let weakest_binding = chain
            .iter()
            .map(|edge| edge.binding_confidence)
            .min_by_key(|confidence| match confidence {
                BindingConfidence::High => 2,
                BindingConfidence::Medium => 1,
                BindingConfidence::Low => 0,
            })
            .unwrap_or(BindingConfidence::Low);
        let matched_param = chain
            .iter()
            .rev()
            .find_map(|edge| edge.field_path.clone())
            .unwrap_or_else(|| "params".to_string());

        let mut decision = DecisionV1::new(
            ValidatorId::new(ID_TAINT_FLOW),
            ErrorCode::DataTainted,
            Verdict::Warn,
            RiskLevel::Medium,
            DecisionDomain::TaintFlow,
            format!(
                "{} data from an upstream step reaches tool '{}'",
                max_sensitivity.as_str(),
                ctx.tool
            ),
        );
        decision.evidence.insert("taint_chain".to_string(), json!(chain));
        decision.evidence.insert("binding_confidence".to_string(), json!(weakest_binding));
        decision.evidence.insert(
            "source_step_ids".to_string(),
            json!(tags.iter().map(|tag| tag.source_step.as_str()).collect::<Vec<_>>()),
        );
        decision.evidence.insert("sensitivity".to_string(), json!(max_sensitivity));
        decision.evidence.insert(EVIDENCE_MATCHED_PARAM.to_string(), json!(matched_param));
        decision.evidence.insert(EVIDENCE_FINDING_CLASS.to_string(), json!("tainted_flow"));
        vec![decision]
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
