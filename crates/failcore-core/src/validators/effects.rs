// crates/failcore-core/src/validators/effects.rs
// ============================================================================
// Module: Failcore Effects Validator
// Description: Predicts side effects and enforces the run's effect boundary.
// Purpose: Reject tool calls whose predicted effects cross the boundary.
// Dependencies: crate::{core, validators}, serde_json
// ============================================================================

//! ## Overview
//! Effects are predicted from `(tool, params)` using declared tool metadata
//! first and name/parameter heuristics otherwise. Each predicted effect is
//! checked against the run's declared boundary; crossings produce one
//! decision each, blocking when enforcement is on and warning otherwise.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

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
use crate::core::effects::BoundaryPreset;
use crate::core::effects::EffectBoundary;
use crate::core::effects::EffectType;
use crate::core::identifiers::ValidatorId;
use crate::validators::ID_EFFECTS;
use crate::validators::Validator;
use crate::validators::ValidatorSettings;
use crate::validators::setting_bool;
use crate::validators::setting_str;

// ============================================================================
// SECTION: Effects Validator
// ============================================================================

/// Boundary enforcement over predicted side effects.
#[derive(Debug, Clone)]
pub struct EffectsValidator {
    /// Declared effect boundary for the run.
    boundary: EffectBoundary,
    /// Blocking enforcement; warnings otherwise.
    enforce: bool,
    /// Declared per-tool effect metadata.
    tool_effects: BTreeMap<String, Vec<EffectType>>,
}

impl EffectsValidator {
    /// Builds the validator from policy settings.
    #[must_use]
    pub fn from_settings(settings: &ValidatorSettings) -> Self {
        let preset = setting_str(settings, "boundary_preset")
            .and_then(|raw| serde_json::from_value::<BoundaryPreset>(Value::String(raw)).ok())
            .unwrap_or_default();
        let mut tool_effects = BTreeMap::new();
        if let Some(declared) = settings.get("tool_effects").and_then(Value::as_object) {
            for (tool, effects) in declared {
                let parsed: Vec<EffectType> = effects
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|item| serde_json::from_value(item.clone()).ok())
                            .collect()
                    })
                    .unwrap_or_default();
                tool_effects.insert(tool.clone(), parsed);
            }
        }
        Self {
            boundary: EffectBoundary::from_preset(preset),
            enforce: setting_bool(settings, "enforce_boundary", true),
            tool_effects,
        }
    }

    /// Predicts the effects of one call from metadata or heuristics.
    fn predict(&self, ctx: &ContextV1) -> Vec<EffectType> {
        if let Some(declared) = self.tool_effects.get(ctx.tool.as_str()) {
            return declared.clone();
        }
        predict_heuristic(ctx)
    }
}

impl Validator for EffectsValidator {
    fn id(&self) -> ValidatorId {
        ValidatorId::new(ID_EFFECTS)
    }

    fn evaluate(&self, ctx: &ContextV1) -> Vec<DecisionV1> {
        let mut decisions = Vec::new();
        for effect in self.predict(ctx) {
            if self.boundary.permits(effect) {
                continue;
            }
            let verdict = if self.enforce { Verdict::Block } else { Verdict::Warn };
            let mut decision = DecisionV1::new(
                ValidatorId::new(ID_EFFECTS),
                ErrorCode::SideEffectBoundaryCrossed,
                verdict,
                RiskLevel::High,
                DecisionDomain::Security,
                format!("predicted effect '{}' crosses the declared boundary", effect.as_str()),
            );
            decision.evidence.insert("effect".to_string(), json!(effect));
            decision.evidence.insert("category".to_string(), json!(effect.category()));
            decision.evidence.insert(EVIDENCE_MATCHED_PARAM.to_string(), json!(ctx.tool.as_str()));
            decision
                .evidence
                .insert(EVIDENCE_FINDING_CLASS.to_string(), json!("effect_boundary"));
            decisions.push(decision);
        }
        decisions
    }
}

// ============================================================================
// SECTION: Heuristics
// ============================================================================

/// Predicts effects from tool naming and parameter shape.
fn predict_heuristic(ctx: &ContextV1) -> Vec<EffectType> {
    let tool = ctx.tool.as_str().to_ascii_lowercase();
    let mut effects = Vec::new();
    let mut push = |effect: EffectType| {
        if !effects.contains(&effect) {
            effects.push(effect);
        }
    };

    if tool.contains("delete") || tool.contains("remove") || tool.contains("unlink") {
        push(EffectType::FilesystemDelete);
    } else if tool.contains("write") || tool.contains("save") || tool.contains("append") {
        push(EffectType::FilesystemWrite);
    } else if tool.contains("read") || tool.contains("open") || tool.contains("list") {
        push(EffectType::FilesystemRead);
    }
    if tool.contains("fetch")
        || tool.contains("http")
        || tool.contains("download")
        || tool.contains("request")
        || ctx.params.contains_key("url")
    {
        push(EffectType::NetworkEgress);
    }
    if tool.contains("exec") || tool.contains("spawn") || tool.contains("shell") || tool.contains("run")
    {
        push(EffectType::ProcessSpawn);
    }
    if tool.contains("kill") {
        push(EffectType::ProcessKill);
    }
    effects
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only panic-based assertions are permitted.")]

    use serde_json::json;

    use super::EffectsValidator;
    use crate::core::context::ContextV1;
    use crate::core::context::Params;
    use crate::core::decision::ErrorCode;
    use crate::core::decision::Verdict;
    use crate::validators::Validator;
    use crate::validators::ValidatorSettings;

    /// Builds a context for the given tool.
    fn ctx_for(tool: &str) -> ContextV1 {
        ContextV1::new(tool.into(), Params::new(), "step-1".into(), "run-1".into(), "sess-1".into())
    }

    /// Tests a write crosses a readonly boundary.
    #[test]
    fn test_write_crosses_readonly() {
        let mut settings = ValidatorSettings::new();
        settings.insert("boundary_preset".to_string(), json!("readonly"));
        let validator = EffectsValidator::from_settings(&settings);
        let decisions = validator.evaluate(&ctx_for("write_file"));
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].code, ErrorCode::SideEffectBoundaryCrossed);
        assert_eq!(decisions[0].decision, Verdict::Block);
    }

    /// Tests a read stays inside a readonly boundary.
    #[test]
    fn test_read_inside_readonly() {
        let mut settings = ValidatorSettings::new();
        settings.insert("boundary_preset".to_string(), json!("readonly"));
        let validator = EffectsValidator::from_settings(&settings);
        assert!(validator.evaluate(&ctx_for("read_file")).is_empty());
    }

    /// Tests declared tool metadata wins over heuristics.
    #[test]
    fn test_declared_metadata_wins() {
        let mut settings = ValidatorSettings::new();
        settings.insert("boundary_preset".to_string(), json!("readonly"));
        settings.insert("tool_effects".to_string(), json!({"write_file": ["filesystem_read"]}));
        let validator = EffectsValidator::from_settings(&settings);
        assert!(validator.evaluate(&ctx_for("write_file")).is_empty());
    }

    /// Tests enforcement off downgrades crossings to warnings.
    #[test]
    fn test_unenforced_boundary_warns() {
        let mut settings = ValidatorSettings::new();
        settings.insert("boundary_preset".to_string(), json!("strict"));
        settings.insert("enforce_boundary".to_string(), json!(false));
        let validator = EffectsValidator::from_settings(&settings);
        let decisions = validator.evaluate(&ctx_for("spawn_worker"));
        assert_eq!(decisions[0].decision, Verdict::Warn);
    }

    /// Tests the default boundary permits everything.
    #[test]
    fn test_default_boundary_unbounded() {
        let validator = EffectsValidator::from_settings(&ValidatorSettings::new());
        assert!(validator.evaluate(&ctx_for("delete_everything")).is_empty());
    }
}
