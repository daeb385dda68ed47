// crates/failcore-core/src/validators/mod.rs
// ============================================================================
// Module: Failcore Validators
// Description: Uniform validator contract and the closed builtin set.
// Purpose: Produce DecisionV1 lists from call contexts under policy control.
// Dependencies: crate::{core, registry}, serde_json
// ============================================================================

//! ## Overview
//! Every validator implements `evaluate(ctx) -> Vec<DecisionV1>` and must be
//! pure with respect to the context and the run-scoped state side-channel:
//! no wall-clock, environment, or filesystem access. Builtins are a closed
//! tagged set constructed from policy configuration; third-party validators
//! plug in through the same trait. Ordering is policy-driven; a validator
//! may never rely on another's output.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod contract;
pub mod dlp;
pub mod drift;
pub mod effects;
pub mod expr;
pub mod sanitize;
pub mod security;
pub mod semantic;
pub mod taint_flow;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::core::context::ContextV1;
use crate::core::decision::DecisionV1;
use crate::core::identifiers::ValidatorId;
use crate::registry::RulesRegistry;

// ============================================================================
// SECTION: Builtin Identifiers
// ============================================================================

/// Identifier of the path security validator.
pub const ID_PATH_SECURITY: &str = "path_security";
/// Identifier of the network security validator.
pub const ID_NETWORK_SECURITY: &str = "network_security";
/// Identifier of the command security validator.
pub const ID_COMMAND_SECURITY: &str = "command_security";
/// Identifier of the DLP guard validator.
pub const ID_DLP_GUARD: &str = "dlp_guard";
/// Identifier of the semantic intent validator.
pub const ID_SEMANTIC_INTENT: &str = "semantic_intent";
/// Identifier of the taint flow validator.
pub const ID_TAINT_FLOW: &str = "taint_flow";
/// Identifier of the effects boundary validator.
pub const ID_EFFECTS: &str = "effects";
/// Identifier of the contract validator.
pub const ID_CONTRACT: &str = "contract";
/// Identifier of the expression rules validator.
pub const ID_EXPR_RULES: &str = "expr_rules";
/// Identifier of the post-run drift validator.
pub const ID_DRIFT: &str = "drift";

// ============================================================================
// SECTION: Validator Contract
// ============================================================================

/// Uniform validator contract.
///
/// # Invariants
/// - `evaluate` is pure with respect to the context and its state channel.
/// - Implementations never read wall-clock, environment, or filesystem.
pub trait Validator: Send + Sync {
    /// Returns the validator identifier referenced by policy.
    fn id(&self) -> ValidatorId;

    /// Evaluates a call context into zero or more decisions.
    fn evaluate(&self, ctx: &ContextV1) -> Vec<DecisionV1>;
}

// ============================================================================
// SECTION: Builtin Construction
// ============================================================================

/// Validator-specific configuration map from the policy entry.
pub type ValidatorSettings = BTreeMap<String, Value>;

/// Builds a builtin validator from its policy identifier and settings.
///
/// Returns `None` for unknown identifiers; the engine treats unknown ids as
/// plug-in slots the host must fill. The `drift` identifier is post-run only
/// and also returns `None` here.
#[must_use]
pub fn build_builtin(
    id: &str,
    settings: &ValidatorSettings,
    registry: &Arc<RulesRegistry>,
) -> Option<Box<dyn Validator>> {
    match id {
        ID_PATH_SECURITY => {
            Some(Box::new(security::PathSecurityValidator::from_settings(settings)))
        }
        ID_NETWORK_SECURITY => {
            Some(Box::new(security::NetworkSecurityValidator::from_settings(settings)))
        }
        ID_COMMAND_SECURITY => {
            Some(Box::new(security::CommandSecurityValidator::from_settings(settings)))
        }
        ID_DLP_GUARD => {
            Some(Box::new(dlp::DlpGuardValidator::from_settings(settings, Arc::clone(registry))))
        }
        ID_SEMANTIC_INTENT => Some(Box::new(semantic::SemanticIntentValidator::from_settings(
            settings,
            Arc::clone(registry),
        ))),
        ID_TAINT_FLOW => Some(Box::new(taint_flow::TaintFlowValidator::from_settings(settings))),
        ID_EFFECTS => Some(Box::new(effects::EffectsValidator::from_settings(settings))),
        ID_CONTRACT => Some(Box::new(contract::ContractValidator::from_settings(settings))),
        ID_EXPR_RULES => Some(Box::new(expr::ExprRulesValidator::from_settings(settings))),
        _ => None,
    }
}

// ============================================================================
// SECTION: Settings Helpers
// ============================================================================

/// Reads a string setting.
#[must_use]
pub(crate) fn setting_str(settings: &ValidatorSettings, name: &str) -> Option<String> {
    settings.get(name).and_then(Value::as_str).map(str::to_string)
}

/// Reads a boolean setting with a default.
#[must_use]
pub(crate) fn setting_bool(settings: &ValidatorSettings, name: &str, default: bool) -> bool {
    settings.get(name).and_then(Value::as_bool).unwrap_or(default)
}

/// Reads a string-array setting.
#[must_use]
pub(crate) fn setting_str_list(settings: &ValidatorSettings, name: &str) -> Vec<String> {
    settings
        .get(name)
        .and_then(Value::as_array)
        .map(|items| {
            items.iter().filter_map(Value::as_str).map(str::to_string).collect()
        })
        .unwrap_or_default()
}
