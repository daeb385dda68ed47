// crates/failcore-core/src/validators/contract.rs
// ============================================================================
// Module: Failcore Contract Validator
// Description: Per-tool schema checks over parameters and outputs.
// Purpose: Enforce declared tool contracts as ordinary decisions.
// Dependencies: crate::{core, validators}, jsonschema, serde_json
// ============================================================================

//! ## Overview
//! Tools may declare JSON-Schema contracts for their parameters and their
//! outputs. Pre-execution decisions cover `params`; when the context carries
//! a result, the output schema applies too. Contract violations surface as
//! ordinary decisions on the contract domain; there is no separate channel.

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
use crate::core::identifiers::ValidatorId;
use crate::validators::ID_CONTRACT;
use crate::validators::Validator;
use crate::validators::ValidatorSettings;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Cap on schema errors reported per direction.
const MAX_REPORTED_ERRORS: usize = 5;

// ============================================================================
// SECTION: Tool Contract
// ============================================================================

/// Compiled contract for one tool.
struct ToolContract {
    /// Compiled parameter schema.
    params: Option<jsonschema::Validator>,
    /// Compiled output schema.
    output: Option<jsonschema::Validator>,
}

// ============================================================================
// SECTION: Contract Validator
// ============================================================================

/// Schema-driven contract checks.
pub struct ContractValidator {
    /// Compiled contracts keyed by tool name.
    contracts: BTreeMap<String, ToolContract>,
}

impl ContractValidator {
    /// Builds the validator from policy settings.
    ///
    /// Settings shape: `{"tools": {"<tool>": {"params": <schema>, "output": <schema>}}}`.
    /// Schemas that fail to compile are skipped; the contract validator must
    /// not turn a bad schema into a blocked run.
    #[must_use]
    pub fn from_settings(settings: &ValidatorSettings) -> Self {
        let mut contracts = BTreeMap::new();
        if let Some(tools) = settings.get("tools").and_then(Value::as_object) {
            for (tool, declaration) in tools {
                let params = declaration
                    .get("params")
                    .and_then(|schema| jsonschema::validator_for(schema).ok());
                let output = declaration
                    .get("output")
                    .and_then(|schema| jsonschema::validator_for(schema).ok());
                contracts.insert(tool.clone(), ToolContract {
                    params,
                    output,
                });
            }
        }
        Self {
            contracts,
        }
    }

    /// Validates one instance against a compiled schema.
    fn check(
        &self,
        schema: &jsonschema::Validator,
        instance: &Value,
        direction: &str,
        code: ErrorCode,
    ) -> Vec<DecisionV1> {
        schema
            .iter_errors(instance)
            .take(MAX_REPORTED_ERRORS)
            .map(|error| {
                let mut decision = DecisionV1::new(
                    ValidatorId::new(ID_CONTRACT),
                    code,
                    Verdict::Block,
                    RiskLevel::Medium,
                    DecisionDomain::Contract,
                    format!("{direction} contract violated: {error}"),
                );
                decision
                    .evidence
                    .insert("schema_path".to_string(), json!(error.schema_path().to_string()));
                decision
                    .evidence
                    .insert("instance_path".to_string(), json!(error.instance_path().to_string()));
                decision
                    .evidence
                    .insert(EVIDENCE_MATCHED_PARAM.to_string(), json!(direction));
                decision
                    .evidence
                    .insert(EVIDENCE_FINDING_CLASS.to_string(), json!("contract_violation"));
                decision
            })
            .collect()
    }
}

impl Validator for ContractValidator {
    fn id(&self) -> ValidatorId {
        ValidatorId::new(ID_CONTRACT)
    }

    fn evaluate(&self, ctx: &ContextV1) -> Vec<DecisionV1> {
        let Some(contract) = self.contracts.get(ctx.tool.as_str()) else {
            return Vec::new();
        };
        let mut decisions = Vec::new();
        if let Some(schema) = &contract.params {
            let instance = Value::Object(
                ctx.params.iter().map(|(key, value)| (key.clone(), value.clone())).collect(),
            );
            decisions.extend(self.check(schema, &instance, "params", ErrorCode::InvalidArgument));
        }
        if let (Some(schema), Some(result)) = (&contract.output, &ctx.result) {
            decisions.extend(self.check(schema, result, "output", ErrorCode::PreconditionFailed));
        }
        decisions
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
