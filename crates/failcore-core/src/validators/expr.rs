// crates/failcore-core/src/validators/expr.rs
// ============================================================================
// Module: Failcore Expression Rules Validator
// Description: Interpreter for small side-effect-free policy expressions.
// Purpose: Let operators write ad-hoc rules without new validator code.
// Dependencies: crate::{core, validators}, regex, serde, serde_json
// ============================================================================

//! ## Overview
//! Expression rules are declarative: a tool pattern (with `*` wildcards), a
//! parameter selector, and a condition (`contains`, `regex`, `equals`,
//! `max_size`). Each violated rule yields one decision; rules may override
//! their enforcement and supply their own message and remediation. The
//! interpreter is side-effect-free and total: malformed rules are skipped
//! at construction, never at evaluation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::core::context::ContextV1;
use crate::core::decision::DecisionDomain;
use crate::core::decision::DecisionV1;
use crate::core::decision::EVIDENCE_FINDING_CLASS;
use crate::core::decision::EVIDENCE_MATCHED_PARAM;
use crate::core::decision::ErrorCode;
use crate::core::decision::Remediation;
use crate::core::decision::RiskLevel;
use crate::core::decision::Verdict;
use crate::core::identifiers::ValidatorId;
use crate::policy::Enforcement;
use crate::validators::ID_EXPR_RULES;
use crate::validators::Validator;
use crate::validators::ValidatorSettings;

// ============================================================================
// SECTION: Rule Definition
// ============================================================================

/// One declarative expression condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ExprCondition {
    /// Parameter contains a substring.
    Contains {
        /// Substring searched for.
        value: String,
    },
    /// Parameter matches a regular expression.
    Regex {
        /// Pattern source.
        pattern: String,
    },
    /// Parameter equals a value exactly.
    Equals {
        /// Expected value.
        value: String,
    },
    /// Parameter rendering exceeds a byte budget.
    MaxSize {
        /// Maximum rendered size in bytes.
        bytes: usize,
    },
}

/// One declarative expression rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExprRule {
    /// Stable rule identifier.
    pub id: String,
    /// Tool pattern with `*` wildcards.
    pub tools: String,
    /// Parameter the condition applies to; absent means the whole map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    /// Condition to evaluate.
    pub condition: ExprCondition,
    /// Per-rule enforcement override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforcement: Option<Enforcement>,
    /// Operator-supplied message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Operator-supplied remediation template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

// ============================================================================
// SECTION: Compiled Rule
// ============================================================================

/// A rule with its regex precompiled.
struct CompiledRule {
    /// Rule definition.
    rule: ExprRule,
    /// Compiled regex when the condition needs one.
    regex: Option<Regex>,
}

// ============================================================================
// SECTION: Expression Rules Validator
// ============================================================================

/// Interpreter over operator-defined expression rules.
pub struct ExprRulesValidator {
    /// Compiled rules in declaration order.
    rules: Vec<CompiledRule>,
}

impl ExprRulesValidator {
    /// Builds the validator from policy settings.
    ///
    /// Settings shape: `{"rules": [<ExprRule>, ...]}`. Rules whose regex
    /// fails to compile are dropped.
    #[must_use]
    pub fn from_settings(settings: &ValidatorSettings) -> Self {
        let mut rules = Vec::new();
        if let Some(declared) = settings.get("rules").and_then(Value::as_array) {
            for raw in declared {
                let Ok(rule) = serde_json::from_value::<ExprRule>(raw.clone()) else {
                    continue;
                };
                let regex = match &rule.condition {
                    ExprCondition::Regex {
                        pattern,
                    } => match Regex::new(pattern) {
                        Ok(regex) => Some(regex),
                        Err(_) => continue,
                    },
                    _ => None,
                };
                rules.push(CompiledRule {
                    rule,
                    regex,
                });
            }
        }
        Self {
            rules,
        }
    }

    /// Evaluates one rule against the context.
    fn violates(&self, compiled: &CompiledRule, ctx: &ContextV1) -> bool {
        if !tool_matches(&compiled.rule.tools, ctx.tool.as_str()) {
            return false;
        }
        let rendered = match &compiled.rule.param {
            Some(param) => match ctx.params.get(param) {
                Some(Value::String(text)) => text.clone(),
                Some(other) => other.to_string(),
                None => return false,
            },
            None => serde_json::to_string(&ctx.params).unwrap_or_default(),
        };
        match &compiled.rule.condition {
            ExprCondition::Contains {
                value,
            } => rendered.contains(value),
            ExprCondition::Regex {
                ..
            } => compiled.regex.as_ref().is_some_and(|regex| regex.is_match(&rendered)),
            ExprCondition::Equals {
                value,
            } => &rendered == value,
            ExprCondition::MaxSize {
                bytes,
            } => rendered.len() > *bytes,
        }
    }
}

impl Validator for ExprRulesValidator {
    fn id(&self) -> ValidatorId {
        ValidatorId::new(ID_EXPR_RULES)
    }

    fn evaluate(&self, ctx: &ContextV1) -> Vec<DecisionV1> {
        let mut decisions = Vec::new();
        for compiled in &self.rules {
            if !self.violates(compiled, ctx) {
                continue;
            }
            let verdict = match compiled.rule.enforcement {
                Some(Enforcement::Warn | Enforcement::Shadow) => Verdict::Warn,
                _ => Verdict::Block,
            };
            let message = compiled
                .rule
                .message
                .clone()
                .unwrap_or_else(|| format!("expression rule {} violated", compiled.rule.id));
            let mut decision = DecisionV1::new(
                ValidatorId::new(ID_EXPR_RULES),
                ErrorCode::PolicyDenied,
                verdict,
                RiskLevel::Medium,
                DecisionDomain::Other,
                message,
            );
            decision.evidence.insert("rule_id".to_string(), json!(compiled.rule.id));
            decision.evidence.insert(
                EVIDENCE_MATCHED_PARAM.to_string(),
                json!(compiled.rule.param.clone().unwrap_or_else(|| "params".to_string())),
            );
            decision
                .evidence
                .insert(EVIDENCE_FINDING_CLASS.to_string(), json!("expression_rule"));
            decision.remediation = compiled.rule.remediation.clone().map(|template| Remediation {
                template,
                vars: std::collections::BTreeMap::new(),
            });
            decisions.push(decision);
        }
        decisions
    }
}

// ============================================================================
// SECTION: Tool Patterns
// ============================================================================

/// Matches a tool name against a `*` wildcard pattern.
fn tool_matches(pattern: &str, tool: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match (pattern.strip_prefix('*'), pattern.strip_suffix('*')) {
        (Some(suffix), None) => tool.ends_with(suffix),
        (None, Some(prefix)) => tool.starts_with(prefix),
        (Some(_), Some(_)) => {
            let inner = pattern.trim_matches('*');
            tool.contains(inner)
        }
        (None, None) => tool == pattern,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
