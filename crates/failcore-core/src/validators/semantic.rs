// crates/failcore-core/src/validators/semantic.rs
// ============================================================================
// Module: Failcore Semantic Intent Validator
// Description: Registry rule evaluation over parsed parameter structure.
// Purpose: Flag dangerous intent that raw string matching would miss.
// Dependencies: crate::{core, parsers, registry, validators}, regex, serde_json
// ============================================================================

//! ## Overview
//! Semantic rules evaluate against parsed structure (shell, SQL, path, and
//! payload ASTs), never against raw strings. One decision is emitted per
//! violated rule; rule severity maps onto the risk ladder, and rules are
//! filtered by a severity floor and an optional category allowlist. Rules
//! whose untrusted signatures failed verification carry a warning tag on
//! first use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use regex::Regex;
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
use crate::parsers::parse_path;
use crate::parsers::parse_shell;
use crate::parsers::parse_sql;
use crate::registry::RulesRegistry;
use crate::registry::SemanticCategory;
use crate::registry::SemanticDetector;
use crate::registry::SemanticRule;
use crate::validators::ID_SEMANTIC_INTENT;
use crate::validators::Validator;
use crate::validators::ValidatorSettings;
use crate::validators::setting_str_list;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Parameter names treated as shell commands.
const COMMAND_PARAM_NAMES: &[&str] = &["command", "cmd", "shell", "script"];

/// Parameter names treated as SQL.
const SQL_PARAM_NAMES: &[&str] = &["query", "sql", "statement"];

/// Parameter names treated as filesystem paths.
const PATH_PARAM_NAMES: &[&str] = &["path", "file_path", "file", "target"];

/// Targets whose recursive removal is always destructive.
const CRITICAL_TARGETS: &[&str] =
    &["/", "/*", "/etc", "/usr", "/var", "/home", "/boot", "/bin", "/sbin", "/lib"];

/// Secret assignment shape evaluated inside string values.
const SECRET_ASSIGNMENT_PATTERN: &str =
    r#"(?i)\b(api[_-]?key|secret|passwd|password|token)\b\s*[=:]\s*[^\s"']{8,}"#;

// ============================================================================
// SECTION: Violation
// ============================================================================

/// A located rule violation.
struct Violation {
    /// Parameter the violation anchors to.
    matched_param: String,
    /// Dedup finding class shared with overlapping validators.
    finding_class: &'static str,
}

// ============================================================================
// SECTION: Semantic Intent Validator
// ============================================================================

/// Evaluates registry semantic rules against parsed parameter structure.
pub struct SemanticIntentValidator {
    /// Shared rules registry.
    registry: Arc<RulesRegistry>,
    /// Minimum rule severity evaluated.
    min_severity: u8,
    /// Optional category allowlist.
    enabled_categories: Option<Vec<SemanticCategory>>,
    /// Compiled secret assignment shape.
    secret_shape: Option<Regex>,
}

impl SemanticIntentValidator {
    /// Builds the validator from policy settings.
    #[must_use]
    pub fn from_settings(settings: &ValidatorSettings, registry: Arc<RulesRegistry>) -> Self {
        let min_severity = settings
            .get("min_severity")
            .and_then(Value::as_u64)
            .and_then(|value| u8::try_from(value).ok())
            .unwrap_or(1);
        let categories = setting_str_list(settings, "enabled_categories");
        let enabled_categories = if categories.is_empty() {
            None
        } else {
            Some(
                categories
                    .into_iter()
                    .filter_map(|raw| serde_json::from_value(Value::String(raw)).ok())
                    .collect(),
            )
        };
        Self {
            registry,
            min_severity,
            enabled_categories,
            secret_shape: Regex::new(SECRET_ASSIGNMENT_PATTERN).ok(),
        }
    }

    /// Evaluates one rule's detector against the context.
    fn detect(&self, rule: &SemanticRule, ctx: &ContextV1) -> Option<Violation> {
        match rule.detector {
            SemanticDetector::SecretAssignment => self.detect_secret_assignment(ctx),
            SemanticDetector::DownloadExecute => detect_download_execute(ctx),
            SemanticDetector::DestructiveCommand => detect_destructive_command(ctx),
            SemanticDetector::PathTraversal => detect_path_traversal(ctx),
            SemanticDetector::SqlInjectionShape => detect_sql_injection(ctx),
            SemanticDetector::QueryKeyRepetition => detect_query_repetition(ctx),
        }
    }

    /// Finds a secret assignment inside any string parameter.
    fn detect_secret_assignment(&self, ctx: &ContextV1) -> Option<Violation> {
        let shape = self.secret_shape.as_ref()?;
        for (name, value) in &ctx.params {
            let flattened = crate::parsers::parse_payload_value(value);
            if flattened.string_values.iter().any(|text| shape.is_match(text)) {
                return Some(Violation {
                    matched_param: name.clone(),
                    finding_class: "secret_leak",
                });
            }
        }
        None
    }
}

impl Validator for SemanticIntentValidator {
    fn id(&self) -> ValidatorId {
        ValidatorId::new(ID_SEMANTIC_INTENT)
    }

    fn evaluate(&self, ctx: &ContextV1) -> Vec<DecisionV1> {
        let mut decisions = Vec::new();
        for rule in self.registry.rules() {
            if rule.severity < self.min_severity {
                continue;
            }
            if let Some(enabled) = &self.enabled_categories
                && !enabled.contains(&rule.category)
            {
                continue;
            }
            let Some(violation) = self.detect(rule, ctx) else {
                continue;
            };
            let risk_level = severity_risk(rule.severity);
            let verdict =
                if risk_level >= RiskLevel::High { Verdict::Block } else { Verdict::Warn };
            let mut decision = DecisionV1::new(
                ValidatorId::new(ID_SEMANTIC_INTENT),
                ErrorCode::SemanticViolation,
                verdict,
                risk_level,
                DecisionDomain::Semantic,
                format!("semantic rule {} violated", rule.id),
            );
            decision.evidence.insert("rule_id".to_string(), json!(rule.id));
            decision.evidence.insert("category".to_string(), json!(rule.category));
            decision.evidence.insert("detector".to_string(), json!(rule.detector));
            decision
                .evidence
                .insert(EVIDENCE_MATCHED_PARAM.to_string(), json!(violation.matched_param));
            decision
                .evidence
                .insert(EVIDENCE_FINDING_CLASS.to_string(), json!(violation.finding_class));
            if self.registry.is_unverified(&rule.id) {
                decision.tags.push("unverified_rule".to_string());
            }
            decisions.push(decision);
        }
        decisions
    }
}

// ============================================================================
// SECTION: Detectors
// ============================================================================

/// Detects a download piped into an interpreter.
fn detect_download_execute(ctx: &ContextV1) -> Option<Violation> {
    for name in COMMAND_PARAM_NAMES {
        let Some(raw) = ctx.str_param(name) else {
            continue;
        };
        let ast = parse_shell(raw);
        let downloader =
            ast.program.as_deref().is_some_and(|program| program == "curl" || program == "wget");
        let piped_shell = ast.args.windows(2).any(|window| {
            window[0] == "|" && matches!(window[1].as_str(), "sh" | "bash" | "zsh")
        });
        if downloader && piped_shell {
            return Some(Violation {
                matched_param: (*name).to_string(),
                finding_class: "download_execute",
            });
        }
    }
    None
}

/// Detects destructive filesystem command shapes.
fn detect_destructive_command(ctx: &ContextV1) -> Option<Violation> {
    for name in COMMAND_PARAM_NAMES {
        let Some(raw) = ctx.str_param(name) else {
            continue;
        };
        let ast = parse_shell(raw);
        let Some(program) = ast.program.as_deref() else {
            continue;
        };
        let recursive_force = ast
            .flags
            .iter()
            .any(|flag| flag.starts_with('-') && flag.contains('r') && flag.contains('f'));
        let critical_target = ast.args.iter().any(|arg| CRITICAL_TARGETS.contains(&arg.as_str()));
        let destructive = (program == "rm" && recursive_force && critical_target)
            || (program == "dd" && ast.args.iter().any(|arg| arg.starts_with("of=/dev/")))
            || program.starts_with("mkfs");
        if destructive {
            return Some(Violation {
                matched_param: (*name).to_string(),
                finding_class: "destructive_command",
            });
        }
    }
    None
}

/// Detects traversal in path-like parameters.
fn detect_path_traversal(ctx: &ContextV1) -> Option<Violation> {
    for name in PATH_PARAM_NAMES {
        if let Some(raw) = ctx.str_param(name)
            && parse_path(raw).traversal
        {
            return Some(Violation {
                matched_param: (*name).to_string(),
                finding_class: "path_escape",
            });
        }
    }
    None
}

/// Detects injection-shaped SQL keyword skeletons.
fn detect_sql_injection(ctx: &ContextV1) -> Option<Violation> {
    for name in SQL_PARAM_NAMES {
        let Some(raw) = ctx.str_param(name) else {
            continue;
        };
        let ast = parse_sql(raw);
        let injection_shape = (ast.features.union && ast.features.select)
            || ast.stacked_queries
            || (ast.has_comments && ast.features.select);
        if injection_shape {
            return Some(Violation {
                matched_param: (*name).to_string(),
                finding_class: "sql_injection",
            });
        }
    }
    None
}

/// Detects repeated query keys inside one string value.
fn detect_query_repetition(ctx: &ContextV1) -> Option<Violation> {
    for (name, value) in &ctx.params {
        let Some(text) = value.as_str() else {
            continue;
        };
        if !text.contains('&') || !text.contains('=') {
            continue;
        }
        let mut keys = Vec::new();
        for pair in text.split('&') {
            if let Some((key, _)) = pair.split_once('=') {
                if keys.contains(&key) {
                    return Some(Violation {
                        matched_param: name.clone(),
                        finding_class: "param_pollution",
                    });
                }
                keys.push(key);
            }
        }
    }
    None
}

/// Maps rule severity onto the risk ladder.
const fn severity_risk(severity: u8) -> RiskLevel {
    match severity {
        9..=10 => RiskLevel::Critical,
        7..=8 => RiskLevel::High,
        5..=6 => RiskLevel::Medium,
        _ => RiskLevel::Low,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only panic-based assertions are permitted.")]

    use std::sync::Arc;

    use serde_json::Value;
    use serde_json::json;

    use super::SemanticIntentValidator;
    use crate::core::context::ContextV1;
    use crate::core::context::Params;
    use crate::core::decision::Verdict;
    use crate::registry::RulesRegistry;
    use crate::validators::Validator;
    use crate::validators::ValidatorSettings;

    /// Builds the validator over the builtin registry.
    fn validator() -> SemanticIntentValidator {
        let registry = Arc::new(RulesRegistry::load_builtin().unwrap());
        SemanticIntentValidator::from_settings(&ValidatorSettings::new(), registry)
    }

    /// Builds a context with the given parameter.
    fn ctx_with(param: &str, value: Value) -> ContextV1 {
        let mut params = Params::new();
        params.insert(param.to_string(), value);
        ContextV1::new("tool".into(), params, "step-1".into(), "run-1".into(), "sess-1".into())
    }

    /// Tests `rm -rf /` violates SEC-004 as a blocking decision.
    #[test]
    fn test_destructive_command_rule() {
        let decisions = validator().evaluate(&ctx_with("command", json!("rm -rf /")));
        let hit = decisions
            .iter()
            .find(|d| d.evidence.get("rule_id") == Some(&json!("SEC-004")))
            .unwrap();
        assert_eq!(hit.decision, Verdict::Block);
        assert_eq!(hit.evidence.get("finding_class"), Some(&json!("destructive_command")));
    }

    /// Tests traversal violates SEC-003.
    #[test]
    fn test_traversal_rule() {
        let decisions = validator().evaluate(&ctx_with("path", json!("../../etc/passwd")));
        assert!(decisions.iter().any(|d| d.evidence.get("rule_id") == Some(&json!("SEC-003"))));
    }

    /// Tests the union-select injection shape violates INJ-001.
    #[test]
    fn test_injection_rule() {
        let decisions = validator().evaluate(&ctx_with(
            "query",
            json!("SELECT a FROM t WHERE x = 1 UNION SELECT secret FROM creds"),
        ));
        assert!(decisions.iter().any(|d| d.evidence.get("rule_id") == Some(&json!("INJ-001"))));
    }

    /// Tests repeated query keys violate POL-001 as a warning.
    #[test]
    fn test_pollution_rule() {
        let decisions = validator().evaluate(&ctx_with("query_string", json!("a=1&b=2&a=3")));
        let hit = decisions
            .iter()
            .find(|d| d.evidence.get("rule_id") == Some(&json!("POL-001")))
            .unwrap();
        assert_eq!(hit.decision, Verdict::Warn);
    }

    /// Tests the severity floor filters rules out.
    #[test]
    fn test_min_severity_filter() {
        let registry = Arc::new(RulesRegistry::load_builtin().unwrap());
        let mut settings = ValidatorSettings::new();
        settings.insert("min_severity".to_string(), json!(9));
        let validator = SemanticIntentValidator::from_settings(&settings, registry);
        let decisions = validator.evaluate(&ctx_with("query_string", json!("a=1&a=3")));
        assert!(decisions.is_empty());
    }

    /// Tests benign input yields nothing.
    #[test]
    fn test_benign_input() {
        let decisions = validator().evaluate(&ctx_with("command", json!("ls -la ./data")));
        assert!(decisions.is_empty());
    }
}
