// crates/failcore-core/src/validators/dlp.rs
// ============================================================================
// Module: Failcore DLP Guard
// Description: Sensitive-data detection over parameters with a policy matrix.
// Purpose: Block, sanitise, or warn on sensitive egress before execution.
// Dependencies: crate::{cache, core, registry, validators}, serde_json
// ============================================================================

//! ## Overview
//! The DLP guard scans parameters with the registry patterns (through the
//! run's scan cache), folds in taint tags from the state side-channel, and
//! consults a policy matrix mapping sensitivity to an action and an
//! auto-sanitise flag. One decision is emitted per matched parameter and
//! category group. When the resolved action is SANITIZE, the structured
//! sanitiser produces redacted parameters carried in evidence; raw values
//! never appear anywhere. Requests for live approval are downgraded to a
//! tagged warning since no control plane is attached.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use serde_json::json;

use crate::cache::PatternMatchSummary;
use crate::cache::ScanRecord;
use crate::cache::scan_key;
use crate::core::context::ContextV1;
use crate::core::decision::DecisionDomain;
use crate::core::decision::DecisionV1;
use crate::core::decision::EVIDENCE_FINDING_CLASS;
use crate::core::decision::EVIDENCE_MATCHED_PARAM;
use crate::core::decision::EVIDENCE_SCAN_CACHE_HIT;
use crate::core::decision::EVIDENCE_SCAN_HASH;
use crate::core::decision::ErrorCode;
use crate::core::decision::RiskLevel;
use crate::core::decision::Verdict;
use crate::core::hashing::ContentHash;
use crate::core::identifiers::ValidatorId;
use crate::core::taint::Sensitivity;
use crate::core::taint::TaintTag;
use crate::registry::RulesRegistry;
use crate::validators::ID_DLP_GUARD;
use crate::validators::Validator;
use crate::validators::ValidatorSettings;
use crate::validators::sanitize::SanitizeOutcome;
use crate::validators::sanitize::SanitizeSpec;
use crate::validators::sanitize::sanitize_params;
use crate::validators::setting_str;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default cap on scanned characters per parameter.
const DEFAULT_MAX_SCAN_CHARS: usize = 16_384;

// ============================================================================
// SECTION: Policy Matrix
// ============================================================================

/// Action resolved from the policy matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixAction {
    /// Permit without comment.
    Allow,
    /// Record a warning.
    Warn,
    /// Substitute sanitised parameters.
    Sanitize,
    /// Refuse the call.
    Block,
    /// Would require live approval; downgraded to a tagged warning.
    Approve,
}

/// One matrix entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MatrixEntry {
    /// Resolved action.
    pub action: MatrixAction,
    /// Attach sanitised parameters regardless of the action.
    pub auto_sanitize: bool,
}

/// Mapping from sensitivity to action.
pub type PolicyMatrix = BTreeMap<Sensitivity, MatrixEntry>;

/// Returns the default policy matrix.
#[must_use]
pub fn default_matrix() -> PolicyMatrix {
    let mut matrix = PolicyMatrix::new();
    matrix.insert(Sensitivity::Secret, MatrixEntry {
        action: MatrixAction::Block,
        auto_sanitize: false,
    });
    matrix.insert(Sensitivity::Pii, MatrixEntry {
        action: MatrixAction::Block,
        auto_sanitize: true,
    });
    matrix.insert(Sensitivity::Confidential, MatrixEntry {
        action: MatrixAction::Sanitize,
        auto_sanitize: true,
    });
    matrix.insert(Sensitivity::Internal, MatrixEntry {
        action: MatrixAction::Warn,
        auto_sanitize: false,
    });
    matrix.insert(Sensitivity::Public, MatrixEntry {
        action: MatrixAction::Allow,
        auto_sanitize: false,
    });
    matrix
}

// ============================================================================
// SECTION: Guard Mode
// ============================================================================

/// Policy-level cap on the strongest action the guard may take.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DlpMode {
    /// Matrix actions apply unchanged.
    #[default]
    Block,
    /// Blocking actions soften to sanitisation.
    Sanitize,
    /// Every action softens to a warning.
    Warn,
}

// ============================================================================
// SECTION: DLP Guard
// ============================================================================

/// Registry-driven sensitive-data guard.
pub struct DlpGuardValidator {
    /// Policy-level mode cap.
    mode: DlpMode,
    /// Sanitisation spec used when redaction runs.
    sanitize_spec: SanitizeSpec,
    /// Sensitivity-to-action matrix.
    matrix: PolicyMatrix,
    /// Cap on scanned characters per parameter.
    max_scan_chars: usize,
    /// Shared rules registry.
    registry: Arc<RulesRegistry>,
}

impl DlpGuardValidator {
    /// Builds the guard from policy settings.
    #[must_use]
    pub fn from_settings(settings: &ValidatorSettings, registry: Arc<RulesRegistry>) -> Self {
        let mode = setting_str(settings, "mode")
            .and_then(|raw| serde_json::from_value(Value::String(raw)).ok())
            .unwrap_or_default();
        let mut sanitize_spec = SanitizeSpec::default();
        if let Some(redaction) = settings.get("redaction")
            && let Ok(parsed) = serde_json::from_value(redaction.clone())
        {
            sanitize_spec.mode = parsed;
        }
        if let Some(value) = settings.get("preserve_last4").and_then(Value::as_bool) {
            sanitize_spec.preserve_last4 = value;
        }
        if let Some(value) = settings.get("preserve_domain").and_then(Value::as_bool) {
            sanitize_spec.preserve_domain = value;
        }
        let mut matrix = default_matrix();
        if let Some(overrides) = settings.get("matrix").and_then(Value::as_object) {
            for (sensitivity, entry) in overrides {
                let Ok(sensitivity) =
                    serde_json::from_value::<Sensitivity>(Value::String(sensitivity.clone()))
                else {
                    continue;
                };
                if let Ok(entry) = serde_json::from_value::<MatrixEntry>(entry.clone()) {
                    matrix.insert(sensitivity, entry);
                }
            }
        }
        let max_scan_chars = settings
            .get("max_scan_chars")
            .and_then(Value::as_u64)
            .and_then(|value| usize::try_from(value).ok())
            .unwrap_or(DEFAULT_MAX_SCAN_CHARS);
        Self {
            mode,
            sanitize_spec,
            matrix,
            max_scan_chars,
            registry,
        }
    }

    /// Scans one parameter's text, consulting the run's scan cache.
    fn scan_param(&self, ctx: &ContextV1, text: &str) -> (Arc<ScanRecord>, bool) {
        let truncated: String = text.chars().take(self.max_scan_chars).collect();
        let compute = || scan_text(&self.registry, &truncated);
        match (ctx.state.scan_cache(), ctx.metadata.timestamp) {
            (Some(cache), Some(now)) => {
                let key = scan_key("dlp", &truncated);
                cache.get_or_scan(&key, now, compute)
            }
            _ => (Arc::new(compute()), false),
        }
    }

    /// Resolves the matrix action for a sensitivity, applying the mode cap.
    fn resolve_action(&self, sensitivity: Sensitivity) -> MatrixEntry {
        let entry = self.matrix.get(&sensitivity).copied().unwrap_or(MatrixEntry {
            action: MatrixAction::Warn,
            auto_sanitize: false,
        });
        let action = match (self.mode, entry.action) {
            (DlpMode::Warn, MatrixAction::Block | MatrixAction::Sanitize) => MatrixAction::Warn,
            (DlpMode::Sanitize, MatrixAction::Block) => MatrixAction::Sanitize,
            (_, action) => action,
        };
        MatrixEntry {
            action,
            auto_sanitize: entry.auto_sanitize,
        }
    }

    /// Builds the decision for one parameter and category group.
    #[allow(clippy::too_many_lines, reason = "Evidence assembly is linear and clearer inline.")]
    fn group_decision(
        &self,
        ctx: &ContextV1,
        param: &str,
        category: &str,
        matches: &[PatternMatchSummary],
        taint_tags: &[TaintTag],
        cache_hit: bool,
        scan_hash: &str,
    ) -> Option<DecisionV1> {
        let pattern_sensitivity = matches.iter().map(|summary| summary.sensitivity).max()?;
        let taint_sensitivity = taint_tags.iter().map(|tag| tag.sensitivity).max();
        let sensitivity = taint_sensitivity.map_or(pattern_sensitivity, |taint| {
            taint.max(pattern_sensitivity)
        });
        let entry = self.resolve_action(sensitivity);

        let (code, verdict, risk_level) = match entry.action {
            MatrixAction::Allow => return None,
            MatrixAction::Warn | MatrixAction::Approve => {
                (ErrorCode::DataLeakPrevented, Verdict::Warn, RiskLevel::Medium)
            }
            MatrixAction::Sanitize => {
                (ErrorCode::SanitizationRequired, Verdict::Sanitize, RiskLevel::High)
            }
            MatrixAction::Block => {
                (ErrorCode::DataLeakPrevented, Verdict::Block, RiskLevel::Critical)
            }
        };

        let mut decision = DecisionV1::new(
            ValidatorId::new(ID_DLP_GUARD),
            code,
            verdict,
            risk_level,
            DecisionDomain::Dlp,
            format!("{} material detected in parameter '{param}'", sensitivity.as_str()),
        );
        decision.evidence.insert("sensitivity".to_string(), json!(sensitivity));
        decision.evidence.insert(
            "taint_sources".to_string(),
            json!(taint_tags.iter().map(|tag| tag.source_tool.as_str()).collect::<Vec<_>>()),
        );
        decision.evidence.insert("pattern_matches".to_string(), json!(matches));
        decision.evidence.insert(EVIDENCE_MATCHED_PARAM.to_string(), json!(param));
        decision.evidence.insert(
            EVIDENCE_FINDING_CLASS.to_string(),
            json!(finding_class(sensitivity, category)),
        );
        decision.evidence.insert(EVIDENCE_SCAN_CACHE_HIT.to_string(), json!(cache_hit));
        decision.evidence.insert(EVIDENCE_SCAN_HASH.to_string(), json!(scan_hash));

        if entry.action == MatrixAction::Approve {
            decision.requires_approval = true;
            decision.tags.push("WARN_APPROVAL_NEEDED".to_string());
        }
        if verdict == Verdict::Sanitize || entry.auto_sanitize {
            let outcome = self.sanitize(ctx);
            decision
                .evidence
                .insert("sanitized_params".to_string(), json!(outcome.params));
            decision
                .evidence
                .insert("sanitized_paths".to_string(), json!(outcome.sanitized_paths));
        }
        decision.suggestion =
            Some("remove or redact the sensitive material before calling the tool".to_string());
        Some(decision)
    }

    /// Runs the structured sanitiser over the full parameter map.
    fn sanitize(&self, ctx: &ContextV1) -> SanitizeOutcome {
        sanitize_params(&ctx.params, self.registry.patterns(), &self.sanitize_spec)
    }
}

impl Validator for DlpGuardValidator {
    fn id(&self) -> ValidatorId {
        ValidatorId::new(ID_DLP_GUARD)
    }

    fn evaluate(&self, ctx: &ContextV1) -> Vec<DecisionV1> {
        let taint_tags = ctx
            .state
            .taint_context()
            .map(|taint| taint.tags_for_sink(&ctx.step_id))
            .unwrap_or_default();

        let mut decisions = Vec::new();
        for (param, value) in &ctx.params {
            let text = collect_text(value);
            if text.is_empty() {
                continue;
            }
            let (record, cache_hit) = self.scan_param(ctx, &text);
            if record.matches.is_empty() {
                continue;
            }
            let mut by_category: BTreeMap<&str, Vec<PatternMatchSummary>> = BTreeMap::new();
            for summary in &record.matches {
                by_category.entry(summary.category.as_str()).or_default().push(summary.clone());
            }
            for (category, matches) in by_category {
                if let Some(decision) = self.group_decision(
                    ctx,
                    param,
                    category,
                    &matches,
                    &taint_tags,
                    cache_hit,
                    &record.scan_hash,
                ) {
                    decisions.push(decision);
                }
            }
        }
        decisions
    }
}

// ============================================================================
// SECTION: Scanning
// ============================================================================

/// Scans text against every registry pattern.
pub(crate) fn scan_text(registry: &RulesRegistry, text: &str) -> ScanRecord {
    let mut matches = Vec::new();
    for compiled in registry.patterns() {
        let mut count = 0;
        let mut last_match: Option<&str> = None;
        for found in compiled.regex.find_iter(text) {
            count += 1;
            last_match = Some(found.as_str());
        }
        if let Some(matched) = last_match {
            matches.push(PatternMatchSummary {
                pattern: compiled.spec.name.clone(),
                category: compiled.spec.category.clone(),
                severity: compiled.spec.severity,
                sensitivity: compiled.spec.sensitivity(),
                match_hash: ContentHash::of_str(matched).short().to_string(),
                last4: matched.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect(),
                count,
                unverified: registry.is_unverified(&compiled.spec.name),
            });
        }
    }
    ScanRecord {
        matches,
        scan_hash: ContentHash::of_str(text).short().to_string(),
    }
}

/// Concatenates the string content of a parameter value.
fn collect_text(value: &Value) -> String {
    let ast = crate::parsers::parse_payload_value(value);
    ast.string_values.join("\n")
}

/// Maps sensitivity and category onto a dedup finding class.
fn finding_class(sensitivity: Sensitivity, category: &str) -> String {
    match sensitivity {
        Sensitivity::Secret => "secret_leak".to_string(),
        Sensitivity::Pii => "pii_leak".to_string(),
        _ => category.to_string(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only panic-based assertions are permitted.")]

    use std::sync::Arc;

    use serde_json::json;

    use super::DlpGuardValidator;
    use crate::cache::ScanCache;
    use crate::core::context::ContextV1;
    use crate::core::context::Params;
    use crate::core::context::StateMap;
    use crate::core::decision::ErrorCode;
    use crate::core::decision::Verdict;
    use crate::core::time::Timestamp;
    use crate::registry::RulesRegistry;
    use crate::validators::Validator;
    use crate::validators::ValidatorSettings;

    /// Builds a guard with the given settings over the builtin registry.
    fn guard(settings: ValidatorSettings) -> DlpGuardValidator {
        let registry = Arc::new(RulesRegistry::load_builtin().unwrap());
        DlpGuardValidator::from_settings(&settings, registry)
    }

    /// Builds a context carrying an API key in its body.
    fn secret_ctx() -> ContextV1 {
        let mut params = Params::new();
        params.insert("to".to_string(), json!("user@example.com"));
        params.insert("body".to_string(), json!("API_KEY=sk-live-abcdef1234567890xyz"));
        let mut ctx = ContextV1::new(
            "send_email".into(),
            params,
            "step-1".into(),
            "run-1".into(),
            "sess-1".into(),
        );
        ctx.metadata.timestamp = Some(Timestamp::from_unix_millis(0));
        ctx
    }

    /// Tests secret material blocks under the default matrix.
    #[test]
    fn test_secret_blocks_by_default() {
        let decisions = guard(ValidatorSettings::new()).evaluate(&secret_ctx());
        let block = decisions.iter().find(|d| d.decision == Verdict::Block).unwrap();
        assert_eq!(block.code, ErrorCode::DataLeakPrevented);
        let rendered = serde_json::to_string(&block).unwrap();
        assert!(!rendered.contains("sk-live-abcdef"), "evidence must stay redacted");
    }

    /// Tests sanitize mode substitutes redacted parameters in evidence.
    #[test]
    fn test_sanitize_mode() {
        let mut settings = ValidatorSettings::new();
        settings.insert("mode".to_string(), json!("sanitize"));
        let decisions = guard(settings).evaluate(&secret_ctx());
        let sanitize = decisions.iter().find(|d| d.decision == Verdict::Sanitize).unwrap();
        assert_eq!(sanitize.code, ErrorCode::SanitizationRequired);
        let sanitized = sanitize.evidence.get("sanitized_params").unwrap();
        assert_eq!(sanitized["body"], json!("API_KEY=sk-****…7890xyz"));
        assert_eq!(sanitized["to"], json!("user@example.com"));
    }

    /// Tests the scan cache is consulted on repeated evaluations.
    #[test]
    fn test_scan_cache_hit_flag() {
        let cache = Arc::new(ScanCache::new());
        let mut ctx = secret_ctx();
        ctx.state = StateMap::new(None, Some(Arc::clone(&cache)));

        let validator = guard(ValidatorSettings::new());
        let first = validator.evaluate(&ctx);
        assert_eq!(first[0].evidence.get("scan_cache_hit"), Some(&json!(false)));
        let second = validator.evaluate(&ctx);
        assert_eq!(second[0].evidence.get("scan_cache_hit"), Some(&json!(true)));
    }

    /// Tests warn mode caps everything to warnings.
    #[test]
    fn test_warn_mode_caps() {
        let mut settings = ValidatorSettings::new();
        settings.insert("mode".to_string(), json!("warn"));
        let decisions = guard(settings).evaluate(&secret_ctx());
        assert!(decisions.iter().all(|d| d.decision == Verdict::Warn));
    }

    /// Tests clean parameters yield no decisions.
    #[test]
    fn test_clean_params() {
        let mut params = Params::new();
        params.insert("body".to_string(), json!("weather report attached"));
        let ctx = ContextV1::new(
            "send_email".into(),
            params,
            "step-1".into(),
            "run-1".into(),
            "sess-1".into(),
        );
        assert!(guard(ValidatorSettings::new()).evaluate(&ctx).is_empty());
    }
}
