// crates/failcore-core/src/enrich/mod.rs
// ============================================================================
// Module: Failcore Enrichers
// Description: Post-execution, evidence-only scanners bound to EGRESS.
// Purpose: Annotate observed outputs without ever touching the verdict.
// Dependencies: crate::{cache, core, registry}, regex, serde_json
// ============================================================================

//! ## Overview
//! Enrichers run after execution over the same EGRESS input and contribute
//! evidence under their own key. They cannot block, cannot mutate verdicts,
//! and may run concurrently; evidence keys are written in deterministic
//! order regardless of completion order. The DLP enricher shares the run's
//! scan cache with the preflight guard, so identical payloads are scanned
//! once per run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;
use serde_json::json;

use crate::cache::scan_key;
use crate::core::context::ContextV1;
use crate::core::effects::EffectEvent;
use crate::cost::CostUsage;
use crate::registry::RulesRegistry;

// ============================================================================
// SECTION: Egress Input
// ============================================================================

/// Everything an enricher may observe about one executed step.
#[derive(Debug, Clone)]
pub struct EgressInput<'a> {
    /// Post-execution context carrying the observed result.
    pub ctx: &'a ContextV1,
    /// Side effects observed by the executor.
    pub effects: &'a [EffectEvent],
    /// Usage extracted from the tool output, when available.
    pub usage: Option<CostUsage>,
    /// Wall-clock duration reported by the executor, in milliseconds.
    pub duration_ms: Option<u64>,
}

// ============================================================================
// SECTION: Enricher Contract
// ============================================================================

/// Evidence-only scanner bound to EGRESS.
///
/// # Invariants
/// - Enrichers never block and never mutate verdicts.
pub trait Enricher: Send + Sync {
    /// Evidence key this enricher writes under.
    fn name(&self) -> &'static str;

    /// Produces evidence for one executed step, if any.
    fn enrich(&self, input: &EgressInput<'_>) -> Option<Value>;
}

// ============================================================================
// SECTION: Execution
// ============================================================================

/// Runs enrichers concurrently and collects evidence in key order.
#[must_use]
pub fn run_enrichers(
    enrichers: &[Box<dyn Enricher>],
    input: &EgressInput<'_>,
) -> BTreeMap<String, Value> {
    let mut evidence = BTreeMap::new();
    std::thread::scope(|scope| {
        let handles: Vec<_> = enrichers
            .iter()
            .map(|enricher| {
                scope.spawn(move || (enricher.name(), enricher.enrich(input)))
            })
            .collect();
        for handle in handles {
            if let Ok((name, Some(value))) = handle.join() {
                evidence.insert(name.to_string(), value);
            }
        }
    });
    evidence
}

/// Builds the default enricher set over a registry snapshot.
#[must_use]
pub fn default_enrichers(registry: &Arc<RulesRegistry>) -> Vec<Box<dyn Enricher>> {
    vec![
        Box::new(DlpEnricher::new(Arc::clone(registry))),
        Box::new(TaintEnricher),
        Box::new(SemanticEnricher::new()),
        Box::new(EffectsEnricher),
        Box::new(UsageEnricher),
    ]
}

// ============================================================================
// SECTION: DLP Enricher
// ============================================================================

/// Scans outputs for registry patterns.
pub struct DlpEnricher {
    /// Shared rules registry.
    registry: Arc<RulesRegistry>,
}

impl DlpEnricher {
    /// Creates the enricher over a registry snapshot.
    #[must_use]
    pub const fn new(registry: Arc<RulesRegistry>) -> Self {
        Self {
            registry,
        }
    }
}

impl Enricher for DlpEnricher {
    fn name(&self) -> &'static str {
        "dlp"
    }

    fn enrich(&self, input: &EgressInput<'_>) -> Option<Value> {
        let result = input.ctx.result.as_ref()?;
        let text = crate::parsers::parse_payload_value(result).string_values.join("\n");
        if text.is_empty() {
            return None;
        }
        let compute = || crate::validators::dlp::scan_text(&self.registry, &text);
        let (record, cache_hit) =
            match (input.ctx.state.scan_cache(), input.ctx.metadata.timestamp) {
                (Some(cache), Some(now)) => {
                    let key = scan_key("dlp_egress", &text);
                    cache.get_or_scan(&key, now, compute)
                }
                _ => (Arc::new(compute()), false),
            };
        if record.matches.is_empty() {
            return None;
        }
        Some(json!({
            "matches": record.matches,
            "scan_hash": record.scan_hash,
            "scan_cache_hit": cache_hit,
        }))
    }
}

// ============================================================================
// SECTION: Taint Enricher
// ============================================================================

/// Attributes output provenance from the taint context.
pub struct TaintEnricher;

impl Enricher for TaintEnricher {
    fn name(&self) -> &'static str {
        "taint"
    }

    fn enrich(&self, input: &EgressInput<'_>) -> Option<Value> {
        let taint = input.ctx.state.taint_context()?;
        let inherited = taint.tags_for_sink(&input.ctx.step_id);
        let own = taint.tag_for(&input.ctx.step_id);
        if inherited.is_empty() && own.is_none() {
            return None;
        }
        let max_sensitivity = inherited
            .iter()
            .map(|tag| tag.sensitivity)
            .chain(own.iter().map(|tag| tag.sensitivity))
            .max();
        Some(json!({
            "inherited_from": inherited.iter().map(|tag| tag.source_step.as_str()).collect::<Vec<_>>(),
            "own_tag": own,
            "max_sensitivity": max_sensitivity,
        }))
    }
}

// ============================================================================
// SECTION: Semantic Enricher
// ============================================================================

/// Annotates outputs with semantic anomaly labels.
pub struct SemanticEnricher {
    /// Secret assignment shape.
    secret_shape: Option<Regex>,
}

impl SemanticEnricher {
    /// Creates the enricher with its shapes precompiled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            secret_shape: Regex::new(
                r#"(?i)\b(api[_-]?key|secret|passwd|password|token)\b\s*[=:]\s*[^\s"']{8,}"#,
            )
            .ok(),
        }
    }
}

impl Default for SemanticEnricher {
    fn default() -> Self {
        Self::new()
    }
}

impl Enricher for SemanticEnricher {
    fn name(&self) -> &'static str {
        "semantic"
    }

    fn enrich(&self, input: &EgressInput<'_>) -> Option<Value> {
        let result = input.ctx.result.as_ref()?;
        let strings = crate::parsers::parse_payload_value(result).string_values;
        let mut anomalies = Vec::new();
        if let Some(shape) = &self.secret_shape
            && strings.iter().any(|text| shape.is_match(text))
        {
            anomalies.push("secret_material_in_output");
        }
        if strings.iter().any(|text| crate::parsers::parse_sql(text).stacked_queries) {
            anomalies.push("stacked_sql_in_output");
        }
        if anomalies.is_empty() {
            return None;
        }
        Some(json!({"anomalies": anomalies}))
    }
}

// ============================================================================
// SECTION: Effects Enricher
// ============================================================================

/// Annotates observed side-effect metadata.
pub struct EffectsEnricher;

impl Enricher for EffectsEnricher {
    fn name(&self) -> &'static str {
        "effects"
    }

    fn enrich(&self, input: &EgressInput<'_>) -> Option<Value> {
        if input.effects.is_empty() {
            return None;
        }
        Some(json!({"observed": input.effects}))
    }
}

// ============================================================================
// SECTION: Usage Enricher
// ============================================================================

/// Annotates token, cost, and duration usage.
pub struct UsageEnricher;

impl Enricher for UsageEnricher {
    fn name(&self) -> &'static str {
        "usage"
    }

    fn enrich(&self, input: &EgressInput<'_>) -> Option<Value> {
        if input.usage.is_none() && input.duration_ms.is_none() {
            return None;
        }
        Some(json!({
            "usage": input.usage,
            "duration_ms": input.duration_ms,
        }))
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

    use super::EgressInput;
    use super::default_enrichers;
    use super::run_enrichers;
    use crate::core::context::ContextV1;
    use crate::core::context::Params;
    use crate::core::effects::EffectCategory;
    use crate::core::effects::EffectEvent;
    use crate::core::effects::EffectType;
    use crate::cost::CostUsage;
    use crate::registry::RulesRegistry;

    /// Builds a post-context with a secret-bearing result.
    fn post_ctx() -> ContextV1 {
        ContextV1::new(
            "read_config".into(),
            Params::new(),
            "step-1".into(),
            "run-1".into(),
            "sess-1".into(),
        )
        .with_result(json!({"content": "API_KEY=sk-live-abcdef1234567890xyz"}))
    }

    /// Tests evidence keys come back in deterministic order.
    #[test]
    fn test_evidence_key_order() {
        let registry = Arc::new(RulesRegistry::load_builtin().unwrap());
        let enrichers = default_enrichers(&registry);
        let ctx = post_ctx();
        let effects = vec![EffectEvent {
            effect_type: EffectType::FilesystemRead,
            target: "./config.toml".to_string(),
            category: EffectCategory::Filesystem,
            tool: "read_config".into(),
            step_id: "step-1".into(),
        }];
        let input = EgressInput {
            ctx: &ctx,
            effects: &effects,
            usage: Some(CostUsage {
                cost_usd: 0.001,
                input_tokens: 5,
                output_tokens: 10,
                total_tokens: 15,
                api_calls: 1,
            }),
            duration_ms: Some(42),
        };
        let evidence = run_enrichers(&enrichers, &input);
        let keys: Vec<_> = evidence.keys().cloned().collect();
        assert_eq!(keys, vec!["dlp", "effects", "semantic", "usage"]);
    }

    /// Tests the DLP enricher reports matches without raw content.
    #[test]
    fn test_dlp_enricher_redacted() {
        let registry = Arc::new(RulesRegistry::load_builtin().unwrap());
        let enrichers = default_enrichers(&registry);
        let ctx = post_ctx();
        let input = EgressInput {
            ctx: &ctx,
            effects: &[],
            usage: None,
            duration_ms: None,
        };
        let evidence = run_enrichers(&enrichers, &input);
        let rendered = serde_json::to_string(&evidence["dlp"]).unwrap();
        assert!(rendered.contains("secret_assignment"));
        assert!(!rendered.contains("sk-live-abcdef"));
    }

    /// Tests enrichers stay quiet on empty inputs.
    #[test]
    fn test_quiet_on_empty() {
        let registry = Arc::new(RulesRegistry::load_builtin().unwrap());
        let enrichers = default_enrichers(&registry);
        let ctx = ContextV1::new(
            "noop".into(),
            Params::new(),
            "step-1".into(),
            "run-1".into(),
            "sess-1".into(),
        );
        let input = EgressInput {
            ctx: &ctx,
            effects: &[],
            usage: None,
            duration_ms: None,
        };
        assert!(run_enrichers(&enrichers, &input).is_empty());
    }
}
