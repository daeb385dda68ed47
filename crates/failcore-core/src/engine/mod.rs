// crates/failcore-core/src/engine/mod.rs
// ============================================================================
// Module: Failcore Validation Engine
// Description: Deterministic validator orchestration, dedup, and overrides.
// Purpose: Produce the canonical decision list the gate derives verdicts from.
// Dependencies: crate::{core, policy, registry, validators}, serde_json
// ============================================================================

//! ## Overview
//! The engine resolves the active validator set from the merged policy,
//! runs validators in `(priority, domain, id)` order, and post-processes
//! their decisions: policy enforcement and exceptions apply first, then
//! domain-priority deduplication marks lower-domain duplicates suppressed.
//! A validator that fails internally yields a synthetic fail-open
//! `INTERNAL_ERROR` warning and the engine continues. For identical
//! `(policy, registry, ctx, metadata.timestamp)` the output is
//! byte-identical; no scheduler ordering leaks into decisions.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod explain;
pub mod gate;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use serde_json::json;
use thiserror::Error;

use crate::core::context::ContextV1;
use crate::core::decision::DecisionDomain;
use crate::core::decision::DecisionV1;
use crate::core::decision::EVIDENCE_SUPPRESSED_CODES;
use crate::core::decision::ErrorCode;
use crate::core::decision::RiskLevel;
use crate::core::decision::Verdict;
use crate::core::identifiers::ValidatorId;
use crate::policy::BreakglassAuditEntry;
use crate::policy::EffectiveValidator;
use crate::policy::Enforcement;
use crate::policy::MergedPolicy;
use crate::registry::RulesRegistry;
use crate::validators::Validator;
use crate::validators::build_builtin;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default per-validator soft timeout.
pub const DEFAULT_VALIDATOR_TIMEOUT: Duration = Duration::from_millis(500);

/// Stable suppression reason for domain-priority dedup.
pub const SUPPRESSION_REASON_DOMAIN: &str = "duplicate_domain_lower_priority";

// ============================================================================
// SECTION: Cancellation
// ============================================================================

/// Cooperative cancellation token propagated through a run.
#[derive(Debug, Default, Clone)]
pub struct CancellationToken {
    /// Shared cancellation flag.
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates an uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Control-plane errors raised while building the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A policy entry named a validator the engine cannot construct.
    #[error("unknown validator '{0}' has no builtin and no registered plug-in")]
    UnknownValidator(ValidatorId),
}

// ============================================================================
// SECTION: Engine Outcome
// ============================================================================

/// Result of one engine pass.
#[derive(Debug, Clone, Default)]
pub struct EngineOutcome {
    /// Full decision list, suppressed entries included.
    pub decisions: Vec<DecisionV1>,
    /// Breakglass audit entries produced by this pass.
    pub audit: Vec<BreakglassAuditEntry>,
}

// ============================================================================
// SECTION: Resolved Validator
// ============================================================================

/// One policy-resolved validator ready to run.
struct ResolvedValidator {
    /// Policy identifier.
    id: ValidatorId,
    /// Execution priority.
    priority: i32,
    /// Reporting domain.
    domain: DecisionDomain,
    /// Validator implementation.
    validator: Box<dyn Validator>,
}

// ============================================================================
// SECTION: Validation Engine
// ============================================================================

/// Deterministic validator orchestrator.
pub struct ValidationEngine {
    /// Merged policy in effect.
    policy: MergedPolicy,
    /// Resolved validators in execution order.
    validators: Vec<ResolvedValidator>,
    /// Per-validator soft timeout.
    soft_timeout: Duration,
}

impl ValidationEngine {
    /// Builds the engine from a merged policy and a registry snapshot.
    ///
    /// Policy entries without a builtin implementation are left as plug-in
    /// slots; [`ValidationEngine::register_plugin`] fills them. Calling
    /// [`ValidationEngine::finish_build`] afterwards rejects slots that
    /// stayed empty.
    #[must_use]
    pub fn new(policy: MergedPolicy, registry: &Arc<RulesRegistry>) -> Self {
        let mut validators = Vec::new();
        for (id, effective) in &policy.validators {
            if !effective.config.enabled {
                continue;
            }
            if let Some(validator) = build_builtin(id.as_str(), &effective.config.config, registry)
            {
                validators.push(ResolvedValidator {
                    id: id.clone(),
                    priority: effective.config.priority,
                    domain: effective.config.domain,
                    validator,
                });
            }
        }
        sort_validators(&mut validators);
        Self {
            policy,
            validators,
            soft_timeout: DEFAULT_VALIDATOR_TIMEOUT,
        }
    }

    /// Registers a third-party validator for a policy slot.
    ///
    /// The plug-in only runs when the merged policy names its identifier
    /// and leaves it enabled.
    pub fn register_plugin(&mut self, validator: Box<dyn Validator>) {
        let id = validator.id();
        let Some(effective) = self.policy.validators.get(&id) else {
            return;
        };
        if !effective.config.enabled || self.validators.iter().any(|resolved| resolved.id == id) {
            return;
        }
        self.validators.push(ResolvedValidator {
            id,
            priority: effective.config.priority,
            domain: effective.config.domain,
            validator,
        });
        sort_validators(&mut self.validators);
    }

    /// Verifies every enabled policy entry has an implementation.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownValidator`] for an unfilled slot that
    /// is not the post-run `drift` analyser.
    pub fn finish_build(&self) -> Result<(), EngineError> {
        for (id, effective) in &self.policy.validators {
            if !effective.config.enabled || id.as_str() == crate::validators::ID_DRIFT {
                continue;
            }
            if !self.validators.iter().any(|resolved| &resolved.id == id) {
                return Err(EngineError::UnknownValidator(id.clone()));
            }
        }
        Ok(())
    }

    /// Returns the merged policy in effect.
    #[must_use]
    pub const fn policy(&self) -> &MergedPolicy {
        &self.policy
    }

    /// Overrides the per-validator soft timeout.
    pub fn set_soft_timeout(&mut self, timeout: Duration) {
        self.soft_timeout = timeout;
    }

    /// Runs every resolved validator over the context.
    #[must_use]
    pub fn run(&self, ctx: &ContextV1, cancel: &CancellationToken) -> EngineOutcome {
        let mut decisions = Vec::new();
        let mut affected: Vec<(ValidatorId, String)> = Vec::new();

        for resolved in &self.validators {
            if cancel.is_cancelled() {
                decisions.push(cancelled_decision(&resolved.id));
                break;
            }
            let produced = self.evaluate_one(resolved, ctx);
            let Some(effective) = self.policy.validators.get(&resolved.id) else {
                continue;
            };
            for mut decision in produced {
                self.apply_policy(&mut decision, effective, ctx, &mut affected);
                decisions.push(decision);
            }
        }

        deduplicate(&mut decisions);

        let audit = self.build_audit(&affected);
        EngineOutcome {
            decisions,
            audit,
        }
    }

    /// Evaluates one validator, converting panics and overruns to warnings.
    fn evaluate_one(&self, resolved: &ResolvedValidator, ctx: &ContextV1) -> Vec<DecisionV1> {
        let started = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| resolved.validator.evaluate(ctx)));
        let elapsed = started.elapsed();
        match result {
            Ok(produced) if elapsed <= self.soft_timeout => produced,
            Ok(_) => {
                let mut decision = DecisionV1::internal_error(
                    resolved.id.clone(),
                    format!("validator exceeded soft timeout of {}ms", self.soft_timeout.as_millis()),
                );
                decision.evidence.insert("timeout".to_string(), json!(true));
                vec![decision]
            }
            Err(cause) => {
                let rendered = cause
                    .downcast_ref::<&str>()
                    .map_or_else(|| "validator panicked".to_string(), ToString::to_string);
                vec![DecisionV1::internal_error(resolved.id.clone(), rendered)]
            }
        }
    }

    /// Applies enforcement, exceptions, and override policy to one decision.
    fn apply_policy(
        &self,
        decision: &mut DecisionV1,
        effective: &EffectiveValidator,
        ctx: &ContextV1,
        affected: &mut Vec<(ValidatorId, String)>,
    ) {
        decision.overrideable = effective.config.allow_override;

        if effective.shadowed {
            decision.tags.push("shadow".to_string());
            return;
        }

        let now = ctx.metadata.timestamp;
        let code = decision.code.as_str().to_string();

        // Breakglass exceptions are audited per decision.
        let breakglass_exception = effective
            .breakglass_exceptions
            .iter()
            .any(|exception| exception.matches(&code, ctx.tool.as_str()) && exception.is_active(now));
        let breakglass_weakened = effective.breakglass_enforcement.is_some();

        let mut target = effective.config.enforcement;
        if breakglass_weakened || breakglass_exception {
            target = effective.effective_enforcement().min(if breakglass_exception {
                Enforcement::Warn
            } else {
                Enforcement::Block
            });
        }

        // Active-layer exceptions weaken without audit.
        let active_exception = effective
            .config
            .exceptions
            .iter()
            .any(|exception| exception.matches(&code, ctx.tool.as_str()) && exception.is_active(now));
        if active_exception {
            target = target.min(Enforcement::Warn);
            decision.tags.push("exception".to_string());
        }

        // Token-based override weakens overrideable decisions.
        let override_config = &self.policy.override_config;
        if decision.overrideable
            && override_config.enabled
            && (!override_config.require_token || ctx.metadata.override_token.is_some())
        {
            target = target.min(Enforcement::Warn);
            decision.tags.push("overridden".to_string());
        }

        if target < Enforcement::Block
            && matches!(decision.decision, Verdict::Block | Verdict::Sanitize)
        {
            decision
                .evidence
                .insert("original_decision".to_string(), json!(decision.decision));
            decision.decision = Verdict::Warn;
            decision.tags.push("enforcement_downgraded".to_string());
            if breakglass_weakened || breakglass_exception {
                decision.tags.push("breakglass".to_string());
                affected.push((decision.validator_id.clone(), code));
            }
        }
    }

    /// Builds the audit entries for breakglass-affected decisions.
    fn build_audit(&self, affected: &[(ValidatorId, String)]) -> Vec<BreakglassAuditEntry> {
        if affected.is_empty() {
            return Vec::new();
        }
        let Some(activation) = &self.policy.activation else {
            return Vec::new();
        };
        let mut affected_validators: Vec<ValidatorId> =
            affected.iter().map(|(id, _)| id.clone()).collect();
        affected_validators.dedup();
        let mut affected_decisions: Vec<String> =
            affected.iter().map(|(_, code)| code.clone()).collect();
        affected_decisions.dedup();
        vec![BreakglassAuditEntry {
            enabled_at: activation.enabled_at,
            enabled_by: activation.enabled_by.clone(),
            reason: activation.reason.clone(),
            expires_at: activation.expires_at,
            token_used: activation.token_used,
            affected_validators,
            affected_decisions,
        }]
    }
}

// ============================================================================
// SECTION: Ordering
// ============================================================================

/// Sorts validators by `(priority, domain, id)` for deterministic runs.
fn sort_validators(validators: &mut [ResolvedValidator]) {
    validators.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.domain.as_str().cmp(b.domain.as_str()))
            .then_with(|| a.id.cmp(&b.id))
    });
}

// ============================================================================
// SECTION: Deduplication
// ============================================================================

/// Applies domain-priority deduplication in place.
///
/// For each suppression key the highest-domain decision survives; others
/// are marked suppressed and their codes are listed on the winner under
/// `suppressed_codes`. Shadow decisions never suppress enforced ones.
fn deduplicate(decisions: &mut [DecisionV1]) {
    let mut groups: BTreeMap<(String, String), Vec<usize>> = BTreeMap::new();
    for (index, decision) in decisions.iter().enumerate() {
        if let Some(key) = decision.suppression_key() {
            groups.entry(key).or_default().push(index);
        }
    }

    for indices in groups.values() {
        let enforced: Vec<usize> =
            indices.iter().copied().filter(|&index| !decisions[index].is_shadow()).collect();
        if enforced.len() < 2 {
            continue;
        }
        let winner = enforced
            .iter()
            .copied()
            .max_by_key(|&index| (decisions[index].domain.rank(), std::cmp::Reverse(index)))
            .unwrap_or(enforced[0]);
        let winner_code = decisions[winner].code.as_str().to_string();

        let mut suppressed_codes = Vec::new();
        for &index in &enforced {
            if index == winner {
                continue;
            }
            let loser = &mut decisions[index];
            loser.suppressed_by = Some(winner_code.clone());
            loser.suppression_reason = Some(SUPPRESSION_REASON_DOMAIN.to_string());
            loser.suppression_explanation = Some(format!(
                "a higher-priority domain reported the same finding as {winner_code}"
            ));
            suppressed_codes.push(json!(loser.code.as_str()));
        }
        decisions[winner]
            .evidence
            .insert(EVIDENCE_SUPPRESSED_CODES.to_string(), json!(suppressed_codes));
    }
}

// ============================================================================
// SECTION: Synthetic Decisions
// ============================================================================

/// Builds the terminal cancellation decision.
fn cancelled_decision(validator_id: &ValidatorId) -> DecisionV1 {
    DecisionV1::new(
        validator_id.clone(),
        ErrorCode::Cancelled,
        Verdict::Block,
        RiskLevel::High,
        DecisionDomain::Other,
        "run cancelled before validation completed",
    )
}

// ============================================================================
// SECTION: Tests
// ============================================================================
