// crates/failcore-core/src/policy/mod.rs
// ============================================================================
// Module: Failcore Policy Model
// Description: Three-layer policy (active, shadow, breakglass) and merge rules.
// Purpose: Resolve the effective validator configuration for a run.
// Dependencies: crate::core::{decision, hashing, identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A policy maps validator identifiers to configuration. Three layers exist
//! per run: the active layer is complete and standalone; the shadow layer
//! may only switch enforcement to SHADOW on validators the active layer
//! already has; the breakglass layer may only weaken the active layer, and
//! every breakglass exception must carry an expiry. Merge order is
//! `active -> shadow -> breakglass`, and every breakglass effect is
//! auditable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::decision::DecisionDomain;
use crate::core::hashing::ContentHash;
use crate::core::identifiers::PolicyName;
use crate::core::identifiers::ValidatorId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Enforcement
// ============================================================================

/// Enforcement mode for a validator's decisions.
///
/// # Invariants
/// - Ordering encodes strength: `Shadow < Warn < Block`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Enforcement {
    /// Observation only; decisions never affect the verdict.
    Shadow,
    /// Blocking decisions are downgraded to warnings.
    Warn,
    /// Decisions apply at full strength.
    Block,
}

// ============================================================================
// SECTION: Exceptions
// ============================================================================

/// Scoped exception weakening a validator's decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyException {
    /// Decision code the exception applies to; `None` matches any code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Tool name the exception applies to; `None` matches any tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Reason recorded for audit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Expiry; mandatory on breakglass exceptions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
}

impl PolicyException {
    /// Returns `true` when the exception matches a decision's code and tool.
    #[must_use]
    pub fn matches(&self, code: &str, tool: &str) -> bool {
        self.code.as_deref().is_none_or(|expected| expected == code)
            && self.tool.as_deref().is_none_or(|expected| expected == tool)
    }

    /// Returns `true` when the exception is active at the given time.
    ///
    /// An exception with an expiry is inactive when `now` is absent; this is
    /// the fail-closed posture for time-sensitive policy.
    #[must_use]
    pub fn is_active(&self, now: Option<Timestamp>) -> bool {
        match self.expires_at {
            None => true,
            Some(expiry) => now.is_some_and(|now| now < expiry),
        }
    }
}

// ============================================================================
// SECTION: Validator Configuration
// ============================================================================

/// Per-validator policy entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Whether the validator runs at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Enforcement mode.
    #[serde(default = "default_enforcement")]
    pub enforcement: Enforcement,
    /// Execution priority; lower runs earlier.
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Domain the validator reports under.
    pub domain: DecisionDomain,
    /// Validator-specific configuration.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, Value>,
    /// Scoped exceptions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exceptions: Vec<PolicyException>,
    /// Whether decisions from this validator may be overridden with a token.
    #[serde(default)]
    pub allow_override: bool,
}

/// Default for [`ValidatorConfig::enabled`].
const fn default_enabled() -> bool {
    true
}

/// Default for [`ValidatorConfig::enforcement`].
const fn default_enforcement() -> Enforcement {
    Enforcement::Block
}

/// Default for [`ValidatorConfig::priority`].
const fn default_priority() -> i32 {
    100
}

impl ValidatorConfig {
    /// Creates a config with layer defaults for the given domain.
    #[must_use]
    pub const fn new(domain: DecisionDomain) -> Self {
        Self {
            enabled: true,
            enforcement: Enforcement::Block,
            priority: 100,
            domain,
            config: BTreeMap::new(),
            exceptions: Vec::new(),
            allow_override: false,
        }
    }
}

// ============================================================================
// SECTION: Override Configuration
// ============================================================================

/// Run-level override settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideConfig {
    /// Overrides are permitted at all.
    #[serde(default)]
    pub enabled: bool,
    /// Overrides require a token in context metadata.
    #[serde(default)]
    pub require_token: bool,
    /// Audit retention hint, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_ttl: Option<u64>,
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Policy document metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyMetadata {
    /// Policy name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One policy layer document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Document format version.
    pub version: String,
    /// Validator entries keyed by identifier.
    pub validators: BTreeMap<ValidatorId, ValidatorConfig>,
    /// Override settings.
    #[serde(default, rename = "override")]
    pub override_config: OverrideConfig,
    /// Document metadata.
    #[serde(default)]
    pub metadata: PolicyMetadata,
}

impl Policy {
    /// Creates an empty active policy with the given name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            version: "v1".to_string(),
            validators: BTreeMap::new(),
            override_config: OverrideConfig::default(),
            metadata: PolicyMetadata {
                name: name.into(),
                description: None,
            },
        }
    }
}

// ============================================================================
// SECTION: Breakglass
// ============================================================================

/// Breakglass activation facts recorded for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakglassActivation {
    /// Activation time.
    pub enabled_at: Timestamp,
    /// Operator who activated the layer.
    pub enabled_by: String,
    /// Non-empty activation reason.
    pub reason: String,
    /// Activation expiry.
    pub expires_at: Timestamp,
    /// Whether an override token was presented.
    pub token_used: bool,
}

/// Breakglass layer: a weakening policy plus its activation facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakglassPolicy {
    /// Weakening deltas over the active layer.
    pub policy: Policy,
    /// Activation facts.
    pub activation: BreakglassActivation,
}

/// Audit entry emitted when breakglass affects decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakglassAuditEntry {
    /// Activation time.
    pub enabled_at: Timestamp,
    /// Operator who activated the layer.
    pub enabled_by: String,
    /// Activation reason.
    pub reason: String,
    /// Activation expiry.
    pub expires_at: Timestamp,
    /// Whether an override token was presented.
    pub token_used: bool,
    /// Validators whose enforcement was weakened.
    pub affected_validators: Vec<ValidatorId>,
    /// Codes of decisions that were downgraded.
    pub affected_decisions: Vec<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Control-plane errors raised while merging policy layers.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The shadow layer referenced a validator absent from active.
    #[error("shadow layer adds validator '{0}'")]
    ShadowAddsValidator(ValidatorId),
    /// The shadow layer tried to set a non-shadow enforcement.
    #[error("shadow layer may only set SHADOW enforcement on '{0}'")]
    ShadowMayOnlyShadow(ValidatorId),
    /// The breakglass layer referenced a validator absent from active.
    #[error("breakglass layer adds validator '{0}'")]
    BreakglassAddsValidator(ValidatorId),
    /// The breakglass layer tried to raise enforcement.
    #[error("breakglass layer may only weaken enforcement on '{0}'")]
    BreakglassMayOnlyWeaken(ValidatorId),
    /// A breakglass exception is missing its expiry.
    #[error("breakglass exception on '{0}' requires expires_at")]
    ExceptionRequiresExpiry(ValidatorId),
    /// The breakglass activation reason is empty.
    #[error("breakglass activation requires a non-empty reason")]
    EmptyBreakglassReason,
    /// The merged policy could not be hashed.
    #[error("failed to hash merged policy: {0}")]
    Hashing(String),
}

// ============================================================================
// SECTION: Merged Policy
// ============================================================================

/// Effective configuration for one validator after layer merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveValidator {
    /// Active-layer configuration.
    pub config: ValidatorConfig,
    /// Shadow layer switched this validator to observation-only.
    pub shadowed: bool,
    /// Weakened enforcement from the breakglass layer, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakglass_enforcement: Option<Enforcement>,
    /// Exceptions contributed by the breakglass layer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub breakglass_exceptions: Vec<PolicyException>,
}

impl EffectiveValidator {
    /// Returns the enforcement in effect ignoring per-decision exceptions.
    #[must_use]
    pub fn effective_enforcement(&self) -> Enforcement {
        if self.shadowed {
            return Enforcement::Shadow;
        }
        self.breakglass_enforcement
            .map_or(self.config.enforcement, |weakened| weakened.min(self.config.enforcement))
    }
}

/// Merged, run-ready policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedPolicy {
    /// Name taken from the active layer.
    pub name: PolicyName,
    /// Effective validator table.
    pub validators: BTreeMap<ValidatorId, EffectiveValidator>,
    /// Override settings from the active layer.
    pub override_config: OverrideConfig,
    /// Breakglass activation facts, when the layer is present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation: Option<BreakglassActivation>,
    /// Canonical hash of the merged table.
    pub policy_hash: String,
}

/// Merges the three policy layers in `active -> shadow -> breakglass` order.
///
/// # Errors
///
/// Returns [`PolicyError`] when a layer violates its contract: shadow may
/// not add validators or set non-shadow enforcement; breakglass may not add
/// validators, raise enforcement, or carry exceptions without expiry.
pub fn merge_policy(
    active: &Policy,
    shadow: Option<&Policy>,
    breakglass: Option<&BreakglassPolicy>,
) -> Result<MergedPolicy, PolicyError> {
    let mut validators: BTreeMap<ValidatorId, EffectiveValidator> = active
        .validators
        .iter()
        .map(|(id, config)| {
            (
                id.clone(),
                EffectiveValidator {
                    config: config.clone(),
                    shadowed: false,
                    breakglass_enforcement: None,
                    breakglass_exceptions: Vec::new(),
                },
            )
        })
        .collect();

    if let Some(shadow) = shadow {
        for (id, entry) in &shadow.validators {
            let Some(effective) = validators.get_mut(id) else {
                return Err(PolicyError::ShadowAddsValidator(id.clone()));
            };
            if entry.enforcement != Enforcement::Shadow {
                return Err(PolicyError::ShadowMayOnlyShadow(id.clone()));
            }
            effective.shadowed = true;
        }
    }

    if let Some(breakglass) = breakglass {
        if breakglass.activation.reason.trim().is_empty() {
            return Err(PolicyError::EmptyBreakglassReason);
        }
        for (id, entry) in &breakglass.policy.validators {
            let Some(effective) = validators.get_mut(id) else {
                return Err(PolicyError::BreakglassAddsValidator(id.clone()));
            };
            if entry.enforcement > effective.config.enforcement {
                return Err(PolicyError::BreakglassMayOnlyWeaken(id.clone()));
            }
            if entry.enforcement < effective.config.enforcement {
                effective.breakglass_enforcement = Some(entry.enforcement);
            }
            for exception in &entry.exceptions {
                if exception.expires_at.is_none() {
                    return Err(PolicyError::ExceptionRequiresExpiry(id.clone()));
                }
                effective.breakglass_exceptions.push(exception.clone());
            }
        }
    }

    let policy_hash = ContentHash::of_canonical_json(&validators)
        .map_err(|err| PolicyError::Hashing(err.to_string()))?
        .into_hex();

    Ok(MergedPolicy {
        name: PolicyName::new(active.metadata.name.clone()),
        validators,
        override_config: active.override_config.clone(),
        activation: breakglass.map(|layer| layer.activation.clone()),
        policy_hash,
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only panic-based assertions are permitted.")]

    use super::BreakglassActivation;
    use super::BreakglassPolicy;
    use super::Enforcement;
    use super::Policy;
    use super::PolicyError;
    use super::PolicyException;
    use super::ValidatorConfig;
    use super::merge_policy;
    use crate::core::decision::DecisionDomain;
    use crate::core::identifiers::ValidatorId;
    use crate::core::time::Timestamp;

    /// Builds an active policy with one security validator.
    fn active() -> Policy {
        let mut policy = Policy::named("fs_safe");
        policy.validators.insert("path_security".into(), ValidatorConfig::new(DecisionDomain::Security));
        policy
    }

    /// Builds a breakglass layer over the given deltas.
    fn breakglass(policy: Policy) -> BreakglassPolicy {
        BreakglassPolicy {
            policy,
            activation: BreakglassActivation {
                enabled_at: Timestamp::from_unix_millis(0),
                enabled_by: "oncall".to_string(),
                reason: "incident 4821".to_string(),
                expires_at: Timestamp::from_unix_millis(3_600_000),
                token_used: true,
            },
        }
    }

    /// Tests shadow cannot add validators.
    #[test]
    fn test_shadow_cannot_add() {
        let mut shadow = Policy::named("shadow");
        let mut entry = ValidatorConfig::new(DecisionDomain::Dlp);
        entry.enforcement = Enforcement::Shadow;
        shadow.validators.insert("dlp_guard".into(), entry);
        let err = merge_policy(&active(), Some(&shadow), None).unwrap_err();
        assert!(matches!(err, PolicyError::ShadowAddsValidator(_)));
    }

    /// Tests shadow entries must carry SHADOW enforcement.
    #[test]
    fn test_shadow_must_shadow() {
        let mut shadow = Policy::named("shadow");
        shadow
            .validators
            .insert("path_security".into(), ValidatorConfig::new(DecisionDomain::Security));
        let err = merge_policy(&active(), Some(&shadow), None).unwrap_err();
        assert!(matches!(err, PolicyError::ShadowMayOnlyShadow(_)));
    }

    /// Tests breakglass cannot raise enforcement.
    #[test]
    fn test_breakglass_cannot_raise() {
        let mut base = active();
        if let Some(entry) = base.validators.get_mut(&ValidatorId::new("path_security")) {
            entry.enforcement = Enforcement::Warn;
        }
        let mut deltas = Policy::named("bg");
        deltas
            .validators
            .insert("path_security".into(), ValidatorConfig::new(DecisionDomain::Security));
        let err = merge_policy(&base, None, Some(&breakglass(deltas))).unwrap_err();
        assert!(matches!(err, PolicyError::BreakglassMayOnlyWeaken(_)));
    }

    /// Tests breakglass exceptions require expiry.
    #[test]
    fn test_breakglass_exception_requires_expiry() {
        let mut deltas = Policy::named("bg");
        let mut entry = ValidatorConfig::new(DecisionDomain::Security);
        entry.enforcement = Enforcement::Warn;
        entry.exceptions.push(PolicyException::default());
        deltas.validators.insert("path_security".into(), entry);
        let err = merge_policy(&active(), None, Some(&breakglass(deltas))).unwrap_err();
        assert!(matches!(err, PolicyError::ExceptionRequiresExpiry(_)));
    }

    /// Tests a clean merge records weakening and hashes deterministically.
    #[test]
    fn test_merge_weakens_and_hashes() {
        let mut deltas = Policy::named("bg");
        let mut entry = ValidatorConfig::new(DecisionDomain::Security);
        entry.enforcement = Enforcement::Warn;
        deltas.validators.insert("path_security".into(), entry);

        let merged_a = merge_policy(&active(), None, Some(&breakglass(deltas.clone()))).unwrap();
        let merged_b = merge_policy(&active(), None, Some(&breakglass(deltas))).unwrap();
        assert_eq!(merged_a.policy_hash, merged_b.policy_hash);

        let effective = merged_a.validators.get(&ValidatorId::new("path_security")).unwrap();
        assert_eq!(effective.effective_enforcement(), Enforcement::Warn);
    }

    /// Tests an expired exception is inactive and a missing timestamp fails closed.
    #[test]
    fn test_exception_activity() {
        let exception = PolicyException {
            expires_at: Some(Timestamp::from_unix_millis(100)),
            ..PolicyException::default()
        };
        assert!(exception.is_active(Some(Timestamp::from_unix_millis(50))));
        assert!(!exception.is_active(Some(Timestamp::from_unix_millis(100))));
        assert!(!exception.is_active(None));
    }
}
