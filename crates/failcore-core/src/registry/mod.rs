// crates/failcore-core/src/registry/mod.rs
// ============================================================================
// Module: Failcore Rules Registry
// Description: Canonical, versioned, signable DLP and semantic rule definitions.
// Purpose: Provide the single source of truth consumed by validators.
// Dependencies: crate::core::{hashing, taint}, regex, serde, sha2
// ============================================================================

//! ## Overview
//! The registry holds sensitive-data patterns and semantic rules. It is
//! immutable after load for the lifetime of a process; hot reload means
//! building a new instance. Entries carry sha256 content signatures: a bad
//! signature on a trusted entry refuses the whole registry, while a bad
//! signature on an untrusted entry loads with a warning surfaced on first
//! use of that entry.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod builtin;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::hashing::ContentHash;
use crate::core::taint::Sensitivity;

// ============================================================================
// SECTION: Sources and Trust
// ============================================================================

/// Provenance of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSource {
    /// Shipped with Failcore.
    Builtin,
    /// Published by the community.
    Community,
    /// Authored locally by the operator.
    Local,
}

/// Trust classification of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// Signature must verify; failure refuses the registry.
    Trusted,
    /// Signature failure loads with a warning tag.
    Untrusted,
    /// No signature expectations.
    Unknown,
}

// ============================================================================
// SECTION: Sensitive Patterns
// ============================================================================

/// DLP pattern definition.
///
/// # Invariants
/// - `severity` is within `1..=10`.
/// - `signature` is the sha256 content hash of the entry minus the signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitivePattern {
    /// Unique pattern name.
    pub name: String,
    /// Category label (`api_key`, `email`, `credit_card`, ...).
    pub category: String,
    /// Regular expression source.
    pub pattern: String,
    /// Severity within `1..=10`.
    pub severity: u8,
    /// Entry provenance.
    pub source: RuleSource,
    /// Entry version.
    pub version: String,
    /// Sha256 content signature.
    pub signature: String,
    /// Trust classification.
    pub trust_level: TrustLevel,
}

impl SensitivePattern {
    /// Maps the pattern category onto the sensitivity lattice.
    #[must_use]
    pub fn sensitivity(&self) -> Sensitivity {
        match self.category.as_str() {
            "api_key" | "private_key" | "password" | "token" | "credential" => Sensitivity::Secret,
            "email" | "phone" | "ssn" | "credit_card" | "pii" => Sensitivity::Pii,
            "confidential" => Sensitivity::Confidential,
            "public" => Sensitivity::Public,
            _ => Sensitivity::Internal,
        }
    }
}

// ============================================================================
// SECTION: Semantic Rules
// ============================================================================

/// Semantic rule category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SemanticCategory {
    /// Secret material leaving through parameters.
    SecretLeakage,
    /// Conflicting or duplicated parameter bindings.
    ParamPollution,
    /// Dangerous command or flag combination.
    DangerousCombo,
    /// Relative path escape.
    PathTraversal,
    /// Injection-shaped input.
    Injection,
}

/// Structural detector evaluated against parsed parameter ASTs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticDetector {
    /// Secret-style `key=value` assignment inside string values.
    SecretAssignment,
    /// Download piped into an interpreter.
    DownloadExecute,
    /// Destructive filesystem command shape.
    DestructiveCommand,
    /// Traversal surviving lexical normalisation.
    PathTraversal,
    /// Injection-shaped SQL keyword skeleton.
    SqlInjectionShape,
    /// Repeated query keys inside one string value.
    QueryKeyRepetition,
}

/// Semantic rule definition.
///
/// # Invariants
/// - `severity` is within `1..=10`.
/// - `signature` is the sha256 content hash of the entry minus the signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticRule {
    /// Stable rule identifier (`SEC-004`, `INJ-001`, ...).
    pub id: String,
    /// Rule category.
    pub category: SemanticCategory,
    /// Severity within `1..=10`.
    pub severity: u8,
    /// Structural detector.
    pub detector: SemanticDetector,
    /// Entry provenance.
    pub source: RuleSource,
    /// Entry version.
    pub version: String,
    /// Sha256 content signature.
    pub signature: String,
    /// Trust classification.
    pub trust_level: TrustLevel,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while loading a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry document failed to parse.
    #[error("invalid registry document: {0}")]
    InvalidDocument(String),
    /// A pattern regex failed to compile.
    #[error("invalid pattern '{name}': {cause}")]
    InvalidPattern {
        /// Offending pattern name.
        name: String,
        /// Compilation failure cause.
        cause: String,
    },
    /// A severity was outside `1..=10`.
    #[error("invalid severity {severity} on entry '{name}'")]
    InvalidSeverity {
        /// Offending entry name.
        name: String,
        /// Rejected severity value.
        severity: u8,
    },
    /// A trusted entry carried an invalid signature.
    #[error("invalid signature on trusted entry '{0}'")]
    InvalidSignature(String),
    /// The registry file could not be read.
    #[error("failed to read registry file: {0}")]
    Io(String),
    /// Canonical hashing failed.
    #[error("failed to hash registry content: {0}")]
    Hashing(String),
}

// ============================================================================
// SECTION: Registry Document
// ============================================================================

/// On-disk registry document shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryDocument {
    /// DLP pattern entries.
    #[serde(default)]
    pub patterns: Vec<SensitivePattern>,
    /// Semantic rule entries.
    #[serde(default)]
    pub rules: Vec<SemanticRule>,
}

// ============================================================================
// SECTION: Registry Filter
// ============================================================================

/// Filter for [`RulesRegistry::list`].
#[derive(Debug, Clone, Default)]
pub struct RegistryFilter {
    /// Restrict to a category label.
    pub category: Option<String>,
    /// Restrict to entries at or above a severity.
    pub min_severity: Option<u8>,
    /// Restrict to a provenance.
    pub source: Option<RuleSource>,
}

// ============================================================================
// SECTION: Compiled Pattern
// ============================================================================

/// A sensitive pattern with its compiled regex.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    /// Pattern definition.
    pub spec: SensitivePattern,
    /// Compiled regex.
    pub regex: Regex,
}

// ============================================================================
// SECTION: Rules Registry
// ============================================================================

/// Immutable, process-scoped rules registry.
///
/// # Invariants
/// - Contents never change after construction; hot reload builds a new value.
#[derive(Debug)]
pub struct RulesRegistry {
    /// Compiled DLP patterns.
    patterns: Vec<CompiledPattern>,
    /// Semantic rules.
    rules: Vec<SemanticRule>,
    /// Names of entries whose untrusted signatures failed verification.
    unverified: BTreeSet<String>,
    /// Canonical content hash of the loaded document.
    content_hash: String,
}

impl RulesRegistry {
    /// Loads the builtin registry content.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when builtin content fails validation,
    /// which indicates a packaging defect.
    pub fn load_builtin() -> Result<Self, RegistryError> {
        Self::from_document(builtin::builtin_document()?)
    }

    /// Loads a registry from raw JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] on parse, compile, or signature failure.
    pub fn load_from_bytes(bytes: &[u8]) -> Result<Self, RegistryError> {
        let document: RegistryDocument = serde_json::from_slice(bytes)
            .map_err(|err| RegistryError::InvalidDocument(err.to_string()))?;
        Self::from_document(document)
    }

    /// Loads a registry from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] on read, parse, compile, or signature failure.
    pub fn load_from_path(path: &Path) -> Result<Self, RegistryError> {
        let bytes = std::fs::read(path).map_err(|err| RegistryError::Io(err.to_string()))?;
        Self::load_from_bytes(&bytes)
    }

    /// Builds a registry from a parsed document, verifying signatures.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] on compile or signature failure.
    pub fn from_document(document: RegistryDocument) -> Result<Self, RegistryError> {
        let content_hash = ContentHash::of_canonical_json(&document)
            .map_err(|err| RegistryError::Hashing(err.to_string()))?
            .into_hex();

        let mut unverified = BTreeSet::new();
        let mut patterns = Vec::with_capacity(document.patterns.len());
        for spec in document.patterns {
            if !(1..=10).contains(&spec.severity) {
                return Err(RegistryError::InvalidSeverity {
                    name: spec.name,
                    severity: spec.severity,
                });
            }
            verify_entry_signature(
                &spec.name,
                spec.trust_level,
                &spec.signature,
                &pattern_content_hash(&spec)?,
                &mut unverified,
            )?;
            let regex = Regex::new(&spec.pattern).map_err(|err| RegistryError::InvalidPattern {
                name: spec.name.clone(),
                cause: err.to_string(),
            })?;
            patterns.push(CompiledPattern {
                spec,
                regex,
            });
        }

        let mut rules = Vec::with_capacity(document.rules.len());
        for rule in document.rules {
            if !(1..=10).contains(&rule.severity) {
                return Err(RegistryError::InvalidSeverity {
                    name: rule.id,
                    severity: rule.severity,
                });
            }
            verify_entry_signature(
                &rule.id,
                rule.trust_level,
                &rule.signature,
                &rule_content_hash(&rule)?,
                &mut unverified,
            )?;
            rules.push(rule);
        }

        Ok(Self {
            patterns,
            rules,
            unverified,
            content_hash,
        })
    }

    /// Returns all compiled patterns.
    #[must_use]
    pub fn patterns(&self) -> &[CompiledPattern] {
        &self.patterns
    }

    /// Returns all semantic rules.
    #[must_use]
    pub fn rules(&self) -> &[SemanticRule] {
        &self.rules
    }

    /// Lists patterns matching a filter.
    #[must_use]
    pub fn list(&self, filter: &RegistryFilter) -> Vec<&SensitivePattern> {
        self.patterns
            .iter()
            .map(|compiled| &compiled.spec)
            .filter(|spec| {
                filter.category.as_ref().is_none_or(|category| &spec.category == category)
                    && filter.min_severity.is_none_or(|floor| spec.severity >= floor)
                    && filter.source.is_none_or(|source| spec.source == source)
            })
            .collect()
    }

    /// Lists patterns from one provenance.
    #[must_use]
    pub fn by_source(&self, source: RuleSource) -> Vec<&SensitivePattern> {
        self.list(&RegistryFilter {
            source: Some(source),
            ..RegistryFilter::default()
        })
    }

    /// Returns `true` when the entry's untrusted signature failed verification.
    #[must_use]
    pub fn is_unverified(&self, name: &str) -> bool {
        self.unverified.contains(name)
    }

    /// Returns the canonical content hash of the loaded document.
    #[must_use]
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }
}

// ============================================================================
// SECTION: Signatures
// ============================================================================

/// Computes the content hash of a pattern entry minus its signature.
///
/// # Errors
///
/// Returns [`RegistryError::Hashing`] when canonicalisation fails.
pub fn pattern_content_hash(spec: &SensitivePattern) -> Result<String, RegistryError> {
    let mut unsigned = spec.clone();
    unsigned.signature = String::new();
    Ok(ContentHash::of_canonical_json(&unsigned)
        .map_err(|err| RegistryError::Hashing(err.to_string()))?
        .into_hex())
}

/// Computes the content hash of a semantic rule minus its signature.
///
/// # Errors
///
/// Returns [`RegistryError::Hashing`] when canonicalisation fails.
pub fn rule_content_hash(rule: &SemanticRule) -> Result<String, RegistryError> {
    let mut unsigned = rule.clone();
    unsigned.signature = String::new();
    Ok(ContentHash::of_canonical_json(&unsigned)
        .map_err(|err| RegistryError::Hashing(err.to_string()))?
        .into_hex())
}

/// Applies the trust-level signature policy to one entry.
fn verify_entry_signature(
    name: &str,
    trust: TrustLevel,
    declared: &str,
    expected: &str,
    unverified: &mut BTreeSet<String>,
) -> Result<(), RegistryError> {
    match trust {
        TrustLevel::Trusted => {
            if declared != expected {
                return Err(RegistryError::InvalidSignature(name.to_string()));
            }
        }
        TrustLevel::Untrusted => {
            if declared != expected {
                unverified.insert(name.to_string());
            }
        }
        TrustLevel::Unknown => {}
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only panic-based assertions are permitted.")]

    use super::RegistryError;
    use super::RuleSource;
    use super::RulesRegistry;
    use super::TrustLevel;
    use super::pattern_content_hash;

    /// Tests builtin content loads and verifies.
    #[test]
    fn test_builtin_loads() {
        let registry = RulesRegistry::load_builtin().unwrap();
        assert!(!registry.patterns().is_empty());
        assert!(!registry.rules().is_empty());
        assert!(!registry.by_source(RuleSource::Builtin).is_empty());
    }

    /// Tests a trusted entry with a forged signature refuses the registry.
    #[test]
    fn test_trusted_forged_signature_refused() {
        let mut document = super::builtin::builtin_document().unwrap();
        document.patterns[0].signature = "forged".to_string();
        let err = RulesRegistry::from_document(document).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidSignature(_)));
    }

    /// Tests an untrusted entry with a bad signature loads but is flagged.
    #[test]
    fn test_untrusted_bad_signature_flagged() {
        let mut document = super::builtin::builtin_document().unwrap();
        document.patterns[0].trust_level = TrustLevel::Untrusted;
        document.patterns[0].signature = "forged".to_string();
        let name = document.patterns[0].name.clone();
        let registry = RulesRegistry::from_document(document).unwrap();
        assert!(registry.is_unverified(&name));
    }

    /// Tests signatures change when content changes.
    #[test]
    fn test_content_hash_sensitivity() {
        let document = super::builtin::builtin_document().unwrap();
        let mut altered = document.patterns[0].clone();
        let original = pattern_content_hash(&altered).unwrap();
        altered.severity = altered.severity.saturating_sub(1).max(1);
        let changed = pattern_content_hash(&altered).unwrap();
        assert_ne!(original, changed);
    }
}
