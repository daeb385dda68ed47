// crates/failcore-core/src/registry/builtin.rs
// ============================================================================
// Module: Failcore Builtin Rules
// Description: Curated builtin DLP patterns and semantic rules.
// Purpose: Ship a verified default registry without external files.
// Dependencies: crate::registry
// ============================================================================

//! ## Overview
//! Builtin entries are constructed in code and self-signed with their
//! content hash at load time, so the trusted-signature check exercises the
//! same path as file-loaded registries.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::registry::RegistryDocument;
use crate::registry::RegistryError;
use crate::registry::RuleSource;
use crate::registry::SemanticCategory;
use crate::registry::SemanticDetector;
use crate::registry::SemanticRule;
use crate::registry::SensitivePattern;
use crate::registry::TrustLevel;
use crate::registry::pattern_content_hash;
use crate::registry::rule_content_hash;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Version stamp for builtin entries.
const BUILTIN_VERSION: &str = "2026.07";

/// Builtin pattern seeds: `(name, category, pattern, severity)`.
const PATTERN_SEEDS: &[(&str, &str, &str, u8)] = &[
    ("aws_access_key", "api_key", r"\bAKIA[0-9A-Z]{16}\b", 9),
    (
        "secret_assignment",
        "api_key",
        r#"(?i)\b(api[_-]?key|secret|passwd|password|token)\b\s*[=:]\s*[^\s"']{8,}"#,
        8,
    ),
    ("bearer_token", "token", r"(?i)\bbearer\s+[a-z0-9._\-]{16,}", 7),
    ("private_key_header", "private_key", r"-----BEGIN [A-Z ]*PRIVATE KEY-----", 10),
    ("email_address", "email", r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b", 5),
    ("credit_card_number", "credit_card", r"\b(?:\d[ -]?){13,16}\b", 8),
];

/// Builtin semantic rule seeds: `(id, category, severity, detector)`.
const RULE_SEEDS: &[(&str, SemanticCategory, u8, SemanticDetector)] = &[
    ("SEC-001", SemanticCategory::SecretLeakage, 8, SemanticDetector::SecretAssignment),
    ("SEC-002", SemanticCategory::DangerousCombo, 8, SemanticDetector::DownloadExecute),
    ("SEC-003", SemanticCategory::PathTraversal, 7, SemanticDetector::PathTraversal),
    ("SEC-004", SemanticCategory::DangerousCombo, 9, SemanticDetector::DestructiveCommand),
    ("INJ-001", SemanticCategory::Injection, 8, SemanticDetector::SqlInjectionShape),
    ("POL-001", SemanticCategory::ParamPollution, 5, SemanticDetector::QueryKeyRepetition),
];

// ============================================================================
// SECTION: Document Construction
// ============================================================================

/// Builds the builtin registry document with self-signed entries.
///
/// # Errors
///
/// Returns [`RegistryError`] when signing fails, which indicates a
/// packaging defect.
pub fn builtin_document() -> Result<RegistryDocument, RegistryError> {
    let mut patterns = Vec::with_capacity(PATTERN_SEEDS.len());
    for (name, category, pattern, severity) in PATTERN_SEEDS {
        let mut spec = SensitivePattern {
            name: (*name).to_string(),
            category: (*category).to_string(),
            pattern: (*pattern).to_string(),
            severity: *severity,
            source: RuleSource::Builtin,
            version: BUILTIN_VERSION.to_string(),
            signature: String::new(),
            trust_level: TrustLevel::Trusted,
        };
        spec.signature = pattern_content_hash(&spec)?;
        patterns.push(spec);
    }

    let mut rules = Vec::with_capacity(RULE_SEEDS.len());
    for (id, category, severity, detector) in RULE_SEEDS {
        let mut rule = SemanticRule {
            id: (*id).to_string(),
            category: *category,
            severity: *severity,
            detector: *detector,
            source: RuleSource::Builtin,
            version: BUILTIN_VERSION.to_string(),
            signature: String::new(),
            trust_level: TrustLevel::Trusted,
        };
        rule.signature = rule_content_hash(&rule)?;
        rules.push(rule);
    }

    Ok(RegistryDocument {
        patterns,
        rules,
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only panic-based assertions are permitted.")]

    use regex::Regex;

    use super::builtin_document;

    /// Tests every builtin pattern compiles.
    #[test]
    fn test_builtin_patterns_compile() {
        for spec in builtin_document().unwrap().patterns {
            assert!(Regex::new(&spec.pattern).is_ok(), "pattern {} must compile", spec.name);
        }
    }

    /// Tests the secret assignment pattern catches key-style payloads.
    #[test]
    fn test_secret_assignment_matches() {
        let document = builtin_document().unwrap();
        let spec = document
            .patterns
            .iter()
            .find(|candidate| candidate.name == "secret_assignment")
            .unwrap();
        let regex = Regex::new(&spec.pattern).unwrap();
        assert!(regex.is_match("API_KEY=sk-live-abcdef1234567890xyz"));
        assert!(!regex.is_match("the weather is mild"));
    }

    /// Tests rule identifiers are unique.
    #[test]
    fn test_rule_ids_unique() {
        let document = builtin_document().unwrap();
        let mut ids: Vec<_> = document.rules.iter().map(|rule| rule.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), document.rules.len());
    }
}
