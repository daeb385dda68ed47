// system-tests/tests/suites/end_to_end.rs
// ============================================================================
// Module: End-to-End Scenarios
// Description: Canonical pipeline scenarios from traversal to drift.
// Purpose: Verify verdicts, evidence, and trace output for whole steps.
// Dependencies: helpers, failcore-core, serde_json
// ============================================================================

//! ## Overview
//! Each test drives one canonical scenario through a real run: the policy
//! layers merge, validators execute, the gate decides, and the trace
//! records the attempt exactly as a hosting executor would observe it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use failcore_core::CostEstimate;
use failcore_core::CostUsage;
use failcore_core::EgressReport;
use failcore_core::RunConfig;
use failcore_core::StepRequest;
use failcore_core::core::DecisionDomain;
use failcore_core::core::ErrorCode;
use failcore_core::core::EventType;
use failcore_core::core::Verdict;
use serde_json::json;

use crate::helpers;

// ============================================================================
// SECTION: Request Builder
// ============================================================================

/// Builds a step request with the suite's defaults.
fn request(step: &str, tool: &str, params: failcore_core::core::Params) -> StepRequest {
    StepRequest {
        step_id: step.into(),
        tool: tool.into(),
        params,
        dependencies: Vec::new(),
        estimate: None,
        override_token: None,
        now: helpers::ts(1_000),
    }
}

// ============================================================================
// SECTION: Scenarios
// ============================================================================

/// Scenario: path traversal is blocked and the file is never written.
#[test]
fn test_path_traversal_blocked() {
    let (run, trace) = helpers::start_run(
        &helpers::fs_safe_policy(),
        RunConfig::new("run-traversal", "sess-1"),
    );
    let mut params = helpers::params_one("path", json!("../../etc/passwd"));
    params.insert("content".to_string(), json!("x"));

    let outcome = run.preflight(request("step-1", "write_file", params));
    assert!(outcome.is_blocked());
    assert_eq!(outcome.verdict.code, ErrorCode::PathTraversal);
    let blocking = outcome
        .decisions
        .iter()
        .find(|decision| decision.code == ErrorCode::PathTraversal)
        .unwrap();
    assert!(blocking.suggestion.is_some());

    let report = run.finish(helpers::ts(2_000));
    assert_eq!(report.stats.blocked, 1);

    let envelopes = trace.envelopes();
    let attempt = envelopes
        .iter()
        .find(|envelope| envelope.event_type == EventType::Attempt)
        .unwrap();
    assert_eq!(attempt.data["verdict"]["decision"], json!("BLOCK"));
    assert!(
        envelopes.iter().any(|envelope| envelope.event_type == EventType::PolicyDenied),
        "a blocked step must record a terminal POLICY_DENIED event"
    );
}

/// Scenario: SSRF against the cloud metadata endpoint is blocked.
#[test]
fn test_ssrf_metadata_blocked() {
    let (run, _trace) =
        helpers::start_run(&helpers::net_safe_policy(), RunConfig::new("run-ssrf", "sess-1"));
    let outcome = run.preflight(request(
        "step-1",
        "fetch_url",
        helpers::params_one("url", json!("http://169.254.169.254/latest/meta-data/")),
    ));
    assert!(outcome.is_blocked());
    assert_eq!(outcome.verdict.code, ErrorCode::PrivateNetworkBlocked);
    assert_eq!(outcome.verdict.domain, DecisionDomain::Security);
    let _ = run.finish(helpers::ts(2_000));
}

/// Scenario: DLP sanitises while preserving usability.
#[test]
fn test_dlp_sanitize_preserves_usability() {
    let (run, _trace) = helpers::start_run(
        &helpers::dlp_sanitize_policy(),
        RunConfig::new("run-dlp", "sess-1"),
    );
    let mut params = helpers::params_one("to", json!("user@example.com"));
    params.insert("body".to_string(), json!("API_KEY=sk-live-abcdef1234567890xyz"));

    let outcome = run.preflight(request("step-1", "send_email", params));
    assert_eq!(outcome.verdict.decision, Verdict::Sanitize);

    let sanitized = outcome.sanitized_params.unwrap();
    assert_eq!(sanitized["body"], json!("API_KEY=sk-****…7890xyz"));
    assert_eq!(sanitized["to"], json!("user@example.com"));
    let _ = run.finish(helpers::ts(2_000));
}

/// Scenario: the second call exhausts the budget and is blocked preflight.
#[test]
fn test_budget_exhaustion() {
    let mut config = RunConfig::new("run-budget", "sess-1");
    config.budget.max_cost_usd = Some(0.01);
    let (run, trace) = helpers::start_run(&failcore_core::Policy::named("budget_only"), config);

    let estimate = CostEstimate {
        cost_usd: 0.006,
        tokens: 120,
        estimated: false,
    };
    let mut first = request("step-1", "call_model", helpers::params_one("prompt", json!("hi")));
    first.estimate = Some(estimate);
    let outcome = run.preflight(first);
    assert!(!outcome.is_blocked());

    run.record_egress(EgressReport {
        step_id: "step-1".into(),
        tool: "call_model".into(),
        status: "ok".to_string(),
        result: json!({"usage": {"input_tokens": 60, "output_tokens": 60}}),
        effects: Vec::new(),
        usage: Some(CostUsage {
            cost_usd: 0.006,
            input_tokens: 60,
            output_tokens: 60,
            total_tokens: 120,
            api_calls: 1,
        }),
        duration_ms: Some(80),
        now: helpers::ts(1_500),
    });

    let mut second = request("step-2", "call_model", helpers::params_one("prompt", json!("more")));
    second.estimate = Some(estimate);
    second.now = helpers::ts(2_000);
    let outcome = run.preflight(second);
    assert!(outcome.is_blocked());
    assert_eq!(outcome.verdict.code, ErrorCode::EconomicBudgetExceeded);
    assert_eq!(outcome.verdict.domain, DecisionDomain::Cost);

    let report = run.finish(helpers::ts(3_000));
    assert_eq!(report.stats.blocked, 1);
    assert_eq!(report.stats.attempts, 2);
    let envelopes = trace.envelopes();
    let attempts =
        envelopes.iter().filter(|envelope| envelope.event_type == EventType::Attempt).count();
    assert_eq!(attempts, 2, "the blocked attempt must still be recorded");
}

/// Scenario: security and semantic both flag `rm -rf /`; security wins.
#[test]
fn test_dedup_across_validators() {
    let (run, _trace) =
        helpers::start_run(&helpers::command_policy(), RunConfig::new("run-dedup", "sess-1"));
    let outcome = run.preflight(request(
        "step-1",
        "run_shell",
        helpers::params_one("command", json!("rm -rf /")),
    ));
    assert!(outcome.is_blocked());
    assert_eq!(outcome.verdict.domain, DecisionDomain::Security);

    let suppressed = outcome
        .decisions
        .iter()
        .find(|decision| decision.domain == DecisionDomain::Semantic && decision.is_suppressed())
        .unwrap();
    assert_eq!(suppressed.suppressed_by.as_deref(), Some("POLICY_DENIED"));
    assert_eq!(
        suppressed.suppression_reason.as_deref(),
        Some("duplicate_domain_lower_priority")
    );
    let _ = run.finish(helpers::ts(2_000));
}

/// Scenario: a mid-run path switch is flagged as drift at the inflection.
#[test]
fn test_drift_inflection() {
    let (run, trace) =
        helpers::start_run(&helpers::drift_policy(), RunConfig::new("run-drift", "sess-1"));
    for step in 1..=10u32 {
        let path = if step < 7 {
            format!("./data/app{step}.log")
        } else {
            format!("/etc/app{step}.conf")
        };
        let mut req = request(
            &format!("step-{step}"),
            "file_write",
            helpers::params_one("path", json!(path)),
        );
        req.now = helpers::ts(i64::from(step) * 100);
        // Absolute paths are policy-clean here: only drift is enabled.
        let outcome = run.preflight(req);
        assert!(!outcome.is_blocked());
    }

    let report = run.finish(helpers::ts(10_000));
    assert_eq!(report.drift.len(), 1, "only the inflection step should warn");
    let decision = &report.drift[0];
    assert_eq!(decision.decision, Verdict::Warn);
    assert_eq!(decision.evidence.get("step_id"), Some(&json!("step-7")));
    assert_eq!(decision.evidence.get("strategy"), Some(&json!("median")));
    let changes = decision.evidence.get("changes").unwrap().as_array().unwrap();
    assert_eq!(changes[0]["reason"], json!("path_changed"));

    let envelopes = trace.envelopes();
    assert!(
        envelopes.iter().any(|envelope| envelope.event_type == EventType::ContractDrift),
        "drift decisions must be recorded in the trace"
    );
}
