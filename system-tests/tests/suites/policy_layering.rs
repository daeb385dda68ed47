// system-tests/tests/suites/policy_layering.rs
// ============================================================================
// Module: Policy Layering Scenarios
// Description: Disk-loaded policy layers driving real runs.
// Purpose: Verify shadow observation and audited breakglass weakening.
// Dependencies: helpers, failcore-config, failcore-core, serde_json, tempfile
// ============================================================================

//! ## Overview
//! These tests write policy documents to a temporary directory, load them
//! through the config crate, and drive runs to confirm shadow decisions
//! stay observation-only and breakglass weakening is always audited.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;

use failcore_config::FailcoreConfig;
use failcore_config::load_policy_dir;
use failcore_core::RunConfig;
use failcore_core::RunCtx;
use failcore_core::StepRequest;
use failcore_core::Timestamp;
use failcore_core::core::DecisionDomain;
use failcore_core::core::Verdict;
use serde_json::json;

use crate::helpers;

// ============================================================================
// SECTION: Documents
// ============================================================================

/// Active layer document used across the suite.
const ACTIVE_DOC: &str = r"
version: v1
validators:
  command_security:
    enabled: true
    enforcement: BLOCK
    domain: security
    priority: 10
override:
  enabled: false
metadata:
  name: cmd_safe
";

/// Shadow layer switching command security to observation.
const SHADOW_DOC: &str = r"
version: v1
validators:
  command_security:
    enforcement: SHADOW
    domain: security
metadata:
  name: cmd_shadow
";

/// Breakglass layer weakening command security for an incident.
const BREAKGLASS_DOC: &str = r"
version: v1
activation:
  enabled_at: 0
  enabled_by: oncall
  reason: incident 4821
  expires_at: 3600000
  token_used: false
validators:
  command_security:
    enforcement: WARN
    domain: security
metadata:
  name: cmd_breakglass
";

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Runs `rm -rf /` under layers loaded from a policy directory.
fn run_with_layers(shadow: bool, breakglass: bool) -> (failcore_core::PreflightOutcome, failcore_core::RunReport) {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("active.yaml"), ACTIVE_DOC).unwrap();
    if shadow {
        fs::write(dir.path().join("shadow.yaml"), SHADOW_DOC).unwrap();
    }
    if breakglass {
        fs::write(dir.path().join("breakglass.yaml"), BREAKGLASS_DOC).unwrap();
    }
    let layers = load_policy_dir(dir.path()).unwrap();

    let registry = std::sync::Arc::new(failcore_core::RulesRegistry::load_builtin().unwrap());
    let trace = helpers::SharedTrace::default();
    let run = RunCtx::start(
        &layers.active,
        layers.shadow.as_ref(),
        layers.breakglass.as_ref(),
        &registry,
        RunConfig::new("run-layers", "sess-1"),
        trace,
        Timestamp::from_unix_millis(0),
    )
    .unwrap();

    let outcome = run.preflight(StepRequest {
        step_id: "step-1".into(),
        tool: "run_shell".into(),
        params: helpers::params_one("command", json!("rm -rf /")),
        dependencies: Vec::new(),
        estimate: None,
        override_token: None,
        now: helpers::ts(1_000),
    });
    let report = run.finish(helpers::ts(2_000));
    (outcome, report)
}

// ============================================================================
// SECTION: Scenarios
// ============================================================================

/// Tests the active layer alone blocks the destructive command.
#[test]
fn test_active_blocks() {
    let (outcome, report) = run_with_layers(false, false);
    assert!(outcome.is_blocked());
    assert_eq!(report.stats.blocked, 1);
    assert!(report.audit.is_empty());
}

/// Tests shadow decisions are recorded but never drive the verdict.
#[test]
fn test_shadow_observes_without_blocking() {
    let (outcome, _report) = run_with_layers(true, false);
    assert_eq!(outcome.verdict.decision, Verdict::Allow);
    let shadowed = outcome
        .decisions
        .iter()
        .find(|decision| decision.domain == DecisionDomain::Security)
        .unwrap();
    assert!(shadowed.is_shadow(), "the security decision must carry the shadow tag");
}

/// Tests breakglass weakening downgrades the verdict and leaves an audit
/// record with a non-empty reason.
#[test]
fn test_breakglass_weakens_with_audit() {
    let (outcome, report) = run_with_layers(false, true);
    assert_eq!(outcome.verdict.decision, Verdict::Warn);
    assert_eq!(report.audit.len(), 1);
    let audit = &report.audit[0];
    assert_eq!(audit.reason, "incident 4821");
    assert!(audit.expires_at > Timestamp::from_unix_millis(1_000));
    assert!(audit.affected_decisions.contains(&"POLICY_DENIED".to_string()));
}

/// Tests the runtime config file shapes budgets and sink settings.
#[test]
fn test_runtime_config_round() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("failcore.toml");
    fs::write(&path, "[cost]\nmax_cost_usd = 0.25\n\n[sink]\nqueue_size = 64\n").unwrap();
    let config = FailcoreConfig::load(Some(&path)).unwrap();
    assert_eq!(config.budget().max_cost_usd, Some(0.25));
    assert_eq!(config.sink_config().queue_size, 64);
    // Absent files fall back to code defaults.
    let missing = FailcoreConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(missing.sink_config().queue_size, 1024);
}
