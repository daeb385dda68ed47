// system-tests/tests/suites/trace_protocol.rs
// ============================================================================
// Module: Trace Protocol Conformance
// Description: Envelope ordering, shapes, and determinism over real runs.
// Purpose: Pin the wire-level trace contract.
// Dependencies: helpers, failcore-core, serde_json
// ============================================================================

//! ## Overview
//! These tests capture whole traces in memory and assert the protocol
//! invariants: RUN_START opens, RUN_END closes, `seq` strictly increases,
//! fingerprints precede their attempts, attempts carry the verdict inline,
//! EGRESS carries enricher evidence only, and identical runs produce
//! byte-identical decision lists.

// ============================================================================
// SECTION: Imports
// ============================================================================

use failcore_core::EgressReport;
use failcore_core::RunConfig;
use failcore_core::StepRequest;
use failcore_core::core::EventType;
use failcore_core::core::SCHEMA_VERSION;
use failcore_core::core::TraceEnvelope;
use serde_json::json;

use crate::helpers;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Runs one blocked traversal step and returns the captured trace.
fn blocked_run(run_id: &str) -> Vec<TraceEnvelope> {
    let (run, trace) =
        helpers::start_run(&helpers::fs_safe_policy(), RunConfig::new(run_id, "sess-1"));
    let outcome = run.preflight(StepRequest {
        step_id: "step-1".into(),
        tool: "write_file".into(),
        params: helpers::params_one("path", json!("../../etc/passwd")),
        dependencies: Vec::new(),
        estimate: None,
        override_token: None,
        now: helpers::ts(1_000),
    });
    assert!(outcome.is_blocked());
    let _ = run.finish(helpers::ts(2_000));
    trace.envelopes()
}

// ============================================================================
// SECTION: Ordering
// ============================================================================

/// Tests the lifecycle framing and sequence ordering of a trace.
#[test]
fn test_lifecycle_framing() {
    let envelopes = blocked_run("run-frame");
    assert_eq!(envelopes.first().map(|e| e.event_type), Some(EventType::RunStart));
    assert_eq!(envelopes.last().map(|e| e.event_type), Some(EventType::RunEnd));
    for envelope in &envelopes {
        assert_eq!(envelope.schema_version, SCHEMA_VERSION);
    }
    // Strict parsing in the helper already verified seq monotonicity.
    let fingerprint_seq = envelopes
        .iter()
        .find(|e| e.event_type == EventType::FingerprintComputed)
        .map(|e| e.seq)
        .unwrap();
    let attempt_seq = envelopes
        .iter()
        .find(|e| e.event_type == EventType::Attempt)
        .map(|e| e.seq)
        .unwrap();
    assert!(
        fingerprint_seq < attempt_seq,
        "the fingerprint must precede the attempt it keys"
    );
}

/// Tests RUN_END carries the aggregate status and counters.
#[test]
fn test_run_end_stats() {
    let envelopes = blocked_run("run-stats");
    let end = envelopes.last().unwrap();
    assert_eq!(end.data["status"], json!("BLOCKED"));
    assert_eq!(end.data["stats"]["attempts"], json!(1));
    assert_eq!(end.data["stats"]["blocked"], json!(1));
}

// ============================================================================
// SECTION: Event Shapes
// ============================================================================

/// Tests ATTEMPT carries the verdict inline plus the full decision list.
#[test]
fn test_attempt_shape() {
    let envelopes = blocked_run("run-attempt");
    let attempt =
        envelopes.iter().find(|e| e.event_type == EventType::Attempt).unwrap();
    assert_eq!(attempt.data["verdict"]["decision"], json!("BLOCK"));
    assert_eq!(attempt.data["verdict"]["code"], json!("PATH_TRAVERSAL"));
    assert!(attempt.data["decisions"].is_array());
    assert!(attempt.data["params_summary"]["path"]["hash"].is_string());
    // Raw parameter values never appear in the attempt.
    assert!(!attempt.data.to_string().contains("etc/passwd"));
}

/// Tests EGRESS carries enricher evidence and no verdict.
#[test]
fn test_egress_shape() {
    let (run, trace) = helpers::start_run(
        &helpers::fs_safe_policy(),
        RunConfig::new("run-egress", "sess-1"),
    );
    let outcome = run.preflight(StepRequest {
        step_id: "step-1".into(),
        tool: "read_file".into(),
        params: helpers::params_one("path", json!("notes/today.md")),
        dependencies: Vec::new(),
        estimate: None,
        override_token: None,
        now: helpers::ts(1_000),
    });
    assert!(!outcome.is_blocked());
    run.record_egress(EgressReport {
        step_id: "step-1".into(),
        tool: "read_file".into(),
        status: "ok".to_string(),
        result: json!({"content": "plain notes", "usage": {"input_tokens": 3, "output_tokens": 9}}),
        effects: Vec::new(),
        usage: None,
        duration_ms: Some(12),
        now: helpers::ts(1_500),
    });
    let _ = run.finish(helpers::ts(2_000));

    let envelopes = trace.envelopes();
    let egress = envelopes.iter().find(|e| e.event_type == EventType::Egress).unwrap();
    assert_eq!(egress.data["status"], json!("ok"));
    assert!(egress.data["evidence"].is_object());
    assert!(egress.data.get("verdict").is_none(), "enrichers never produce verdicts");
    assert!(egress.data["evidence"]["usage"]["usage"]["total_tokens"].is_number());
}

// ============================================================================
// SECTION: Determinism
// ============================================================================

/// Tests identical runs produce byte-identical attempt payloads.
#[test]
fn test_cross_run_determinism() {
    let first = blocked_run("run-det");
    let second = blocked_run("run-det");
    let attempt_a = first.iter().find(|e| e.event_type == EventType::Attempt).unwrap();
    let attempt_b = second.iter().find(|e| e.event_type == EventType::Attempt).unwrap();
    assert_eq!(
        serde_json::to_string(&attempt_a.data).unwrap(),
        serde_json::to_string(&attempt_b.data).unwrap()
    );
}
