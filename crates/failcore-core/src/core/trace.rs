// crates/failcore-core/src/core/trace.rs
// ============================================================================
// Module: Failcore Trace Protocol
// Description: Canonical trace envelope and event payload shapes.
// Purpose: Provide the wire-stable, append-only JSONL event model.
// Dependencies: crate::core::{decision, identifiers, summary, time}, serde
// ============================================================================

//! ## Overview
//! Every run produces an append-only JSONL sequence of `TraceEnvelope`
//! lines. The event set is closed; `seq` is strictly increasing per run;
//! every executed step has exactly one ATTEMPT and at most one EGRESS.
//! `event.data` is an extension point that may grow without a schema
//! version bump; all other envelope fields are strict.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::decision::DecisionDomain;
use crate::core::decision::DecisionV1;
use crate::core::decision::ErrorCode;
use crate::core::decision::Evidence;
use crate::core::decision::RiskLevel;
use crate::core::decision::Verdict;
use crate::core::identifiers::PolicyName;
use crate::core::identifiers::RunId;
use crate::core::identifiers::StepId;
use crate::core::identifiers::ToolName;
use crate::core::summary::ParamsSummary;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Wire-stable trace schema version.
pub const SCHEMA_VERSION: &str = "failcore.trace.v0.2.0";

// ============================================================================
// SECTION: Event Types
// ============================================================================

/// Closed set of trace event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Run lifecycle start.
    RunStart,
    /// Pre-execution attempt with the gate verdict inline.
    Attempt,
    /// Post-execution evidence from enrichers.
    Egress,
    /// Run lifecycle end.
    RunEnd,
    /// Authoritative replay fingerprint for a step.
    FingerprintComputed,
    /// Replay cache hit.
    ReplayHit,
    /// Replay cache miss.
    ReplayMiss,
    /// Tool contract drift detected.
    ContractDrift,
    /// Terminal policy denial.
    PolicyDenied,
    /// Step exceeded its hard timeout.
    StepTimeout,
    /// Requested timeout clamped to a limit.
    TimeoutClamped,
    /// Artifact written by the executor.
    ArtifactWritten,
    /// Observed side effect applied.
    SideEffectApplied,
}

// ============================================================================
// SECTION: Run Status
// ============================================================================

/// Aggregate run outcome recorded at RUN_END.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Every attempted step was allowed and executed.
    Success,
    /// Some steps succeeded while others were blocked or failed.
    Partial,
    /// The run terminated on a blocking verdict.
    Blocked,
    /// The run terminated on an internal failure.
    Failed,
    /// The run was cancelled by the host.
    Cancelled,
}

// ============================================================================
// SECTION: Run Stats
// ============================================================================

/// Aggregate counters recorded at RUN_END.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// Total attempts recorded.
    pub attempts: u64,
    /// Attempts resolved ALLOW.
    pub allowed: u64,
    /// Attempts resolved WARN.
    pub warned: u64,
    /// Attempts resolved SANITIZE.
    pub sanitized: u64,
    /// Attempts resolved BLOCK.
    pub blocked: u64,
    /// Decisions suppressed by deduplication.
    pub suppressed_decisions: u64,
    /// EGRESS events recorded.
    pub egress_events: u64,
    /// Events dropped under sink backpressure.
    pub dropped_events: u64,
    /// Evidence payloads dropped under sink backpressure.
    pub dropped_evidence: u64,
    /// Cumulative cost in USD.
    pub cost_usd: f64,
    /// Cumulative token count.
    pub total_tokens: u64,
    /// Cumulative API call count.
    pub api_calls: u64,
}

// ============================================================================
// SECTION: Verdict Summary
// ============================================================================

/// Aggregated verdict attached inline to an ATTEMPT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictSummary {
    /// Final action class for the step.
    pub decision: Verdict,
    /// Code of the strongest surviving decision.
    pub code: ErrorCode,
    /// Risk level of the strongest surviving decision.
    pub risk_level: RiskLevel,
    /// Domain of the strongest surviving decision.
    pub domain: DecisionDomain,
    /// Evidence of the strongest surviving decision.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub evidence: Evidence,
}

// ============================================================================
// SECTION: Event Payloads
// ============================================================================

/// RUN_START payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStartData {
    /// Name of the merged policy in effect.
    pub policy_name: PolicyName,
    /// Canonical hash of the merged policy.
    pub policy_hash: String,
    /// Host-supplied start time.
    pub started_at: Timestamp,
}

/// ATTEMPT payload carrying the verdict inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptData {
    /// Tool under evaluation.
    pub tool: ToolName,
    /// Redacted parameter skeleton.
    pub params_summary: ParamsSummary,
    /// Aggregated gate verdict.
    pub verdict: VerdictSummary,
    /// Full deduplicated decision list, suppressed entries included.
    pub decisions: Vec<DecisionV1>,
}

/// EGRESS payload carrying enricher evidence only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EgressData {
    /// Execution status reported by the executor.
    pub status: String,
    /// Enricher evidence keyed by enricher name, in deterministic order.
    pub evidence: BTreeMap<String, Value>,
}

/// RUN_END payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEndData {
    /// Aggregate run outcome.
    pub status: RunStatus,
    /// Aggregate counters for the run.
    pub stats: RunStats,
}

/// FINGERPRINT_COMPUTED payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintData {
    /// Canonical fingerprint for the step.
    pub fingerprint: crate::replay::Fingerprint,
}

/// REPLAY_HIT payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayHitData {
    /// Fingerprint hash that matched.
    pub hit_key: String,
    /// Cache tier that served the hit.
    pub cache_source: String,
    /// Tokens saved by replay, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_tokens: Option<u64>,
    /// Milliseconds saved by replay, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_ms: Option<u64>,
}

/// REPLAY_MISS payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayMissData {
    /// Fingerprint hash that missed.
    pub miss_key: String,
}

/// POLICY_DENIED payload; terminal for the step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDeniedData {
    /// Denial code.
    pub code: ErrorCode,
    /// Denial category label.
    pub category: String,
    /// Optional category detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_detail: Option<String>,
}

// ============================================================================
// SECTION: Trace Envelope
// ============================================================================

/// One line of the append-only JSONL trace.
///
/// # Invariants
/// - `seq` is strictly increasing per run and assigned at enqueue time.
/// - `data` is an extension point; every other field is strict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TraceEnvelope {
    /// Trace schema version.
    pub schema_version: String,
    /// Run this event belongs to.
    pub run_id: RunId,
    /// Event type discriminant.
    pub event_type: EventType,
    /// Monotonic per-run sequence number.
    pub seq: u64,
    /// Host-supplied event timestamp.
    pub ts: Timestamp,
    /// Step association, when the event is step-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<StepId>,
    /// Event payload; extension point.
    pub data: Value,
}

impl TraceEnvelope {
    /// Creates an envelope with the current schema version.
    #[must_use]
    pub fn new(
        run_id: RunId,
        event_type: EventType,
        seq: u64,
        ts: Timestamp,
        step: Option<StepId>,
        data: Value,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id,
            event_type,
            seq,
            ts,
            step,
            data,
        }
    }

    /// Returns `true` when the sink must never drop this event.
    ///
    /// RUN_START, RUN_END, and blocking ATTEMPTs are always retained.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        match self.event_type {
            EventType::RunStart | EventType::RunEnd => true,
            EventType::Attempt => {
                self.data
                    .get("verdict")
                    .and_then(|verdict| verdict.get("decision"))
                    .and_then(Value::as_str)
                    == Some("BLOCK")
            }
            _ => false,
        }
    }

    /// Strips evidence payloads in place, recording that they were dropped.
    ///
    /// Returns `true` when any evidence subtree was removed.
    pub fn strip_evidence(&mut self) -> bool {
        let mut stripped = false;
        if let Some(decisions) = self.data.get_mut("decisions").and_then(Value::as_array_mut) {
            for decision in decisions {
                if let Some(map) = decision.as_object_mut()
                    && map.remove("evidence").is_some()
                {
                    stripped = true;
                }
            }
        }
        if let Some(map) = self.data.as_object_mut() {
            if map.remove("evidence").is_some() {
                stripped = true;
            }
            if stripped {
                map.insert("evidence_dropped".to_string(), Value::Bool(true));
            }
        }
        stripped
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
