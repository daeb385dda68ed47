// crates/failcore-core/src/run/mod.rs
// ============================================================================
// Module: Failcore Run Lifecycle
// Description: Binds a logical run to policy, registry, services, and sink.
// Purpose: Provide the RunCtx the hosting executor drives steps through.
// Dependencies: crate::{cache, core, cost, engine, enrich, policy, registry,
// replay, sink, taint, validators}, serde_json
// ============================================================================

//! ## Overview
//! A run owns its merged policy, registry snapshot, taint context, scan
//! cache, cost guardian, and trace sink. Everything is created at RUN_START
//! and torn down at RUN_END regardless of outcome; no mutable state crosses
//! runs. The hosting executor calls `preflight` before each tool call,
//! respects the verdict (a BLOCK is terminal for the step), substitutes
//! sanitised parameters on SANITIZE, and reports results through
//! `record_egress`. Cancellation propagates through a cooperative token.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::cache::ScanCache;
use crate::core::context::ContextMetadata;
use crate::core::context::ContextV1;
use crate::core::context::Params;
use crate::core::context::StateMap;
use crate::core::decision::DecisionDomain;
use crate::core::decision::DecisionV1;
use crate::core::decision::RiskLevel;
use crate::core::decision::Verdict;
use crate::core::effects::EffectEvent;
use crate::core::hashing::CanonicalJsonError;
use crate::core::identifiers::RunId;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::StepId;
use crate::core::identifiers::ToolName;
use crate::core::identifiers::ValidatorId;
use crate::core::summary::ParamsSummary;
use crate::core::taint::Sensitivity;
use crate::core::taint::TaintSource;
use crate::core::taint::TaintTag;
use crate::core::time::Timestamp;
use crate::core::trace::AttemptData;
use crate::core::trace::EgressData;
use crate::core::trace::EventType;
use crate::core::trace::PolicyDeniedData;
use crate::core::trace::RunEndData;
use crate::core::trace::RunStartData;
use crate::core::trace::RunStats;
use crate::core::trace::RunStatus;
use crate::core::trace::VerdictSummary;
use crate::cost::CostAlert;
use crate::cost::CostEstimate;
use crate::cost::CostUsage;
use crate::cost::guardian::CostGuardian;
use crate::engine::CancellationToken;
use crate::engine::EngineError;
use crate::engine::ValidationEngine;
use crate::engine::explain::ExplainReport;
use crate::engine::gate::Gate;
use crate::enrich::EgressInput;
use crate::enrich::Enricher;
use crate::enrich::default_enrichers;
use crate::enrich::run_enrichers;
use crate::policy::BreakglassAuditEntry;
use crate::policy::BreakglassPolicy;
use crate::policy::Policy;
use crate::policy::PolicyError;
use crate::policy::merge_policy;
use crate::registry::RulesRegistry;
use crate::replay::compute_fingerprint;
use crate::sink::SinkConfig;
use crate::sink::SinkTarget;
use crate::sink::TraceWriter;
use crate::taint::TaintContext;
use crate::validators::ID_DRIFT;
use crate::validators::drift::DriftAnalyzer;
use crate::validators::drift::StepParamsRecord;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Control-plane errors that refuse run startup.
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    /// Policy layers failed to merge.
    #[error(transparent)]
    Policy(#[from] PolicyError),
    /// The engine could not resolve every policy slot.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// Canonical hashing failed.
    #[error(transparent)]
    Hashing(#[from] CanonicalJsonError),
}

// ============================================================================
// SECTION: Run Configuration
// ============================================================================

/// Host-supplied configuration for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Run identifier.
    pub run_id: RunId,
    /// Session identifier.
    pub session_id: SessionId,
    /// Cost budget enforced by the guardian.
    pub budget: crate::cost::Budget,
    /// Sink tuning.
    pub sink: SinkConfig,
    /// Tools whose outputs are taint sources, with their sensitivity.
    pub taint_sources: BTreeMap<String, Sensitivity>,
}

impl RunConfig {
    /// Creates a configuration with defaults for the given identifiers.
    #[must_use]
    pub fn new(run_id: impl Into<RunId>, session_id: impl Into<SessionId>) -> Self {
        Self {
            run_id: run_id.into(),
            session_id: session_id.into(),
            budget: crate::cost::Budget::default(),
            sink: SinkConfig::default(),
            taint_sources: BTreeMap::new(),
        }
    }
}

// ============================================================================
// SECTION: Step Request / Outcomes
// ============================================================================

/// One candidate tool call submitted to the preflight gate.
#[derive(Debug, Clone)]
pub struct StepRequest {
    /// Step identifier.
    pub step_id: StepId,
    /// Tool to invoke.
    pub tool: ToolName,
    /// Call parameters.
    pub params: Params,
    /// Steps whose outputs feed this call.
    pub dependencies: Vec<StepId>,
    /// Pre-execution cost estimate, when the host has one.
    pub estimate: Option<CostEstimate>,
    /// Override token presented by the caller.
    pub override_token: Option<String>,
    /// Host-supplied UTC timestamp.
    pub now: Timestamp,
}

/// Result of one preflight evaluation.
#[derive(Debug, Clone)]
pub struct PreflightOutcome {
    /// Step this outcome belongs to.
    pub step_id: StepId,
    /// Trace sequence number of the ATTEMPT.
    pub seq: u64,
    /// Aggregated gate verdict.
    pub verdict: VerdictSummary,
    /// Full deduplicated decision list.
    pub decisions: Vec<DecisionV1>,
    /// Redacted parameters to substitute on SANITIZE.
    pub sanitized_params: Option<Params>,
}

impl PreflightOutcome {
    /// Returns `true` when the executor must not invoke the tool.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.verdict.decision == Verdict::Block
    }

    /// Builds the explain report for this attempt.
    #[must_use]
    pub fn explain(&self, audit: Vec<BreakglassAuditEntry>) -> ExplainReport {
        ExplainReport::new(self.verdict.clone(), self.decisions.clone(), audit)
    }
}

/// One executed step reported back to the runtime.
#[derive(Debug, Clone)]
pub struct EgressReport {
    /// Step that executed.
    pub step_id: StepId,
    /// Tool that executed.
    pub tool: ToolName,
    /// Executor-reported status (`ok`, `error`, ...).
    pub status: String,
    /// Observed output.
    pub result: Value,
    /// Observed side effects.
    pub effects: Vec<EffectEvent>,
    /// Usage, when the host already extracted it.
    pub usage: Option<CostUsage>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: Option<u64>,
    /// Host-supplied UTC timestamp.
    pub now: Timestamp,
}

/// Final report returned at RUN_END.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Aggregate run outcome.
    pub status: RunStatus,
    /// Aggregate counters.
    pub stats: RunStats,
    /// Breakglass audit entries accumulated across the run.
    pub audit: Vec<BreakglassAuditEntry>,
    /// Post-run drift decisions.
    pub drift: Vec<DecisionV1>,
    /// Cost alerts raised across the run.
    pub alerts: Vec<CostAlert>,
}

// ============================================================================
// SECTION: Mutable Run State
// ============================================================================

/// Counters and histories accumulated across a run.
#[derive(Debug, Default)]
struct RunState {
    /// Verdict counters.
    stats: RunStats,
    /// Breakglass audit entries.
    audit: Vec<BreakglassAuditEntry>,
    /// Observed parameter history for drift.
    history: Vec<StepParamsRecord>,
    /// Cost alerts raised so far.
    alerts: Vec<CostAlert>,
}

// ============================================================================
// SECTION: Run
// ============================================================================

/// A live run context driven by the hosting executor.
pub struct RunCtx {
    /// Host configuration.
    config: RunConfig,
    /// Validation engine over the merged policy.
    engine: ValidationEngine,
    /// Content hash of the registry snapshot, bound into replay keys.
    registry_hash: String,
    /// Preflight gate instance.
    preflight_gate: Gate,
    /// Run-scoped taint context.
    taint: Arc<TaintContext>,
    /// Run-scoped scan cache.
    scan_cache: Arc<ScanCache>,
    /// Cost guardian.
    guardian: CostGuardian,
    /// Trace writer; taken at finish.
    writer: Option<TraceWriter>,
    /// Cooperative cancellation token.
    cancel: CancellationToken,
    /// Enricher set bound to EGRESS.
    enrichers: Vec<Box<dyn Enricher>>,
    /// Post-run drift analyser, when policy enables it.
    drift: Option<DriftAnalyzer>,
    /// Accumulated counters and histories.
    state: Mutex<RunState>,
}

impl RunCtx {
    /// Starts a run: merges policy, snapshots the registry, creates the
    /// run-scoped services, opens the sink, and emits RUN_START.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError`] when the policy layers or the engine
    /// fail to build; nothing is written in that case.
    pub fn start<W: SinkTarget + 'static>(
        active: &Policy,
        shadow: Option<&Policy>,
        breakglass: Option<&BreakglassPolicy>,
        registry: &Arc<RulesRegistry>,
        config: RunConfig,
        target: W,
        started_at: Timestamp,
    ) -> Result<Self, ControlPlaneError> {
        let merged = merge_policy(active, shadow, breakglass)?;
        let drift = merged.validators.get(&ValidatorId::new(ID_DRIFT)).and_then(|effective| {
            effective
                .config
                .enabled
                .then(|| DriftAnalyzer::from_settings(&effective.config.config))
        });
        let engine = ValidationEngine::new(merged, registry);
        engine.finish_build()?;

        let writer = TraceWriter::open(config.run_id.clone(), target, config.sink);
        let start = RunStartData {
            policy_name: engine.policy().name.clone(),
            policy_hash: engine.policy().policy_hash.clone(),
            started_at,
        };
        let _ = writer.emit(
            EventType::RunStart,
            started_at,
            None,
            serde_json::to_value(&start).unwrap_or_else(|_| json!({})),
        );

        Ok(Self {
            guardian: CostGuardian::new(config.budget),
            config,
            engine,
            registry_hash: registry.content_hash().to_string(),
            preflight_gate: Gate::preflight(),
            taint: Arc::new(TaintContext::new()),
            scan_cache: Arc::new(ScanCache::new()),
            writer: Some(writer),
            cancel: CancellationToken::new(),
            enrichers: default_enrichers(registry),
            drift,
            state: Mutex::new(RunState::default()),
        })
    }

    /// Returns the cancellation token for this run.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Registers a third-party validator plug-in.
    pub fn register_plugin(&mut self, validator: Box<dyn crate::validators::Validator>) {
        self.engine.register_plugin(validator);
    }

    /// Evaluates one candidate call and records its ATTEMPT.
    ///
    /// On a BLOCK verdict the executor must not invoke the tool; on
    /// SANITIZE it must substitute [`PreflightOutcome::sanitized_params`].
    #[must_use]
    pub fn preflight(&self, request: StepRequest) -> PreflightOutcome {
        let _ = self.taint.detect_tainted_inputs(
            &request.step_id,
            &request.params,
            &request.dependencies,
        );

        let mut ctx = ContextV1::new(
            request.tool.clone(),
            request.params.clone(),
            request.step_id.clone(),
            self.config.run_id.clone(),
            self.config.session_id.clone(),
        );
        ctx.metadata = ContextMetadata {
            timestamp: Some(request.now),
            override_token: request.override_token.clone(),
        };
        ctx.state = StateMap::new(Some(Arc::clone(&self.taint)), Some(Arc::clone(&self.scan_cache)));

        let mut outcome = self.engine.run(&ctx, &self.cancel);

        if let Some(estimate) = &request.estimate {
            let check = self.guardian.check_operation(estimate, request.now);
            if !check.allowed
                && let Some(code) = check.error_code
            {
                let mut decision = DecisionV1::new(
                    ValidatorId::new("cost_guardian"),
                    code,
                    Verdict::Block,
                    RiskLevel::High,
                    DecisionDomain::Cost,
                    check.reason.unwrap_or_else(|| "budget exhausted".to_string()),
                );
                decision
                    .evidence
                    .insert("estimated".to_string(), json!(estimate.estimated));
                outcome.decisions.push(decision);
            }
        }

        let verdict = self.preflight_gate.resolve(&outcome.decisions);

        let fingerprint = compute_fingerprint(
            &request.tool,
            &request.params,
            Some(&self.engine.policy().policy_hash),
            Some(&self.registry_hash),
        );
        if let (Some(writer), Ok(fingerprint)) = (&self.writer, fingerprint) {
            let _ = writer.emit(
                EventType::FingerprintComputed,
                request.now,
                Some(request.step_id.clone()),
                json!({"fingerprint": fingerprint}),
            );
        }

        let attempt = AttemptData {
            tool: request.tool.clone(),
            params_summary: ParamsSummary::from_params(&request.params),
            verdict: verdict.clone(),
            decisions: outcome.decisions.clone(),
        };
        let seq = self.writer.as_ref().map_or(0, |writer| {
            writer.emit(
                EventType::Attempt,
                request.now,
                Some(request.step_id.clone()),
                serde_json::to_value(&attempt).unwrap_or_else(|_| json!({})),
            )
        });

        if verdict.decision == Verdict::Block
            && let Some(writer) = &self.writer
        {
            let denied = PolicyDeniedData {
                code: verdict.code,
                category: verdict.domain.as_str().to_string(),
                category_detail: None,
            };
            let _ = writer.emit(
                EventType::PolicyDenied,
                request.now,
                Some(request.step_id.clone()),
                serde_json::to_value(&denied).unwrap_or_else(|_| json!({})),
            );
        }

        let sanitized_params = (verdict.decision == Verdict::Sanitize)
            .then(|| extract_sanitized(&outcome.decisions))
            .flatten();

        if let Ok(mut state) = self.state.lock() {
            state.stats.attempts += 1;
            match verdict.decision {
                Verdict::Allow => state.stats.allowed += 1,
                Verdict::Warn => state.stats.warned += 1,
                Verdict::Sanitize => state.stats.sanitized += 1,
                Verdict::Block => state.stats.blocked += 1,
            }
            let suppressed =
                outcome.decisions.iter().filter(|decision| decision.is_suppressed()).count();
            state.stats.suppressed_decisions += u64::try_from(suppressed).unwrap_or(u64::MAX);
            state.audit.append(&mut outcome.audit);
            state.history.push(StepParamsRecord {
                seq,
                step_id: request.step_id.clone(),
                tool: request.tool.clone(),
                params: request.params.clone(),
            });
        }

        PreflightOutcome {
            step_id: request.step_id,
            seq,
            verdict,
            decisions: outcome.decisions,
            sanitized_params,
        }
    }

    /// Records an executed step: runs enrichers, emits EGRESS, and feeds
    /// the guardian. Returns newly fired cost alerts.
    pub fn record_egress(&self, report: EgressReport) -> Vec<CostAlert> {
        if let Some(sensitivity) = self.config.taint_sources.get(report.tool.as_str()) {
            self.taint.mark(
                report.step_id.clone(),
                &report.tool,
                &report.result,
                TaintTag {
                    source: TaintSource::Tool,
                    sensitivity: *sensitivity,
                    source_tool: report.tool.clone(),
                    source_step: report.step_id.clone(),
                },
            );
        }

        let mut ctx = ContextV1::new(
            report.tool.clone(),
            Params::new(),
            report.step_id.clone(),
            self.config.run_id.clone(),
            self.config.session_id.clone(),
        )
        .with_result(report.result.clone());
        ctx.metadata.timestamp = Some(report.now);
        ctx.state = StateMap::new(Some(Arc::clone(&self.taint)), Some(Arc::clone(&self.scan_cache)));

        let usage = report.usage.or_else(|| crate::cost::extract_usage(&report.result));
        let input = EgressInput {
            ctx: &ctx,
            effects: &report.effects,
            usage,
            duration_ms: report.duration_ms,
        };
        let evidence = run_enrichers(&self.enrichers, &input);

        let egress = EgressData {
            status: report.status,
            evidence,
        };
        if let Some(writer) = &self.writer {
            let _ = writer.emit(
                EventType::Egress,
                report.now,
                Some(report.step_id),
                serde_json::to_value(&egress).unwrap_or_else(|_| json!({})),
            );
        }

        let mut alerts = Vec::new();
        if let Some(usage) = usage {
            alerts = self.guardian.record_usage(&usage, report.now);
        }
        if let Ok(mut state) = self.state.lock() {
            state.stats.egress_events += 1;
            state.alerts.extend(alerts.iter().copied());
        }
        alerts
    }

    /// Cooperative streaming checkpoint; see the cost guardian.
    pub fn on_token_generated(&self, count: u64) -> Option<crate::core::decision::ErrorCode> {
        self.guardian.on_token_generated(count)
    }

    /// Records an executor-reported event (`ARTIFACT_WRITTEN`,
    /// `SIDE_EFFECT_APPLIED`, `STEP_TIMEOUT`, `TIMEOUT_CLAMPED`,
    /// `REPLAY_HIT`, `REPLAY_MISS`).
    ///
    /// The payload is tool-specific; the sink assigns the sequence number.
    /// Returns the assigned sequence number, or zero after the sink closed.
    pub fn record_event(
        &self,
        event_type: EventType,
        step: Option<StepId>,
        data: Value,
        now: Timestamp,
    ) -> u64 {
        self.writer.as_ref().map_or(0, |writer| writer.emit(event_type, now, step, data))
    }

    /// Requests cancellation of the run.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Finishes the run: drift analysis, RUN_END, sink flush and close.
    #[must_use]
    pub fn finish(mut self, now: Timestamp) -> RunReport {
        let (mut stats, audit, history, alerts) = match self.state.lock() {
            Ok(mut state) => {
                let stats = std::mem::take(&mut state.stats);
                let audit = std::mem::take(&mut state.audit);
                let history = std::mem::take(&mut state.history);
                let alerts = std::mem::take(&mut state.alerts);
                (stats, audit, history, alerts)
            }
            Err(_) => (RunStats::default(), Vec::new(), Vec::new(), Vec::new()),
        };

        let drift = self.drift.as_ref().map(|analyzer| analyzer.analyze(&history)).unwrap_or_default();
        if let Some(writer) = &self.writer {
            for decision in &drift {
                let step = decision
                    .evidence
                    .get("step_id")
                    .and_then(Value::as_str)
                    .map(StepId::new);
                let _ = writer.emit(
                    EventType::ContractDrift,
                    now,
                    step,
                    serde_json::to_value(decision).unwrap_or_else(|_| json!({})),
                );
            }
        }

        let totals = self.guardian.totals();
        stats.cost_usd = totals.cost_usd;
        stats.total_tokens = totals.total_tokens;
        stats.api_calls = totals.api_calls;

        let status = if self.cancel.is_cancelled() {
            RunStatus::Cancelled
        } else if stats.blocked > 0 && stats.blocked == stats.attempts {
            RunStatus::Blocked
        } else if stats.blocked > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Success
        };

        if let Some(writer) = self.writer.take() {
            let end = RunEndData {
                status,
                stats: stats.clone(),
            };
            let _ = writer.emit(
                EventType::RunEnd,
                now,
                None,
                serde_json::to_value(&end).unwrap_or_else(|_| json!({})),
            );
            let sink_stats = writer.flush_and_close();
            stats.dropped_events = sink_stats.dropped_events;
            stats.dropped_evidence = sink_stats.dropped_evidence;
        }

        RunReport {
            status,
            stats,
            audit,
            drift,
            alerts,
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Extracts sanitised parameters from the strongest sanitising decision.
fn extract_sanitized(decisions: &[DecisionV1]) -> Option<Params> {
    decisions
        .iter()
        .filter(|decision| !decision.is_suppressed() && !decision.is_shadow())
        .find(|decision| decision.decision == Verdict::Sanitize)
        .and_then(|decision| decision.evidence.get("sanitized_params"))
        .and_then(|value| serde_json::from_value(value.clone()).ok())
}
