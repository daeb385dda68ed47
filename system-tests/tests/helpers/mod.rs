// system-tests/tests/helpers/mod.rs
// ============================================================================
// Module: System Test Helpers
// Description: Shared builders for policies, runs, and in-memory sinks.
// Purpose: Keep end-to-end suites small and declarative.
// Dependencies: failcore-config, failcore-core, serde_json
// ============================================================================

//! ## Overview
//! Helpers build the canonical policies the suites exercise and capture the
//! trace in memory so suites can assert on the emitted envelopes.

#![allow(dead_code, reason = "Each suite binary links the helpers it needs.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;

use failcore_core::Policy;
use failcore_core::RulesRegistry;
use failcore_core::RunConfig;
use failcore_core::RunCtx;
use failcore_core::Timestamp;
use failcore_core::ValidatorConfig;
use failcore_core::core::DecisionDomain;
use failcore_core::core::Params;
use failcore_core::core::TraceEnvelope;
use failcore_core::sink::SinkTarget;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Shared Sink
// ============================================================================

/// Shared in-memory trace target suites can inspect after the run.
#[derive(Clone, Default)]
pub struct SharedTrace {
    /// Written bytes.
    inner: Arc<Mutex<Vec<u8>>>,
}

impl Write for SharedTrace {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.lock().map_or(Ok(buf.len()), |mut inner| inner.write(buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl SinkTarget for SharedTrace {}

impl SharedTrace {
    /// Parses the captured trace strictly.
    ///
    /// # Panics
    ///
    /// Panics when the captured trace is malformed.
    #[must_use]
    pub fn envelopes(&self) -> Vec<TraceEnvelope> {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        failcore_core::sink::reader::read_trace(inner.as_slice(), true)
            .unwrap_or_else(|err| panic!("captured trace must parse: {err}"))
    }

    /// Returns the raw captured bytes.
    #[must_use]
    pub fn raw(&self) -> Vec<u8> {
        self.inner.lock().map(|inner| inner.clone()).unwrap_or_default()
    }
}

// ============================================================================
// SECTION: Policy Builders
// ============================================================================

/// Filesystem-safety policy with a sandbox root of `./data`.
#[must_use]
pub fn fs_safe_policy() -> Policy {
    let mut policy = Policy::named("fs_safe");
    let mut path = ValidatorConfig::new(DecisionDomain::Security);
    path.priority = 10;
    path.config.insert("sandbox_root".to_string(), json!("./data"));
    policy.validators.insert("path_security".into(), path);
    policy
}

/// Network-safety policy blocking private targets.
#[must_use]
pub fn net_safe_policy() -> Policy {
    let mut policy = Policy::named("net_safe");
    let mut net = ValidatorConfig::new(DecisionDomain::Security);
    net.priority = 10;
    policy.validators.insert("network_security".into(), net);
    policy
}

/// Command plus semantic policy used by the dedup scenario.
#[must_use]
pub fn command_policy() -> Policy {
    let mut policy = Policy::named("cmd_safe");
    let mut command = ValidatorConfig::new(DecisionDomain::Security);
    command.priority = 10;
    policy.validators.insert("command_security".into(), command);
    let mut semantic = ValidatorConfig::new(DecisionDomain::Semantic);
    semantic.priority = 20;
    policy.validators.insert("semantic_intent".into(), semantic);
    policy
}

/// DLP policy in sanitize mode preserving usability.
#[must_use]
pub fn dlp_sanitize_policy() -> Policy {
    let mut policy = Policy::named("dlp_sanitize");
    let mut dlp = ValidatorConfig::new(DecisionDomain::Dlp);
    dlp.priority = 10;
    dlp.config.insert("mode".to_string(), json!("sanitize"));
    dlp.config.insert("preserve_last4".to_string(), json!(true));
    policy.validators.insert("dlp_guard".into(), dlp);
    policy
}

/// Policy with only the post-run drift analyser enabled.
#[must_use]
pub fn drift_policy() -> Policy {
    let mut policy = Policy::named("drift_watch");
    let mut drift = ValidatorConfig::new(DecisionDomain::Drift);
    drift.config.insert("strategy".to_string(), json!("median"));
    policy.validators.insert("drift".into(), drift);
    policy
}

// ============================================================================
// SECTION: Run Builders
// ============================================================================

/// Starts a run over the given policy with an in-memory trace.
///
/// # Panics
///
/// Panics when the run fails to start; suites treat startup as infallible.
#[must_use]
pub fn start_run(policy: &Policy, config: RunConfig) -> (RunCtx, SharedTrace) {
    let registry = Arc::new(
        RulesRegistry::load_builtin().unwrap_or_else(|err| panic!("builtin registry: {err}")),
    );
    let trace = SharedTrace::default();
    let run = RunCtx::start(
        policy,
        None,
        None,
        &registry,
        config,
        trace.clone(),
        Timestamp::from_unix_millis(0),
    )
    .unwrap_or_else(|err| panic!("run must start: {err}"));
    (run, trace)
}

/// Builds a one-entry parameter map.
#[must_use]
pub fn params_one(name: &str, value: Value) -> Params {
    let mut params = Params::new();
    params.insert(name.to_string(), value);
    params
}

/// Millisecond timestamps counted from the run epoch.
#[must_use]
pub fn ts(millis: i64) -> Timestamp {
    Timestamp::from_unix_millis(millis)
}
