// crates/failcore-core/src/core/context.rs
// ============================================================================
// Module: Failcore Call Context
// Description: Serialisable call description passed to every validator.
// Purpose: Provide ContextV1 plus the typed run-scoped state side-channel.
// Dependencies: crate::{cache, core, taint}, serde, serde_json
// ============================================================================

//! ## Overview
//! `ContextV1` describes one candidate tool invocation. It is fully
//! serialisable except for the `state` side-channel, which carries live
//! run-scoped services (taint context, scan cache) under enumerated key
//! names. Validators must be pure with respect to the context and this
//! side-channel; they never read wall-clock or environment directly, so any
//! time-sensitive check uses `metadata.timestamp` and fails closed when it
//! is absent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::cache::ScanCache;
use crate::core::identifiers::RunId;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::StepId;
use crate::core::identifiers::ToolName;
use crate::core::time::Timestamp;
use crate::taint::TaintContext;

// ============================================================================
// SECTION: Parameters
// ============================================================================

/// JSON-serialisable parameter map with deterministic key order.
pub type Params = BTreeMap<String, Value>;

// ============================================================================
// SECTION: Metadata
// ============================================================================

/// Externally injected facts required for deterministic evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMetadata {
    /// UTC timestamp supplied by the host; required by time-sensitive validators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    /// Optional override token presented by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_token: Option<String>,
}

// ============================================================================
// SECTION: State Side-Channel
// ============================================================================

/// State key for the run-scoped taint context.
pub const STATE_KEY_TAINT_CONTEXT: &str = "taint_context";
/// State key for the run-scoped scan cache.
pub const STATE_KEY_SCAN_CACHE: &str = "scan_cache";

/// Opaque per-run side-channel typed by key name.
///
/// # Invariants
/// - Keys are enumerated; unknown keys do not exist in this map.
/// - Handles are shared, run-scoped, and never cross runs.
#[derive(Debug, Clone, Default)]
pub struct StateMap {
    /// Taint context handle under [`STATE_KEY_TAINT_CONTEXT`].
    taint_context: Option<Arc<TaintContext>>,
    /// Scan cache handle under [`STATE_KEY_SCAN_CACHE`].
    scan_cache: Option<Arc<ScanCache>>,
}

impl StateMap {
    /// Creates a state map with both run-scoped services attached.
    #[must_use]
    pub const fn new(
        taint_context: Option<Arc<TaintContext>>,
        scan_cache: Option<Arc<ScanCache>>,
    ) -> Self {
        Self {
            taint_context,
            scan_cache,
        }
    }

    /// Returns the taint context handle, if attached.
    #[must_use]
    pub fn taint_context(&self) -> Option<&Arc<TaintContext>> {
        self.taint_context.as_ref()
    }

    /// Returns the scan cache handle, if attached.
    #[must_use]
    pub fn scan_cache(&self) -> Option<&Arc<ScanCache>> {
        self.scan_cache.as_ref()
    }

    /// Lists the keys currently present, in stable order.
    #[must_use]
    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.scan_cache.is_some() {
            keys.push(STATE_KEY_SCAN_CACHE);
        }
        if self.taint_context.is_some() {
            keys.push(STATE_KEY_TAINT_CONTEXT);
        }
        keys
    }
}

// ============================================================================
// SECTION: ContextV1
// ============================================================================

/// Serialisable description of one candidate tool invocation.
///
/// # Invariants
/// - `tool` and `params` are always present; `params` is fully JSON-serialisable.
/// - `metadata.timestamp` is required for any time-sensitive validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextV1 {
    /// Identifier of the candidate action.
    pub tool: ToolName,
    /// Parameter name to JSON value mapping.
    pub params: Params,
    /// Post-execution result, present only on post-contexts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Step identifier.
    pub step_id: StepId,
    /// Run identifier.
    pub run_id: RunId,
    /// Session identifier.
    pub session_id: SessionId,
    /// Externally injected deterministic facts.
    #[serde(default)]
    pub metadata: ContextMetadata,
    /// Run-scoped live services; not serialised.
    #[serde(skip)]
    pub state: StateMap,
}

impl ContextV1 {
    /// Creates a minimal pre-execution context.
    #[must_use]
    pub fn new(
        tool: ToolName,
        params: Params,
        step_id: StepId,
        run_id: RunId,
        session_id: SessionId,
    ) -> Self {
        Self {
            tool,
            params,
            result: None,
            step_id,
            run_id,
            session_id,
            metadata: ContextMetadata::default(),
            state: StateMap::default(),
        }
    }

    /// Returns a post-execution context carrying the observed result.
    #[must_use]
    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Returns a string parameter by name, when present and textual.
    #[must_use]
    pub fn str_param(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only panic-based assertions are permitted.")]

    use serde_json::json;

    use super::ContextV1;
    use super::Params;

    /// Builds a small context for serialization checks.
    fn sample() -> ContextV1 {
        let mut params = Params::new();
        params.insert("path".to_string(), json!("./data/out.log"));
        ContextV1::new(
            "write_file".into(),
            params,
            "step-1".into(),
            "run-1".into(),
            "sess-1".into(),
        )
    }

    /// Tests the state side-channel is skipped during serialization.
    #[test]
    fn test_state_not_serialized() {
        let value = serde_json::to_value(sample()).unwrap();
        assert!(value.get("state").is_none());
        assert_eq!(value["tool"], "write_file");
    }

    /// Tests string parameter access.
    #[test]
    fn test_str_param() {
        let ctx = sample();
        assert_eq!(ctx.str_param("path"), Some("./data/out.log"));
        assert_eq!(ctx.str_param("missing"), None);
    }
}
