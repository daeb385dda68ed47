// crates/failcore-core/src/core/mod.rs
// ============================================================================
// Module: Failcore Core Types
// Description: Canonical context, decision, taint, effect, and trace shapes.
// Purpose: Provide stable, serializable types for contexts, verdicts, and logs.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Core types define the call context, the decision contract, the taint and
//! side-effect models, and the trace protocol. These types are the canonical
//! source of truth for any derived surface; every one of them is wire-stable.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod context;
pub mod decision;
pub mod effects;
pub mod hashing;
pub mod identifiers;
pub mod summary;
pub mod taint;
pub mod time;
pub mod trace;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use context::ContextMetadata;
pub use context::ContextV1;
pub use context::Params;
pub use context::STATE_KEY_SCAN_CACHE;
pub use context::STATE_KEY_TAINT_CONTEXT;
pub use context::StateMap;
pub use decision::DecisionDomain;
pub use decision::DecisionV1;
pub use decision::ErrorCode;
pub use decision::Evidence;
pub use decision::Remediation;
pub use decision::RiskLevel;
pub use decision::Verdict;
pub use effects::BoundaryPreset;
pub use effects::EffectBoundary;
pub use effects::EffectCategory;
pub use effects::EffectEvent;
pub use effects::EffectType;
pub use hashing::CanonicalJsonError;
pub use hashing::ContentHash;
pub use hashing::SHORT_HASH_LEN;
pub use hashing::canonical_json_bytes;
pub use identifiers::PolicyName;
pub use identifiers::RunId;
pub use identifiers::SessionId;
pub use identifiers::StepId;
pub use identifiers::ToolName;
pub use identifiers::ValidatorId;
pub use summary::ParamFieldSummary;
pub use summary::ParamsSummary;
pub use taint::BindingConfidence;
pub use taint::DEFAULT_MAX_FLOW_DEPTH;
pub use taint::FlowEdge;
pub use taint::Sensitivity;
pub use taint::TaintSource;
pub use taint::TaintTag;
pub use time::TimeError;
pub use time::Timestamp;
pub use trace::EventType;
pub use trace::RunStats;
pub use trace::RunStatus;
pub use trace::SCHEMA_VERSION;
pub use trace::TraceEnvelope;
pub use trace::VerdictSummary;
