// crates/failcore-core/src/replay/mod.rs
// ============================================================================
// Module: Failcore Replay Fingerprint
// Description: Canonical hash input contract for cache replay.
// Purpose: Provide stable step fingerprints with explicit component listing.
// Dependencies: crate::core::{context, hashing, identifiers}, serde
// ============================================================================

//! ## Overview
//! A fingerprint is the authoritative replay key for a step. It is computed
//! over a canonicalised JSON document (RFC 8785 rules: sorted keys, stable
//! number format, UTF-8, no NaN or Infinity) whose member names are listed
//! explicitly in `components`. `FINGERPRINT_COMPUTED` must precede any
//! `REPLAY_HIT` or `REPLAY_MISS` that references it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::context::Params;
use crate::core::hashing::CanonicalJsonError;
use crate::core::hashing::ContentHash;
use crate::core::identifiers::ToolName;

// ============================================================================
// SECTION: Fingerprint
// ============================================================================

/// Canonical replay fingerprint for one step.
///
/// # Invariants
/// - `components` lists, in order, exactly the member names hashed.
/// - Identical inputs produce identical hashes across processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Lowercase hex canonical hash.
    pub hash: String,
    /// Member names included in the hash input.
    pub components: Vec<String>,
}

// ============================================================================
// SECTION: Computation
// ============================================================================

/// Computes the canonical fingerprint for a step's inputs.
///
/// The hash input always contains `tool` and `params`; `policy_hash` and
/// `registry_hash` are included when supplied so replay keys invalidate on
/// policy or registry change.
///
/// # Errors
///
/// Returns [`CanonicalJsonError`] when the input cannot be canonicalised.
pub fn compute_fingerprint(
    tool: &ToolName,
    params: &Params,
    policy_hash: Option<&str>,
    registry_hash: Option<&str>,
) -> Result<Fingerprint, CanonicalJsonError> {
    let mut input: BTreeMap<&str, Value> = BTreeMap::new();
    input.insert("tool", Value::String(tool.as_str().to_string()));
    input.insert(
        "params",
        Value::Object(params.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
    );
    if let Some(hash) = policy_hash {
        input.insert("policy_hash", Value::String(hash.to_string()));
    }
    if let Some(hash) = registry_hash {
        input.insert("registry_hash", Value::String(hash.to_string()));
    }
    let digest = ContentHash::of_canonical_json(&input)?;
    Ok(Fingerprint {
        hash: digest.into_hex(),
        components: input.keys().map(|key| (*key).to_string()).collect(),
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
