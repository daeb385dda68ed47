// crates/failcore-core/src/core/summary.rs
// ============================================================================
// Module: Failcore Safe Summaries
// Description: Redacted, policy-safe parameter summaries for trace events.
// Purpose: Prevent raw parameter leakage while keeping attempts auditable.
// Dependencies: crate::core::{context, hashing}, serde, serde_json
// ============================================================================

//! ## Overview
//! ATTEMPT events never carry raw parameters. `ParamsSummary` reduces each
//! parameter to its JSON type, size, and a shortened content hash, which is
//! enough for drift analysis and audit without disclosing values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::context::Params;
use crate::core::hashing::ContentHash;

// ============================================================================
// SECTION: Field Summary
// ============================================================================

/// Redacted summary of a single parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamFieldSummary {
    /// JSON type label (`string`, `number`, `bool`, `array`, `object`, `null`).
    pub value_type: String,
    /// Character length for strings, element count for arrays and objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    /// Shortened canonical content hash.
    pub hash: String,
}

// ============================================================================
// SECTION: Params Summary
// ============================================================================

/// Redacted skeleton of a parameter map.
///
/// # Invariants
/// - Contains only type, size, and hash data; never raw values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamsSummary {
    /// Per-parameter summaries keyed by parameter name.
    pub fields: BTreeMap<String, ParamFieldSummary>,
}

impl ParamsSummary {
    /// Builds a summary from a parameter map.
    #[must_use]
    pub fn from_params(params: &Params) -> Self {
        let mut fields = BTreeMap::new();
        for (name, value) in params {
            fields.insert(name.clone(), summarize_value(value));
        }
        Self {
            fields,
        }
    }
}

/// Summarises a single JSON value without copying its content.
fn summarize_value(value: &Value) -> ParamFieldSummary {
    let (value_type, size) = match value {
        Value::Null => ("null", None),
        Value::Bool(_) => ("bool", None),
        Value::Number(_) => ("number", None),
        Value::String(text) => ("string", Some(text.chars().count())),
        Value::Array(items) => ("array", Some(items.len())),
        Value::Object(map) => ("object", Some(map.len())),
    };
    let hash = ContentHash::of_canonical_json(value)
        .map_or_else(|_| "unhashable".to_string(), |digest| digest.short().to_string());
    ParamFieldSummary {
        value_type: value_type.to_string(),
        size,
        hash,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
