// crates/failcore-config/src/policy_file.rs
// ============================================================================
// Module: Failcore Policy Files
// Description: YAML/JSON policy document parsing and the three-layer set.
// Purpose: Load active, shadow, and breakglass layers with round-trip fidelity.
// Dependencies: failcore-core, serde_json, serde_yaml
// ============================================================================

//! ## Overview
//! Policy documents are YAML (or JSON; every YAML parser accepts it). The
//! active layer is required; `shadow` and `breakglass` documents are
//! optional siblings. Serialization round-trips: parsing a serialized
//! policy yields an equal value. Layer semantics (shadow may only shadow,
//! breakglass may only weaken) are enforced by the core merge, not here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use failcore_core::BreakglassPolicy;
use failcore_core::Policy;
use failcore_core::policy::BreakglassActivation;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Active layer filename.
const ACTIVE_FILE: &str = "active.yaml";
/// Shadow layer filename.
const SHADOW_FILE: &str = "shadow.yaml";
/// Breakglass layer filename.
const BREAKGLASS_FILE: &str = "breakglass.yaml";
/// Maximum policy file size in bytes.
const MAX_POLICY_FILE_SIZE: usize = 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while loading policy documents.
#[derive(Debug, Error)]
pub enum PolicyFileError {
    /// The file could not be read.
    #[error("failed to read policy file {path}: {cause}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying cause.
        cause: String,
    },
    /// The file exceeds the size cap.
    #[error("policy file {path} exceeds {limit} bytes")]
    TooLarge {
        /// Offending path.
        path: PathBuf,
        /// Size cap in bytes.
        limit: usize,
    },
    /// The document failed to parse.
    #[error("invalid policy document: {0}")]
    Parse(String),
    /// The document declares an unsupported version.
    #[error("unsupported policy version '{0}'; expected v1")]
    UnsupportedVersion(String),
    /// The active layer is missing.
    #[error("policy directory {0} has no {ACTIVE_FILE}")]
    MissingActive(PathBuf),
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses a policy document from a YAML (or JSON) string.
///
/// # Errors
///
/// Returns [`PolicyFileError`] on parse failure or version mismatch.
pub fn parse_policy_from_str(raw: &str) -> Result<Policy, PolicyFileError> {
    let policy: Policy =
        serde_yaml::from_str(raw).map_err(|err| PolicyFileError::Parse(err.to_string()))?;
    if policy.version != "v1" {
        return Err(PolicyFileError::UnsupportedVersion(policy.version));
    }
    Ok(policy)
}

/// Serializes a policy document to its canonical YAML string.
///
/// # Errors
///
/// Returns [`PolicyFileError::Parse`] when serialization fails, which
/// indicates a programming error in the policy value.
pub fn serialize_policy_to_str(policy: &Policy) -> Result<String, PolicyFileError> {
    serde_yaml::to_string(policy).map_err(|err| PolicyFileError::Parse(err.to_string()))
}

// ============================================================================
// SECTION: Breakglass Documents
// ============================================================================

/// On-disk breakglass document: the weakening deltas plus activation facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakglassDocument {
    /// Activation facts.
    pub activation: BreakglassActivation,
    /// Weakening policy deltas.
    #[serde(flatten)]
    pub policy: Policy,
}

/// Parses a breakglass document from a YAML string.
///
/// # Errors
///
/// Returns [`PolicyFileError`] on parse failure or version mismatch.
pub fn parse_breakglass_from_str(raw: &str) -> Result<BreakglassPolicy, PolicyFileError> {
    let document: BreakglassDocument =
        serde_yaml::from_str(raw).map_err(|err| PolicyFileError::Parse(err.to_string()))?;
    if document.policy.version != "v1" {
        return Err(PolicyFileError::UnsupportedVersion(document.policy.version));
    }
    Ok(BreakglassPolicy {
        policy: document.policy,
        activation: document.activation,
    })
}

// ============================================================================
// SECTION: Policy Set
// ============================================================================

/// The three policy layers loaded from a directory.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicySet {
    /// Active layer; complete and standalone.
    pub active: Policy,
    /// Optional shadow layer.
    pub shadow: Option<Policy>,
    /// Optional breakglass layer.
    pub breakglass: Option<BreakglassPolicy>,
}

/// Loads the policy layers from a directory.
///
/// `active.yaml` is required; `shadow.yaml` and `breakglass.yaml` load when
/// present.
///
/// # Errors
///
/// Returns [`PolicyFileError`] on missing active layer, read failures,
/// oversized files, or parse failures.
pub fn load_policy_dir(dir: &Path) -> Result<PolicySet, PolicyFileError> {
    let active_path = dir.join(ACTIVE_FILE);
    if !active_path.exists() {
        return Err(PolicyFileError::MissingActive(dir.to_path_buf()));
    }
    let active = parse_policy_from_str(&read_capped(&active_path)?)?;

    let shadow_path = dir.join(SHADOW_FILE);
    let shadow = if shadow_path.exists() {
        Some(parse_policy_from_str(&read_capped(&shadow_path)?)?)
    } else {
        None
    };

    let breakglass_path = dir.join(BREAKGLASS_FILE);
    let breakglass = if breakglass_path.exists() {
        Some(parse_breakglass_from_str(&read_capped(&breakglass_path)?)?)
    } else {
        None
    };

    Ok(PolicySet {
        active,
        shadow,
        breakglass,
    })
}

/// Reads a file enforcing the policy size cap.
fn read_capped(path: &Path) -> Result<String, PolicyFileError> {
    let raw = fs::read_to_string(path).map_err(|err| PolicyFileError::Io {
        path: path.to_path_buf(),
        cause: err.to_string(),
    })?;
    if raw.len() > MAX_POLICY_FILE_SIZE {
        return Err(PolicyFileError::TooLarge {
            path: path.to_path_buf(),
            limit: MAX_POLICY_FILE_SIZE,
        });
    }
    Ok(raw)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
