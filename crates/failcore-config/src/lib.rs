// crates/failcore-config/src/lib.rs
// ============================================================================
// Module: Failcore Config Library
// Description: Configuration and policy file loading for Failcore.
// Purpose: Provide strict, fail-closed parsing of runtime and policy files.
// Dependencies: crate::{config, policy_file}
// ============================================================================

//! ## Overview
//! This crate loads the optional TOML runtime configuration (code defaults
//! apply when it is absent) and the YAML or JSON policy documents making up
//! the three policy layers. Parsing is strict and fails closed: oversized
//! files, unknown sections, and invalid values refuse to load.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod policy_file;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ConfigError;
pub use config::CostSection;
pub use config::DlpSection;
pub use config::DriftSection;
pub use config::EffectsSection;
pub use config::EngineSection;
pub use config::FailcoreConfig;
pub use config::SemanticSection;
pub use config::SinkSection;
pub use config::TaintSection;
pub use policy_file::PolicyFileError;
pub use policy_file::PolicySet;
pub use policy_file::load_policy_dir;
pub use policy_file::parse_policy_from_str;
pub use policy_file::serialize_policy_to_str;
