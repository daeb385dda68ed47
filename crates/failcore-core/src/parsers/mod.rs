// crates/failcore-core/src/parsers/mod.rs
// ============================================================================
// Module: Failcore Parsers
// Description: Deterministic structural parsers for strings under evaluation.
// Purpose: Turn raw parameter strings into small ASTs for semantic checks.
// Dependencies: crate::parsers::{path, payload, shell, sql, url}
// ============================================================================

//! ## Overview
//! Parsers are pure functions from strings (or structured values) to small
//! ASTs. They never panic and never return errors: invalid input yields
//! `valid = false` plus whatever partial structure was recovered. Results
//! are purely syntactic; no policy is encoded here.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod path;
pub mod payload;
pub mod shell;
pub mod sql;
pub mod url;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use path::PathAst;
pub use path::parse_path;
pub use payload::PayloadAst;
pub use payload::parse_payload;
pub use payload::parse_payload_value;
pub use shell::ShellAst;
pub use shell::parse_shell;
pub use sql::SqlAst;
pub use sql::SqlFeatures;
pub use sql::parse_sql;
pub use url::UrlAst;
pub use url::parse_url;
