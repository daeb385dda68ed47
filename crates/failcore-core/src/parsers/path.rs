// crates/failcore-core/src/parsers/path.rs
// ============================================================================
// Module: Failcore Path Parser
// Description: Lexical path normalisation and traversal detection.
// Purpose: Provide the structure the path security validator consumes.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Normalises a path lexically: collapses `.` segments, folds `..` against
//! preceding segments, and flags traversal when a `..` survives folding
//! (the path escapes whatever it is joined to). No filesystem access is
//! performed; symlink resolution is a host responsibility and is reported
//! through a separate channel to the security validator.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Path AST
// ============================================================================

/// Parsed path structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathAst {
    /// Indicates the input was non-empty and free of NUL bytes.
    pub valid: bool,
    /// Lexically normalised path.
    pub normalised: String,
    /// The path is absolute.
    pub absolute: bool,
    /// Normalised segments, leading `..` entries included.
    pub segments: Vec<String>,
    /// A `..` segment survived normalisation; the path escapes its join root.
    pub traversal: bool,
    /// Reserved for host-reported symlink resolution; always `false` here.
    pub symlink_escape: bool,
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses and lexically normalises a path.
#[must_use]
pub fn parse_path(input: &str) -> PathAst {
    if input.is_empty() || input.contains('\0') {
        return PathAst {
            valid: false,
            normalised: String::new(),
            absolute: input.starts_with('/'),
            segments: Vec::new(),
            traversal: false,
            symlink_escape: false,
        };
    }

    let normalized_input = input.replace('\\', "/");
    let absolute = normalized_input.starts_with('/');
    let mut segments: Vec<String> = Vec::new();
    let mut traversal = false;

    for raw in normalized_input.split('/') {
        match raw {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|seg| seg != "..") {
                    segments.pop();
                } else if absolute {
                    // Leading `..` at an absolute root resolves to the root.
                    traversal = true;
                } else {
                    segments.push("..".to_string());
                    traversal = true;
                }
            }
            seg => segments.push(seg.to_string()),
        }
    }

    let mut normalised = if absolute {
        format!("/{}", segments.join("/"))
    } else if segments.is_empty() {
        ".".to_string()
    } else {
        segments.join("/")
    };
    if normalised.len() > 1 && normalised.ends_with('/') {
        normalised.pop();
    }

    PathAst {
        valid: true,
        normalised,
        absolute,
        segments,
        traversal,
        symlink_escape: false,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
