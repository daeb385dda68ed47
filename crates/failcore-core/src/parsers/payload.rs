// crates/failcore-core/src/parsers/payload.rs
// ============================================================================
// Module: Failcore Payload Parser
// Description: JSON payload decomposition into paths and string values.
// Purpose: Give scanners a flat view of nested payloads.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Flattens a JSON payload into dotted member paths and the list of string
//! values encountered, in deterministic traversal order. Scanners iterate
//! `string_values` instead of re-walking nested structures.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Payload AST
// ============================================================================

/// Flattened JSON payload structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadAst {
    /// Indicates the input parsed as JSON.
    pub valid: bool,
    /// Dotted paths of all members, in traversal order.
    pub paths: Vec<String>,
    /// String values encountered, in traversal order.
    pub string_values: Vec<String>,
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses a JSON text into a flattened payload view.
#[must_use]
pub fn parse_payload(input: &str) -> PayloadAst {
    serde_json::from_str::<Value>(input).map_or(
        PayloadAst {
            valid: false,
            paths: Vec::new(),
            string_values: Vec::new(),
        },
        |value| parse_payload_value(&value),
    )
}

/// Flattens an already-parsed JSON value.
#[must_use]
pub fn parse_payload_value(value: &Value) -> PayloadAst {
    let mut ast = PayloadAst {
        valid: true,
        paths: Vec::new(),
        string_values: Vec::new(),
    };
    flatten(value, String::new(), &mut ast);
    ast
}

/// Walks the value, recording member paths and string leaves.
fn flatten(value: &Value, prefix: String, ast: &mut PayloadAst) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                ast.paths.push(path.clone());
                flatten(child, path, ast);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                let path = if prefix.is_empty() {
                    format!("[{index}]")
                } else {
                    format!("{prefix}[{index}]")
                };
                ast.paths.push(path.clone());
                flatten(child, path, ast);
            }
        }
        Value::String(text) => ast.string_values.push(text.clone()),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::parse_payload;

    /// Tests nested members flatten into dotted paths.
    #[test]
    fn test_nested_paths() {
        let ast = parse_payload(r#"{"a": {"b": "x"}, "list": ["y", 1]}"#);
        assert!(ast.valid);
        assert_eq!(ast.paths, vec!["a", "a.b", "list", "list[0]", "list[1]"]);
        assert_eq!(ast.string_values, vec!["x", "y"]);
    }

    /// Tests invalid JSON yields an invalid, empty structure.
    #[test]
    fn test_invalid_json() {
        let ast = parse_payload("{not json");
        assert!(!ast.valid);
        assert!(ast.paths.is_empty());
    }
}
