// crates/failcore-core/src/parsers/sql.rs
// ============================================================================
// Module: Failcore SQL Parser
// Description: Keyword-level SQL shape extraction.
// Purpose: Surface injection-relevant structure without a full SQL grammar.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This parser extracts the keyword skeleton of a SQL string: recognised
//! keywords in order, comment presence, stacked queries, and feature flags.
//! String literals are skipped so quoted content cannot fake keywords or
//! statement separators. It is deliberately not a grammar; it only recovers
//! the structure the semantic rules evaluate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Keywords recognised by the shape extractor.
const KEYWORDS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "UNION", "FROM", "WHERE",
    "JOIN", "INTO", "VALUES", "EXEC", "EXECUTE", "GRANT", "REVOKE", "TRUNCATE",
];

// ============================================================================
// SECTION: SQL AST
// ============================================================================

/// Feature flags derived from the keyword skeleton.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlFeatures {
    /// A `UNION` keyword is present.
    pub union: bool,
    /// A `SELECT` keyword is present.
    pub select: bool,
    /// A data-mutating keyword (`INSERT`, `UPDATE`, `DELETE`) is present.
    pub mutation: bool,
    /// A schema-destroying keyword (`DROP`, `TRUNCATE`) is present.
    pub destructive: bool,
}

/// Parsed SQL shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlAst {
    /// Indicates the input scanned cleanly (no unterminated literal).
    pub valid: bool,
    /// Recognised keywords in order of appearance, uppercased.
    pub keywords: Vec<String>,
    /// A comment marker (`--`, `/*`, or `#`) appears outside literals.
    pub has_comments: bool,
    /// A statement separator with trailing content appears outside literals.
    pub stacked_queries: bool,
    /// Feature flags derived from the keywords.
    pub features: SqlFeatures,
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses a SQL string into its keyword skeleton.
#[must_use]
pub fn parse_sql(input: &str) -> SqlAst {
    let mut keywords = Vec::new();
    let mut has_comments = false;
    let mut stacked_queries = false;
    let mut word = String::new();
    let mut unterminated = false;

    let bytes: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < bytes.len() {
        let ch = bytes[i];
        match ch {
            '\'' | '"' => {
                flush_word(&mut word, &mut keywords);
                let quote = ch;
                let mut closed = false;
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == quote {
                        closed = true;
                        break;
                    }
                    i += 1;
                }
                if !closed {
                    unterminated = true;
                }
            }
            '-' if bytes.get(i + 1) == Some(&'-') => {
                flush_word(&mut word, &mut keywords);
                has_comments = true;
                while i < bytes.len() && bytes[i] != '\n' {
                    i += 1;
                }
            }
            '/' if bytes.get(i + 1) == Some(&'*') => {
                flush_word(&mut word, &mut keywords);
                has_comments = true;
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == '*' && bytes[i + 1] == '/') {
                    i += 1;
                }
                i += 1;
            }
            '#' => {
                flush_word(&mut word, &mut keywords);
                has_comments = true;
                while i < bytes.len() && bytes[i] != '\n' {
                    i += 1;
                }
            }
            ';' => {
                flush_word(&mut word, &mut keywords);
                let has_tail = bytes[i + 1..].iter().any(|c| !c.is_whitespace());
                if has_tail {
                    stacked_queries = true;
                }
            }
            c if c.is_alphanumeric() || c == '_' => word.push(c),
            _ => flush_word(&mut word, &mut keywords),
        }
        i += 1;
    }
    flush_word(&mut word, &mut keywords);

    let features = SqlFeatures {
        union: keywords.iter().any(|k| k == "UNION"),
        select: keywords.iter().any(|k| k == "SELECT"),
        mutation: keywords.iter().any(|k| k == "INSERT" || k == "UPDATE" || k == "DELETE"),
        destructive: keywords.iter().any(|k| k == "DROP" || k == "TRUNCATE"),
    };

    SqlAst {
        valid: !unterminated,
        keywords,
        has_comments,
        stacked_queries,
        features,
    }
}

/// Flushes the pending word, recording it when it is a recognised keyword.
fn flush_word(word: &mut String, keywords: &mut Vec<String>) {
    if word.is_empty() {
        return;
    }
    let upper = word.to_ascii_uppercase();
    if KEYWORDS.contains(&upper.as_str()) {
        keywords.push(upper);
    }
    word.clear();
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::parse_sql;

    /// Tests a classic injection shape sets the expected flags.
    #[test]
    fn test_union_injection_shape() {
        let ast = parse_sql("SELECT name FROM users WHERE id = 1 UNION SELECT password FROM accounts--");
        assert!(ast.valid);
        assert!(ast.features.union);
        assert!(ast.features.select);
        assert!(ast.has_comments);
        assert!(!ast.stacked_queries);
    }

    /// Tests stacked queries are only flagged with trailing content.
    #[test]
    fn test_stacked_queries() {
        assert!(parse_sql("SELECT 1; DROP TABLE users").stacked_queries);
        assert!(!parse_sql("SELECT 1;").stacked_queries);
    }

    /// Tests literals hide keywords and separators.
    #[test]
    fn test_literals_are_opaque() {
        let ast = parse_sql("INSERT INTO notes VALUES ('; DROP TABLE x --')");
        assert!(ast.valid);
        assert!(!ast.stacked_queries);
        assert!(!ast.has_comments);
        assert!(!ast.features.destructive);
    }

    /// Tests an unterminated literal invalidates the parse.
    #[test]
    fn test_unterminated_literal() {
        let ast = parse_sql("SELECT 'oops");
        assert!(!ast.valid);
        assert_eq!(ast.keywords, vec!["SELECT"]);
    }
}
