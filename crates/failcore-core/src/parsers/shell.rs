// crates/failcore-core/src/parsers/shell.rs
// ============================================================================
// Module: Failcore Shell Parser
// Description: Shell-word tokenisation into program, flags, and arguments.
// Purpose: Provide deterministic command structure for semantic checks.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Tokenises a command line using shell-word rules: whitespace separation,
//! single quotes (literal), double quotes (backslash escapes), and bare
//! backslash escapes. An unterminated quote marks the result invalid while
//! keeping the tokens recovered so far.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Shell AST
// ============================================================================

/// Parsed command line structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellAst {
    /// Indicates the input tokenised cleanly.
    pub valid: bool,
    /// First token, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    /// Tokens beginning with `-`, in order.
    pub flags: Vec<String>,
    /// Non-flag tokens after the program, in order.
    pub args: Vec<String>,
}

// ============================================================================
// SECTION: Tokeniser State
// ============================================================================

/// Quoting state during tokenisation.
enum QuoteState {
    /// Outside any quotes.
    None,
    /// Inside single quotes.
    Single,
    /// Inside double quotes.
    Double,
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses a command line into program, flags, and arguments.
#[must_use]
pub fn parse_shell(input: &str) -> ShellAst {
    let (tokens, clean) = tokenize(input);
    let mut iter = tokens.into_iter();
    let program = iter.next();
    let mut flags = Vec::new();
    let mut args = Vec::new();
    for token in iter {
        if token.starts_with('-') && token.len() > 1 {
            flags.push(token);
        } else {
            args.push(token);
        }
    }
    ShellAst {
        valid: clean,
        program,
        flags,
        args,
    }
}

/// Tokenises by shell-word rules; returns tokens and whether quoting closed.
fn tokenize(input: &str) -> (Vec<String>, bool) {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut state = QuoteState::None;
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        match state {
            QuoteState::None => match ch {
                '\'' => {
                    state = QuoteState::Single;
                    in_token = true;
                }
                '"' => {
                    state = QuoteState::Double;
                    in_token = true;
                }
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                        in_token = true;
                    }
                }
                c if c.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                c => {
                    current.push(c);
                    in_token = true;
                }
            },
            QuoteState::Single => match ch {
                '\'' => state = QuoteState::None,
                c => current.push(c),
            },
            QuoteState::Double => match ch {
                '"' => state = QuoteState::None,
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                }
                c => current.push(c),
            },
        }
    }

    if in_token {
        tokens.push(current);
    }
    (tokens, matches!(state, QuoteState::None))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::parse_shell;

    /// Tests plain commands split into program, flags, and args.
    #[test]
    fn test_plain_command() {
        let ast = parse_shell("rm -rf /tmp/scratch");
        assert!(ast.valid);
        assert_eq!(ast.program.as_deref(), Some("rm"));
        assert_eq!(ast.flags, vec!["-rf"]);
        assert_eq!(ast.args, vec!["/tmp/scratch"]);
    }

    /// Tests quoted arguments keep embedded whitespace.
    #[test]
    fn test_quoted_args() {
        let ast = parse_shell("echo 'hello world' \"a b\"");
        assert!(ast.valid);
        assert_eq!(ast.args, vec!["hello world", "a b"]);
    }

    /// Tests an unterminated quote yields partial structure.
    #[test]
    fn test_unterminated_quote() {
        let ast = parse_shell("cat 'unclosed");
        assert!(!ast.valid);
        assert_eq!(ast.program.as_deref(), Some("cat"));
        assert_eq!(ast.args, vec!["unclosed"]);
    }

    /// Tests a lone dash is treated as an argument, not a flag.
    #[test]
    fn test_lone_dash_is_arg() {
        let ast = parse_shell("cat -");
        assert_eq!(ast.args, vec!["-"]);
        assert!(ast.flags.is_empty());
    }

    /// Tests empty input is valid and empty.
    #[test]
    fn test_empty_input() {
        let ast = parse_shell("   ");
        assert!(ast.valid);
        assert!(ast.program.is_none());
    }
}
