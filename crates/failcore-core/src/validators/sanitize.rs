// crates/failcore-core/src/validators/sanitize.rs
// ============================================================================
// Module: Failcore Structured Sanitiser
// Description: Category-aware masking of sensitive parameter content.
// Purpose: Produce redacted parameter sets that stay usable downstream.
// Dependencies: crate::{cache, core, registry}, regex, serde
// ============================================================================

//! ## Overview
//! The sanitiser is a pure function over parameters and a sanitisation
//! spec. Masking is category-aware: emails keep their domain, cards keep
//! their last four digits, keys keep a short prefix and suffix. Full mode
//! is irreversible. Sanitisation is idempotent: masked output never
//! re-matches the producing patterns, so a second pass is a no-op.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::context::Params;
use crate::core::hashing::ContentHash;
use crate::registry::CompiledPattern;

// ============================================================================
// SECTION: Redaction Modes
// ============================================================================

/// How aggressively matched content is replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionMode {
    /// Irreversible whole-match replacement.
    Full,
    /// Category-aware masking preserving usability hints.
    #[default]
    Partial,
    /// Replacement with a `[category:hash]` summary token.
    Summary,
}

// ============================================================================
// SECTION: Sanitisation Spec
// ============================================================================

/// Declarative sanitisation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizeSpec {
    /// Redaction mode.
    #[serde(default)]
    pub mode: RedactionMode,
    /// Restrict sanitisation to these parameter paths; empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
    /// Keep enough structure for the call to remain useful.
    #[serde(default = "default_true")]
    pub preserve_usability: bool,
    /// Keep email domains visible.
    #[serde(default = "default_true")]
    pub preserve_domain: bool,
    /// Keep the trailing digits of card-like numbers.
    #[serde(default = "default_true")]
    pub preserve_last4: bool,
}

/// Serde default helper.
const fn default_true() -> bool {
    true
}

impl Default for SanitizeSpec {
    fn default() -> Self {
        Self {
            mode: RedactionMode::default(),
            paths: Vec::new(),
            preserve_usability: true,
            preserve_domain: true,
            preserve_last4: true,
        }
    }
}

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Result of sanitising a parameter map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SanitizeOutcome {
    /// Sanitised parameter map.
    pub params: Params,
    /// Dotted paths whose content was changed.
    pub sanitized_paths: Vec<String>,
}

// ============================================================================
// SECTION: Sanitisation
// ============================================================================

/// Sanitises a parameter map against the compiled patterns.
#[must_use]
pub fn sanitize_params(
    params: &Params,
    patterns: &[CompiledPattern],
    spec: &SanitizeSpec,
) -> SanitizeOutcome {
    let mut outcome = SanitizeOutcome::default();
    for (name, value) in params {
        if !spec.paths.is_empty() && !spec.paths.iter().any(|path| path == name) {
            outcome.params.insert(name.clone(), value.clone());
            continue;
        }
        let sanitized = sanitize_value(value, name, patterns, spec, &mut outcome.sanitized_paths);
        outcome.params.insert(name.clone(), sanitized);
    }
    outcome
}

/// Recursively sanitises one JSON value.
fn sanitize_value(
    value: &Value,
    path: &str,
    patterns: &[CompiledPattern],
    spec: &SanitizeSpec,
    sanitized_paths: &mut Vec<String>,
) -> Value {
    match value {
        Value::String(text) => {
            let masked = sanitize_text(text, patterns, spec);
            if &masked != text {
                sanitized_paths.push(path.to_string());
            }
            Value::String(masked)
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, child) in map {
                let child_path = format!("{path}.{key}");
                out.insert(
                    key.clone(),
                    sanitize_value(child, &child_path, patterns, spec, sanitized_paths),
                );
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(index, child)| {
                    let child_path = format!("{path}[{index}]");
                    sanitize_value(child, &child_path, patterns, spec, sanitized_paths)
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Applies every pattern to one string.
fn sanitize_text(text: &str, patterns: &[CompiledPattern], spec: &SanitizeSpec) -> String {
    let mut current = text.to_string();
    for compiled in patterns {
        current = compiled
            .regex
            .replace_all(&current, |caps: &regex::Captures<'_>| {
                mask_match(&caps[0], &compiled.spec.category, spec)
            })
            .into_owned();
    }
    current
}

/// Masks one matched span according to its category and the spec.
fn mask_match(matched: &str, category: &str, spec: &SanitizeSpec) -> String {
    match spec.mode {
        RedactionMode::Full => format!("[REDACTED:{category}]"),
        RedactionMode::Summary => {
            format!("[{category}:{}]", ContentHash::of_str(matched).short())
        }
        RedactionMode::Partial => mask_partial(matched, category, spec),
    }
}

/// Category-aware partial masking.
///
/// Addresses are left intact under `preserve_usability`: masking the
/// recipient would break the very call the sanitised parameters feed.
fn mask_partial(matched: &str, category: &str, spec: &SanitizeSpec) -> String {
    match category {
        "email" if spec.preserve_usability => matched.to_string(),
        "email" => mask_email(matched, spec.preserve_domain),
        "credit_card" => mask_card(matched, spec.preserve_last4),
        _ => mask_secretlike(matched),
    }
}

/// Masks an email, optionally keeping the domain.
fn mask_email(matched: &str, keep_domain: bool) -> String {
    match matched.split_once('@') {
        Some((_, domain)) if keep_domain => format!("****@{domain}"),
        _ => "****".to_string(),
    }
}

/// Masks a card-like number, optionally keeping the last four digits.
fn mask_card(matched: &str, keep_last4: bool) -> String {
    if keep_last4 {
        let digits: Vec<char> = matched.chars().filter(char::is_ascii_digit).collect();
        let last4: String = digits.iter().rev().take(4).rev().collect();
        format!("**** **** **** {last4}")
    } else {
        "****".to_string()
    }
}

/// Masks key and token material, keeping any assignment head plus a short
/// prefix and suffix of the value.
fn mask_secretlike(matched: &str) -> String {
    let (head, value) = matched
        .find(['=', ':'])
        .map_or(("", matched), |index| matched.split_at(index + 1));
    let value = value.trim_start();
    format!("{head}{}", mask_token(value))
}

/// Masks a bare token keeping three leading and seven trailing characters.
fn mask_token(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 10 {
        return "****".to_string();
    }
    let prefix: String = chars.iter().take(3).collect();
    let suffix: String = chars[chars.len() - 7..].iter().collect();
    format!("{prefix}****…{suffix}")
}

// ============================================================================
// SECTION: Tests
// ============================================================================
