// crates/failcore-core/src/sink/reader.rs
// ============================================================================
// Module: Failcore Trace Reader
// Description: Tolerant JSONL trace reading with sequence verification.
// Purpose: Load traces for drift analysis, explain output, and tests.
// Dependencies: crate::core::trace, serde_json
// ============================================================================

//! ## Overview
//! The reader consumes append-only JSONL traces. A trailing truncated line
//! (a partial write interrupted mid-flush) is tolerated and skipped; any
//! other malformed line is an error. `seq` must be strictly increasing per
//! run. Strict mode additionally rejects unknown envelope fields outside
//! the `data` extension point; tolerant mode ignores them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::io::BufRead;

use serde_json::Value;
use thiserror::Error;

use crate::core::identifiers::RunId;
use crate::core::trace::TraceEnvelope;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while reading a trace.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// An interior line failed to parse.
    #[error("malformed trace line {line}: {cause}")]
    MalformedLine {
        /// One-based line number.
        line: usize,
        /// Parse failure cause.
        cause: String,
    },
    /// Sequence numbers regressed within one run.
    #[error("seq regression in run '{run_id}' at line {line}: {prev} -> {next}")]
    SeqRegression {
        /// Run whose ordering broke.
        run_id: RunId,
        /// One-based line number.
        line: usize,
        /// Previous sequence number.
        prev: u64,
        /// Offending sequence number.
        next: u64,
    },
    /// Reading the underlying stream failed.
    #[error("trace read failed: {0}")]
    Io(String),
}

// ============================================================================
// SECTION: Reading
// ============================================================================

/// Envelope fields accepted by the tolerant reader.
const ENVELOPE_FIELDS: &[&str] =
    &["schema_version", "run_id", "event_type", "seq", "ts", "step", "data"];

/// Reads a trace, verifying per-run sequence monotonicity.
///
/// # Errors
///
/// Returns [`ReaderError`] on malformed interior lines, sequence
/// regressions, or stream failures. A trailing truncated line is skipped.
pub fn read_trace(reader: impl BufRead, strict: bool) -> Result<Vec<TraceEnvelope>, ReaderError> {
    let mut lines = Vec::new();
    for line in reader.lines() {
        lines.push(line.map_err(|err| ReaderError::Io(err.to_string()))?);
    }

    let mut envelopes = Vec::new();
    let mut last_seq: HashMap<RunId, u64> = HashMap::new();
    let total = lines.len();
    for (index, line) in lines.into_iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parsed = parse_line(&line, strict);
        let envelope = match parsed {
            Ok(envelope) => envelope,
            Err(cause) => {
                // A truncated final line is an accepted partial-write state.
                if index + 1 == total {
                    break;
                }
                return Err(ReaderError::MalformedLine {
                    line: index + 1,
                    cause,
                });
            }
        };
        if let Some(&prev) = last_seq.get(&envelope.run_id)
            && envelope.seq <= prev
        {
            return Err(ReaderError::SeqRegression {
                run_id: envelope.run_id.clone(),
                line: index + 1,
                prev,
                next: envelope.seq,
            });
        }
        last_seq.insert(envelope.run_id.clone(), envelope.seq);
        envelopes.push(envelope);
    }
    Ok(envelopes)
}

/// Parses one line in strict or tolerant mode.
fn parse_line(line: &str, strict: bool) -> Result<TraceEnvelope, String> {
    if strict {
        return serde_json::from_str(line).map_err(|err| err.to_string());
    }
    let mut value: Value = serde_json::from_str(line).map_err(|err| err.to_string())?;
    if let Some(map) = value.as_object_mut() {
        map.retain(|key, _| ENVELOPE_FIELDS.contains(&key.as_str()));
    }
    serde_json::from_value(value).map_err(|err| err.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only panic-based assertions are permitted.")]

    use super::ReaderError;
    use super::read_trace;

    /// A minimal valid line with the given seq.
    fn line(seq: u64) -> String {
        format!(
            r#"{{"schema_version":"failcore.trace.v0.2.0","run_id":"run-1","event_type":"EGRESS","seq":{seq},"ts":0,"data":{{}}}}"#
        )
    }

    /// Tests a clean trace reads fully.
    #[test]
    fn test_clean_trace() {
        let input = format!("{}\n{}\n", line(1), line(2));
        let envelopes = read_trace(input.as_bytes(), true).unwrap();
        assert_eq!(envelopes.len(), 2);
    }

    /// Tests a trailing truncated line is tolerated.
    #[test]
    fn test_truncated_tail() {
        let input = format!("{}\n{}", line(1), &line(2)[..20]);
        let envelopes = read_trace(input.as_bytes(), true).unwrap();
        assert_eq!(envelopes.len(), 1);
    }

    /// Tests an interior malformed line is an error.
    #[test]
    fn test_interior_malformed() {
        let input = format!("{}\nnot json\n{}\n", line(1), line(2));
        assert!(matches!(
            read_trace(input.as_bytes(), true),
            Err(ReaderError::MalformedLine { line: 2, .. })
        ));
    }

    /// Tests sequence regressions are rejected.
    #[test]
    fn test_seq_regression() {
        let input = format!("{}\n{}\n", line(5), line(3));
        assert!(matches!(
            read_trace(input.as_bytes(), true),
            Err(ReaderError::SeqRegression { .. })
        ));
    }

    /// Tests tolerant mode ignores unknown fields that strict rejects.
    #[test]
    fn test_strict_vs_tolerant() {
        let noisy = format!(
            r#"{{"schema_version":"failcore.trace.v0.2.0","run_id":"run-1","event_type":"EGRESS","seq":1,"ts":0,"data":{{}},"extra":1}}{}{}{}"#,
            "\n",
            line(2),
            "\n"
        );
        assert!(matches!(
            read_trace(noisy.as_bytes(), true),
            Err(ReaderError::MalformedLine { line: 1, .. })
        ));
        let tolerant = read_trace(noisy.as_bytes(), false).unwrap();
        assert_eq!(tolerant.len(), 2);
    }
}
