// crates/failcore-core/src/core/time.rs
// ============================================================================
// Module: Failcore Time Model
// Description: Canonical caller-supplied timestamps for contexts and traces.
// Purpose: Provide deterministic, replayable time values across Failcore records.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Failcore uses explicit time values injected through [`crate::core::context::ContextV1`]
//! metadata to keep evaluation deterministic. The engine never reads wall-clock
//! time directly; hosts must supply timestamps on every call and every trace
//! event.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when parsing or formatting timestamps.
#[derive(Debug, Error)]
pub enum TimeError {
    /// The input string is not a valid RFC 3339 timestamp.
    #[error("invalid rfc3339 timestamp: {0}")]
    InvalidRfc3339(String),
    /// The value is outside the representable range.
    #[error("timestamp out of range: {0}")]
    OutOfRange(i128),
}

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Canonical timestamp used in Failcore contexts and trace records.
///
/// # Invariants
/// - Values are explicitly provided by callers; the core never reads wall-clock time.
/// - Stored as UTC unix epoch milliseconds; monotonicity is a caller responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Parses an RFC 3339 timestamp string into UTC milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::InvalidRfc3339`] when the input does not parse.
    pub fn parse_rfc3339(input: &str) -> Result<Self, TimeError> {
        let parsed = OffsetDateTime::parse(input, &Rfc3339)
            .map_err(|_| TimeError::InvalidRfc3339(input.to_string()))?;
        let millis = parsed.unix_timestamp_nanos() / 1_000_000;
        i64::try_from(millis).map(Self).map_err(|_| TimeError::OutOfRange(millis))
    }

    /// Formats the timestamp as an RFC 3339 UTC string.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::OutOfRange`] when the value cannot be represented.
    pub fn to_rfc3339(self) -> Result<String, TimeError> {
        let nanos = i128::from(self.0) * 1_000_000;
        let value = OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map_err(|_| TimeError::OutOfRange(nanos))?;
        value.format(&Rfc3339).map_err(|_| TimeError::OutOfRange(nanos))
    }

    /// Returns the millisecond distance from an earlier timestamp.
    #[must_use]
    pub const fn millis_since(self, earlier: Self) -> i64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only panic-based assertions are permitted.")]

    use super::Timestamp;

    /// Tests rfc3339 round-trip preserves millisecond precision.
    #[test]
    fn test_rfc3339_round_trip() {
        let ts = Timestamp::parse_rfc3339("2026-03-01T12:30:00.250Z").unwrap();
        assert_eq!(ts.as_unix_millis() % 1000, 250);
        let rendered = ts.to_rfc3339().unwrap();
        let reparsed = Timestamp::parse_rfc3339(&rendered).unwrap();
        assert_eq!(ts, reparsed);
    }

    /// Tests invalid input is rejected.
    #[test]
    fn test_invalid_rfc3339_rejected() {
        assert!(Timestamp::parse_rfc3339("not-a-time").is_err());
    }

    /// Tests millisecond distance saturates instead of wrapping.
    #[test]
    fn test_millis_since_saturates() {
        let early = Timestamp::from_unix_millis(i64::MIN);
        let late = Timestamp::from_unix_millis(i64::MAX);
        assert_eq!(late.millis_since(early), i64::MAX);
    }
}
