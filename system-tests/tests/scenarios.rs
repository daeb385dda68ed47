// system-tests/tests/scenarios.rs
// ============================================================================
// Module: Scenario Suite
// Description: Aggregates end-to-end decision pipeline scenarios.
// Purpose: Exercise the full preflight/egress pipeline as a host would.
// Dependencies: suites/end_to_end.rs, helpers
// ============================================================================

//! ## Overview
//! End-to-end scenarios over the full pipeline: policy merge, validation,
//! gating, cost enforcement, sanitisation, and post-run drift.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod helpers;

#[path = "suites/end_to_end.rs"]
mod end_to_end;
