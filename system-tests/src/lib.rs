// system-tests/src/lib.rs
// ============================================================================
// Module: Failcore System Tests Library
// Description: Placeholder library target for the system-tests package.
// Purpose: Keep shared system-test utilities in one crate.
// Dependencies: none
// ============================================================================

//! ## Overview
//! The system-tests package carries end-to-end suites under `tests/`; this
//! library target exists so the package builds as a workspace member.
