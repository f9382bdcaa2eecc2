//! Architectural Enforcement Integration Tests
//!
//! The tests in `tests/` scan the production sources of `chatline-core`
//! and the `chatline` CLI and fail on:
//! - sleeping instead of waiting on I/O or a deadline
//! - blocking I/O reached from async code
//!
//! The crate itself has no code; it exists so the scans run with the rest
//! of the workspace tests.
