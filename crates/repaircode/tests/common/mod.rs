//! Shared test utilities for repaircode integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a `Pipeline` to temp storage, in-memory SQLite and a scripted model
//! - Builders for archives and canned model responses

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
