//! Shared test utilities for safedrop integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated runs with temporary source and destination trees
//! - `ConfigBuilder` for assembling configurations programmatically
//! - Stub collaborators so tests never depend on ClamAV or tesseract being installed

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
