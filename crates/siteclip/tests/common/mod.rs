//! Shared test utilities for siteclip integration tests.
//!
//! This module provides:
//! - `TestHarness` for an isolated database seeded with projects, sites and polygons
//! - Builders for configurations and test geometry

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
