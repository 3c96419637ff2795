//! # Combat Test Utilities
//!
//! Shared testing utilities for the combat crates:
//! - Unit-type table and observation fixtures
//! - An in-memory [`combat_core::world::WorldView`]
//! - A scripted multi-tick skirmish
//! - Determinism test harness
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod fixtures;
pub mod skirmish;
pub mod strategies;

/// Re-export proptest for convenience.
pub use proptest;
