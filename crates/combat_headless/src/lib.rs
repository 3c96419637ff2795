//! # Headless Combat Runner
//!
//! Plays scripted fights against the combat orchestrator without a game:
//! - Loads RON scenarios (map, units, scripted enemy movement)
//! - Drives the orchestrator tick by tick and plays the commands out
//! - Records and verifies binary decision logs
//! - Runs batches of scenarios in parallel
//! - Validates unit data, config and scenario files
//!
//! # Protocol
//!
//! Output (stdout): one JSON object per tick, one per line
//! Logs (stderr): tracing output
//!
//! # Example
//!
//! ```bash
//! # Play a built-in scenario and record its decisions
//! combat_headless run --scenario skirmish --record skirmish.log
//!
//! # Replay and compare
//! combat_headless verify --scenario skirmish --log skirmish.log
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod arena;
pub mod batch;
pub mod runner;
pub mod scenario;
pub mod validate;

pub use batch::{run_batch, BatchConfig, BatchResults};
pub use runner::{verify_log, HeadlessRunner, Outcome, RunSummary, RunnerConfig};
pub use scenario::{Scenario, ScenarioError};
