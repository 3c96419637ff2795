//! Error types for the combat decision core.
//!
//! Nothing on the per-tick decision path is fatal: a unit whose observation
//! fails validation is skipped for the tick and re-evaluated on the next.
//! These errors surface to callers only when loading data, config or
//! decision logs.

use thiserror::Error;

use crate::unit::{UnitId, UnitTypeId};

/// Result type alias using [`CombatError`].
pub type Result<T> = std::result::Result<T, CombatError>;

/// Top-level error type for the combat core.
#[derive(Debug, Error)]
pub enum CombatError {
    /// A unit observation lacks a field required for decisions.
    #[error("Unit {unit} is missing required field '{field}'")]
    MissingField {
        /// Unit the observation belongs to.
        unit: UnitId,
        /// Name of the missing field.
        field: &'static str,
    },

    /// The unit type is not present in the data table.
    #[error("Unknown unit type: {0}")]
    UnknownUnitType(UnitTypeId),

    /// Data file parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path to the file that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Failed to read a file from disk.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Decision log could not be encoded or decoded.
    #[error("Decision log codec error: {0}")]
    LogCodec(String),

    /// Decision log written by an incompatible version.
    #[error("Decision log version mismatch: expected {expected}, got {actual}")]
    LogVersionMismatch {
        /// Version this build understands.
        expected: u32,
        /// Version found in the file.
        actual: u32,
    },

    /// A replayed run produced a different command batch.
    #[error("Decisions diverged at tick {tick}: expected hash {expected}, got {actual}")]
    Divergence {
        /// First tick whose batch differs.
        tick: u64,
        /// Hash recorded in the log.
        expected: u64,
        /// Hash produced by the replay.
        actual: u64,
    },
}
