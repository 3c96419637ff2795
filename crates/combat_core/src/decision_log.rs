//! Recording and verification of decision streams.
//!
//! A decision log stores, per tick, the command batch the orchestrator
//! produced and its hash. Running the same scenario again and comparing the
//! logs catches any non-determinism in the decision code.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::command::{Command, CommandBatch};
use crate::error::{CombatError, Result};

/// Decision log format version.
pub const DECISION_LOG_VERSION: u32 = 1;

/// Decisions of one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    /// Tick index.
    pub tick: u64,
    /// Hash of the batch.
    pub hash: u64,
    /// Commands in issue order.
    pub commands: Vec<Command>,
}

impl TickRecord {
    /// Record `batch`.
    #[must_use]
    pub fn from_batch(batch: &CommandBatch) -> Self {
        Self {
            tick: batch.tick(),
            hash: batch.batch_hash(),
            commands: batch.commands().to_vec(),
        }
    }
}

/// Every tick's decisions for one scenario run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionLog {
    /// Format version.
    pub version: u32,
    /// Scenario name.
    pub scenario: String,
    /// Records in tick order.
    pub ticks: Vec<TickRecord>,
}

impl DecisionLog {
    /// Empty log for `scenario`.
    #[must_use]
    pub fn new(scenario: impl Into<String>) -> Self {
        Self {
            version: DECISION_LOG_VERSION,
            scenario: scenario.into(),
            ticks: Vec::new(),
        }
    }

    /// Append one tick.
    pub fn record(&mut self, batch: &CommandBatch) {
        self.ticks.push(TickRecord::from_batch(batch));
    }

    /// Number of recorded ticks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Total commands across all ticks.
    #[must_use]
    pub fn command_count(&self) -> usize {
        self.ticks.iter().map(|t| t.commands.len()).sum()
    }

    /// Encode to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| CombatError::LogCodec(e.to_string()))
    }

    /// Decode from bytes, checking the format version.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let log: Self = bincode::deserialize(bytes).map_err(|e| CombatError::LogCodec(e.to_string()))?;
        if log.version != DECISION_LOG_VERSION {
            return Err(CombatError::LogVersionMismatch {
                expected: DECISION_LOG_VERSION,
                actual: log.version,
            });
        }
        Ok(log)
    }

    /// Save to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// Load from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_bytes(&std::fs::read(path)?)
    }

    /// Compare against `other`, failing at the first tick whose hash
    /// differs or that only one of the logs has.
    pub fn verify_against(&self, other: &Self) -> Result<()> {
        for (expected, actual) in self.ticks.iter().zip(&other.ticks) {
            if expected.tick != actual.tick || expected.hash != actual.hash {
                return Err(CombatError::Divergence {
                    tick: expected.tick,
                    expected: expected.hash,
                    actual: actual.hash,
                });
            }
        }
        let shorter = self.ticks.len().min(other.ticks.len());
        if let Some(extra) = self.ticks.get(shorter).or_else(|| other.ticks.get(shorter)) {
            let in_self = self.ticks.len() > shorter;
            return Err(CombatError::Divergence {
                tick: extra.tick,
                expected: if in_self { extra.hash } else { 0 },
                actual: if in_self { 0 } else { extra.hash },
            });
        }
        Ok(())
    }
}
