//! Pending-orders ledger.
//!
//! Records the command issued to each unit so the orchestrator does not
//! re-decide for it before the game reflects the order in a later snapshot.
//! An entry issued at tick `t` blocks ticks after `t` until the snapshot
//! acknowledges it or it times out.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::command::Command;
use crate::unit::{UnitId, UnitObservation};

/// A command awaiting acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    /// Command as dispatched.
    pub command: Command,
    /// Tick it was issued in.
    pub issued_tick: u64,
}

/// Commands dispatched but not yet visible in the snapshot, keyed by unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingOrders {
    entries: BTreeMap<UnitId, PendingOrder>,
    timeout: u64,
}

impl PendingOrders {
    /// Ledger whose entries expire `timeout` ticks after issue.
    #[must_use]
    pub fn new(timeout: u64) -> Self {
        Self {
            entries: BTreeMap::new(),
            timeout,
        }
    }

    /// Record `command` for every unit it addresses. Queued follow-ups are
    /// not recorded; the replacing command is what the snapshot will show.
    pub fn record(&mut self, command: &Command, tick: u64) {
        if command.queue {
            return;
        }
        for &unit in &command.unit_ids {
            self.entries.insert(
                unit,
                PendingOrder {
                    command: command.clone(),
                    issued_tick: tick,
                },
            );
        }
    }

    /// Whether `unit` should not be re-decided at `tick`.
    #[must_use]
    pub fn is_pending(&self, unit: UnitId, tick: u64) -> bool {
        self.entries
            .get(&unit)
            .is_some_and(|e| tick > e.issued_tick && tick - e.issued_tick < self.timeout)
    }

    /// Clear the entry of the observed unit once the snapshot shows the
    /// recorded command took effect. Returns whether an entry was cleared.
    pub fn acknowledge(&mut self, observation: &UnitObservation) -> bool {
        let matched = self
            .entries
            .get(&observation.id)
            .is_some_and(|e| e.command.is_satisfied_by(observation));
        if matched {
            self.entries.remove(&observation.id);
        }
        matched
    }

    /// Drop entries at least `timeout` ticks old. Returns how many expired.
    pub fn expire(&mut self, tick: u64) -> usize {
        let timeout = self.timeout;
        let before = self.entries.len();
        self.entries.retain(|unit, e| {
            let alive = tick.saturating_sub(e.issued_tick) < timeout;
            if !alive {
                warn!(tick, unit = *unit, issued = e.issued_tick, ability = ?e.command.ability, "Pending order never acknowledged");
            }
            alive
        });
        before - self.entries.len()
    }

    /// Forget units that are gone.
    pub fn retain_units(&mut self, alive: impl Fn(UnitId) -> bool) {
        self.entries.retain(|unit, _| alive(*unit));
    }

    /// Entry for `unit`.
    #[must_use]
    pub fn get(&self, unit: UnitId) -> Option<&PendingOrder> {
        self.entries.get(&unit)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
