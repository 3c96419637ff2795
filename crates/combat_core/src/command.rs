//! Commands produced by the orchestrator.
//!
//! Commands are accumulated into a [`CommandBatch`] during the tick and
//! handed to the game's command channel once at the end. The batch enforces
//! the one-decision-per-unit rule and exposes the positions already claimed
//! this tick so later units do not pick the same surround spot.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::math::Vec2;
use crate::unit::{UnitId, UnitObservation};

/// Squared distance within which an observed target position counts as the
/// commanded one.
const POSITION_MATCH_TOLERANCE_SQ: f64 = 0.25;

/// Abilities the combat core issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ability {
    /// Move to a position, ignoring enemies on the way.
    Move,
    /// Attack a unit, or attack-move to a position.
    Attack,
    /// Stop and hold.
    Stop,
    /// Context action (loading into a bunker).
    Smart,
}

/// An order the game reports a unit is executing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservedOrder {
    /// Ability being executed.
    pub ability: Ability,
    /// Target unit, if any.
    #[serde(default)]
    pub target_unit_id: Option<UnitId>,
    /// Target position, if any.
    #[serde(default)]
    pub target_position: Option<Vec2>,
}

/// One entry of the command batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Ability to use.
    pub ability: Ability,
    /// Units receiving the command.
    pub unit_ids: Vec<UnitId>,
    /// Target unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_unit_id: Option<UnitId>,
    /// Target position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_position: Option<Vec2>,
    /// Append to the unit's order queue instead of replacing it.
    #[serde(default)]
    pub queue: bool,
}

impl Command {
    fn new(ability: Ability, unit: UnitId) -> Self {
        Self {
            ability,
            unit_ids: vec![unit],
            target_unit_id: None,
            target_position: None,
            queue: false,
        }
    }

    /// Move `unit` to `position`.
    #[must_use]
    pub fn move_to(unit: UnitId, position: Vec2) -> Self {
        Self {
            target_position: Some(position),
            ..Self::new(Ability::Move, unit)
        }
    }

    /// Attack a specific unit.
    #[must_use]
    pub fn attack_unit(unit: UnitId, target: UnitId) -> Self {
        Self {
            target_unit_id: Some(target),
            ..Self::new(Ability::Attack, unit)
        }
    }

    /// Attack-move to a position.
    #[must_use]
    pub fn attack_position(unit: UnitId, position: Vec2) -> Self {
        Self {
            target_position: Some(position),
            ..Self::new(Ability::Attack, unit)
        }
    }

    /// Stop and hold position.
    #[must_use]
    pub fn stop(unit: UnitId) -> Self {
        Self::new(Ability::Stop, unit)
    }

    /// Context action on a unit (load into bunker).
    #[must_use]
    pub fn smart(unit: UnitId, target: UnitId) -> Self {
        Self {
            target_unit_id: Some(target),
            ..Self::new(Ability::Smart, unit)
        }
    }

    /// Queue behind the unit's current order.
    #[must_use]
    pub fn queued(mut self) -> Self {
        self.queue = true;
        self
    }

    /// Whether this command would show up as `order` once the game applies it.
    #[must_use]
    pub fn matches_order(&self, order: &ObservedOrder) -> bool {
        if self.ability != order.ability || self.target_unit_id != order.target_unit_id {
            return false;
        }
        match (self.target_position, order.target_position) {
            (Some(a), Some(b)) => a.distance_squared(b) < POSITION_MATCH_TOLERANCE_SQ,
            (None, None) => true,
            _ => false,
        }
    }

    /// Whether `observation` shows this command took effect: the unit is
    /// executing it, or has already finished it. A finished stop leaves no
    /// orders; a finished move or attack-move leaves the unit on its target.
    #[must_use]
    pub fn is_satisfied_by(&self, observation: &UnitObservation) -> bool {
        if let Some(order) = observation.orders.first() {
            return self.matches_order(order);
        }
        match (self.ability, self.target_position) {
            (Ability::Stop, _) => true,
            (Ability::Move | Ability::Attack, Some(target)) => observation
                .position
                .is_some_and(|p| p.distance_squared(target) < POSITION_MATCH_TOLERANCE_SQ),
            _ => false,
        }
    }

    /// The order the game would report once this command is applied.
    #[must_use]
    pub fn to_observed(&self) -> ObservedOrder {
        ObservedOrder {
            ability: self.ability,
            target_unit_id: self.target_unit_id,
            target_position: self.target_position,
        }
    }

    fn hash_into(&self, hasher: &mut impl Hasher) {
        self.ability.hash(hasher);
        self.unit_ids.hash(hasher);
        self.target_unit_id.hash(hasher);
        self.target_position.map(Vec2::quantized_bits).hash(hasher);
        self.queue.hash(hasher);
    }
}

/// Ordered list of commands for one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandBatch {
    tick: u64,
    commands: Vec<Command>,
    #[serde(skip)]
    commanded: BTreeSet<UnitId>,
}

impl CommandBatch {
    /// Empty batch for `tick`.
    #[must_use]
    pub fn new(tick: u64) -> Self {
        Self {
            tick,
            commands: Vec::new(),
            commanded: BTreeSet::new(),
        }
    }

    /// Tick this batch belongs to.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Add a command.
    ///
    /// A unit already commanded this tick only accepts queued follow-ups;
    /// a second replacing command is refused and `false` is returned.
    pub fn push(&mut self, command: Command) -> bool {
        if !command.queue && command.unit_ids.iter().any(|id| self.commanded.contains(id)) {
            #[cfg(feature = "debug-validation")]
            tracing::warn!(tick = self.tick, units = ?command.unit_ids, "Refused conflicting command");
            return false;
        }
        self.commanded.extend(command.unit_ids.iter().copied());
        self.commands.push(command);
        true
    }

    /// Whether `unit` already has a command this tick.
    #[must_use]
    pub fn has_command_for(&self, unit: UnitId) -> bool {
        self.commanded.contains(&unit)
    }

    /// Commands in insertion order.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Commands addressed to `unit`.
    pub fn commands_for(&self, unit: UnitId) -> impl Iterator<Item = &Command> {
        self.commands.iter().filter(move |c| c.unit_ids.contains(&unit))
    }

    /// Number of commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Target positions of move and attack commands issued so far, with the
    /// units that will stand there.
    pub fn claimed_positions(&self) -> impl Iterator<Item = (Vec2, &[UnitId])> {
        self.commands.iter().filter_map(|c| match c.ability {
            Ability::Move | Ability::Attack => c.target_position.map(|p| (p, c.unit_ids.as_slice())),
            Ability::Stop | Ability::Smart => None,
        })
    }

    /// Stable hash of the batch; positions are quantized to fixed point so
    /// identical decisions hash identically across runs.
    #[must_use]
    pub fn batch_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);
        self.commands.len().hash(&mut hasher);
        for command in &self.commands {
            command.hash_into(&mut hasher);
        }
        hasher.finish()
    }

    /// Consume the batch, returning the commands.
    #[must_use]
    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}
