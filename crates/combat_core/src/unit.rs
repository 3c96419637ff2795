//! Units as observed in a tick's snapshot.
//!
//! A [`UnitObservation`] is what the game reports, with every field that may
//! be absent modelled as an `Option`. [`Unit::from_observation`] validates it
//! against the unit type table; a failure means the unit is skipped for the
//! tick rather than aborting the batch.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::command::ObservedOrder;
use crate::data::{UnitDataTable, UnitTypeData};
use crate::error::{CombatError, Result};
use crate::math::{Vec2, GAME_LOOPS_PER_SECOND};

/// Stable identity of a unit across ticks.
pub type UnitId = u64;

/// Identifier of a unit type in the [`UnitDataTable`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitTypeId(pub String);

impl UnitTypeId {
    /// Create a unit type identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitTypeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UnitTypeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Which side a unit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Alliance {
    /// Our units.
    Friendly,
    /// Opponent units.
    Enemy,
    /// Map features such as destructible rocks.
    Neutral,
}

impl Alliance {
    /// The opposing side. Neutral has no opponent and maps to itself.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Self::Friendly => Self::Enemy,
            Self::Enemy => Self::Friendly,
            Self::Neutral => Self::Neutral,
        }
    }
}

const fn fully_built() -> f64 {
    1.0
}

/// Raw per-tick observation of one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitObservation {
    /// Unit identity.
    pub id: UnitId,
    /// Owning side.
    pub alliance: Alliance,
    /// Unit type, if known.
    #[serde(default)]
    pub unit_type: Option<UnitTypeId>,
    /// Position, if visible.
    #[serde(default)]
    pub position: Option<Vec2>,
    /// Footprint radius, if reported.
    #[serde(default)]
    pub radius: Option<f64>,
    /// Current health.
    #[serde(default)]
    pub health: f64,
    /// Current shield.
    #[serde(default)]
    pub shield: f64,
    /// Maximum health; falls back to the type table when absent.
    #[serde(default)]
    pub health_max: Option<f64>,
    /// Maximum shield; falls back to the type table when absent.
    #[serde(default)]
    pub shield_max: Option<f64>,
    /// Game loops until the weapon is ready again.
    #[serde(default)]
    pub weapon_cooldown: f64,
    /// Construction progress in `[0, 1]`.
    #[serde(default = "fully_built")]
    pub build_progress: f64,
    /// Flying state override (e.g. lifted buildings).
    #[serde(default)]
    pub is_flying: Option<bool>,
    /// Orders the game reports the unit is executing.
    #[serde(default)]
    pub orders: Vec<ObservedOrder>,
    /// Whether the unit can accept passengers (ready bunkers with space).
    #[serde(default)]
    pub can_load: bool,
}

impl UnitObservation {
    /// Minimal observation of a fully visible unit.
    #[must_use]
    pub fn new(id: UnitId, alliance: Alliance, unit_type: impl Into<UnitTypeId>, position: Vec2) -> Self {
        Self {
            id,
            alliance,
            unit_type: Some(unit_type.into()),
            position: Some(position),
            radius: None,
            health: 0.0,
            shield: 0.0,
            health_max: None,
            shield_max: None,
            weapon_cooldown: 0.0,
            build_progress: fully_built(),
            is_flying: None,
            orders: Vec::new(),
            can_load: false,
        }
    }
}

/// A validated unit with every field the decision code needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    /// Unit identity.
    pub id: UnitId,
    /// Owning side.
    pub alliance: Alliance,
    /// Unit type.
    pub unit_type: UnitTypeId,
    /// Position this tick.
    pub position: Vec2,
    /// Footprint radius.
    pub radius: f64,
    /// Current health.
    pub health: f64,
    /// Current shield.
    pub shield: f64,
    /// Maximum health.
    pub health_max: f64,
    /// Maximum shield.
    pub shield_max: f64,
    /// Movement speed in distance per game second.
    pub speed: f64,
    /// Game loops until the weapon is ready again.
    pub weapon_cooldown: f64,
    /// Construction progress in `[0, 1]`.
    pub build_progress: f64,
    /// Whether the unit flies.
    pub is_flying: bool,
    /// Whether all of the unit's weapons are melee range.
    pub is_melee: bool,
    /// Whether the unit is a worker.
    pub is_worker: bool,
    /// Whether units can shelter inside (bunkers).
    pub is_bunker: bool,
    /// Orders currently executing.
    pub orders: Vec<ObservedOrder>,
    /// Whether the unit can accept passengers.
    pub can_load: bool,
}

impl Unit {
    /// Validate an observation against the type table.
    ///
    /// # Errors
    ///
    /// Returns [`CombatError::MissingField`] when the type, position or radius
    /// is unknown, or [`CombatError::UnknownUnitType`] when the type is not
    /// in the table.
    pub fn from_observation(observation: &UnitObservation, table: &UnitDataTable) -> Result<Self> {
        let missing = |field| CombatError::MissingField {
            unit: observation.id,
            field,
        };
        let unit_type = observation.unit_type.clone().ok_or_else(|| missing("unit_type"))?;
        let position = observation
            .position
            .filter(|p| p.is_finite())
            .ok_or_else(|| missing("position"))?;
        let data = table.require(&unit_type)?;
        let radius = observation
            .radius
            .or(data.radius)
            .ok_or_else(|| missing("radius"))?;

        Ok(Self {
            id: observation.id,
            alliance: observation.alliance,
            position,
            radius,
            health: observation.health.max(0.0),
            shield: observation.shield.max(0.0),
            health_max: observation.health_max.unwrap_or(data.health_max),
            shield_max: observation.shield_max.unwrap_or(data.shield_max),
            speed: data.speed,
            weapon_cooldown: observation.weapon_cooldown,
            build_progress: observation.build_progress,
            is_flying: observation.is_flying.unwrap_or(data.is_flying),
            is_melee: data.is_melee(),
            is_worker: data.is_worker,
            is_bunker: data.cargo_slots > 0,
            orders: observation.orders.clone(),
            can_load: observation.can_load,
            unit_type,
        })
    }

    /// Health plus shield, never negative.
    #[must_use]
    pub fn effective_health(&self) -> f64 {
        (self.health + self.shield).max(0.0)
    }

    /// Distance the unit covers in one decision step of `step_size` game loops.
    #[must_use]
    pub fn travel_per_step(&self, step_size: f64) -> f64 {
        self.speed / GAME_LOOPS_PER_SECOND * step_size
    }

    /// Straight-line distance between unit centers.
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        self.position.distance(other.position)
    }

    /// Whether the unit is currently executing an attack order.
    #[must_use]
    pub fn is_attacking(&self) -> bool {
        self.orders
            .iter()
            .any(|o| o.ability == crate::command::Ability::Attack)
    }

    /// Whether construction has finished.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.build_progress >= 1.0
    }

    /// Type data for this unit.
    #[must_use]
    pub fn type_data<'a>(&self, table: &'a UnitDataTable) -> Option<&'a UnitTypeData> {
        table.get(&self.unit_type)
    }
}

/// Units of `units` within `radius` of `position`, preserving order.
pub fn units_within<'a>(
    units: impl IntoIterator<Item = &'a Unit>,
    position: Vec2,
    radius: f64,
) -> Vec<&'a Unit> {
    let radius_sq = radius * radius;
    units
        .into_iter()
        .filter(|u| u.position.distance_squared(position) <= radius_sq)
        .collect()
}

/// Closest unit of `units` to `position`.
pub fn closest_unit<'a>(units: impl IntoIterator<Item = &'a Unit>, position: Vec2) -> Option<&'a Unit> {
    units.into_iter().min_by(|a, b| {
        a.position
            .distance_squared(position)
            .total_cmp(&b.position.distance_squared(position))
            .then(a.id.cmp(&b.id))
    })
}
