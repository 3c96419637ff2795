//! Test fixtures and helpers.
//!
//! A standard unit-type table, observation builders and an in-memory map so
//! every test describes a fight the same way.

use combat_core::context::{TickContext, ValidatedUnits};
use combat_core::data::UnitDataTable;
use combat_core::math::Vec2;
use combat_core::unit::{Alliance, Unit, UnitId, UnitObservation};
use combat_core::world::{Expansion, Snapshot, WorldView};

/// Game loops per tick assumed by [`snapshot`]; matches the default step size.
pub const LOOPS_PER_TICK: u64 = 8;

/// Unit types used across the test suites, in RON.
///
/// Weapons use a cycle time of 1.4 so that, with the default cycle
/// normalization, damage per hit equals DPS for single-attack weapons:
/// a rifleman deals 10 DPS and a brute 20.
pub const STANDARD_TABLE_RON: &str = r#"(
    units: {
        "rifleman": (
            health_max: 150.0,
            speed: 3.15,
            radius: Some(0.5),
            attributes: [Light, Biological],
            weapons: [(range: 5.0, damage: 10.0, attacks: 1, cycle_time: 1.4, target: Any)],
        ),
        "brute": (
            health_max: 150.0,
            speed: 3.15,
            radius: Some(0.5),
            attributes: [Armored, Biological],
            weapons: [(range: 5.0, damage: 20.0, attacks: 1, cycle_time: 1.4, target: Any)],
        ),
        "blade": (
            health_max: 100.0,
            shield_max: 50.0,
            armor: 1.0,
            speed: 3.15,
            radius: Some(0.5),
            attributes: [Light, Biological],
            weapons: [(range: 0.1, damage: 8.0, attacks: 2, cycle_time: 1.2, target: Ground)],
        ),
        "crawler": (
            health_max: 200.0,
            speed: 1.5,
            radius: Some(0.625),
            attributes: [Armored, Biological],
            weapons: [(range: 0.1, damage: 20.0, attacks: 1, cycle_time: 1.4, target: Ground)],
        ),
        "hawk": (
            health_max: 140.0,
            speed: 4.0,
            radius: Some(0.75),
            is_flying: true,
            attributes: [Armored, Mechanical],
            weapons: [(range: 3.0, damage: 12.0, attacks: 1, cycle_time: 1.4, target: Ground)],
        ),
        "caster": (
            health_max: 80.0,
            speed: 2.25,
            radius: Some(0.5),
            attributes: [Light, Psionic],
            weapons: [(range: 5.0, damage: 4.0, attacks: 1, cycle_time: 1.4, target: Any)],
        ),
        "worker": (
            health_max: 40.0,
            speed: 3.94,
            radius: Some(0.375),
            is_worker: true,
            attributes: [Light, Biological],
            weapons: [(range: 0.1, damage: 5.0, attacks: 1, cycle_time: 1.5, target: Ground)],
        ),
        "bunker": (
            health_max: 400.0,
            armor: 1.0,
            radius: Some(1.5),
            cargo_slots: 4,
            attributes: [Armored, Structure],
        ),
        "rock": (
            health_max: 2000.0,
            radius: Some(2.0),
            attributes: [Armored, Structure],
        ),
    },
)"#;

/// The standard unit-type table.
///
/// # Panics
///
/// Panics if [`STANDARD_TABLE_RON`] does not parse.
#[must_use]
pub fn standard_table() -> UnitDataTable {
    UnitDataTable::from_ron_str(STANDARD_TABLE_RON).expect("standard table parses")
}

/// Observation of a full-health unit of `kind`, health and shield taken from
/// the standard table.
#[must_use]
pub fn observe(id: UnitId, alliance: Alliance, kind: &str, x: f64, y: f64) -> UnitObservation {
    let mut obs = UnitObservation::new(id, alliance, kind, Vec2::new(x, y));
    if let Some(data) = standard_table().get(&kind.into()) {
        obs.health = data.health_max;
        obs.shield = data.shield_max;
    }
    obs
}

/// Friendly full-health unit.
#[must_use]
pub fn friendly(id: UnitId, kind: &str, x: f64, y: f64) -> UnitObservation {
    observe(id, Alliance::Friendly, kind, x, y)
}

/// Enemy full-health unit.
#[must_use]
pub fn enemy(id: UnitId, kind: &str, x: f64, y: f64) -> UnitObservation {
    observe(id, Alliance::Enemy, kind, x, y)
}

/// Neutral full-health unit.
#[must_use]
pub fn neutral(id: UnitId, kind: &str, x: f64, y: f64) -> UnitObservation {
    observe(id, Alliance::Neutral, kind, x, y)
}

/// Snapshot for `tick`, with the game loop advancing [`LOOPS_PER_TICK`] per tick.
#[must_use]
pub fn snapshot(tick: u64, units: Vec<UnitObservation>) -> Snapshot {
    Snapshot::new(tick, tick * LOOPS_PER_TICK, units)
}

/// Validate `observations` against `table` into the three alliance lists.
#[must_use]
pub fn validate(table: &UnitDataTable, observations: Vec<UnitObservation>) -> ValidatedUnits {
    ValidatedUnits::from_snapshot(&Snapshot::new(0, 0, observations), table)
}

/// Borrow every unit of `units` whose id is in `ids`, in `ids` order.
///
/// # Panics
///
/// Panics if an id is missing.
#[must_use]
pub fn pick<'a>(units: &'a [Unit], ids: &[UnitId]) -> Vec<&'a Unit> {
    ids.iter()
        .map(|id| {
            units
                .iter()
                .find(|u| u.id == *id)
                .unwrap_or_else(|| panic!("unit {id} not in fixture"))
        })
        .collect()
}

/// Friendly and enemy units of a [`TickContext`] as borrowed slices.
#[must_use]
pub fn sides<'c>(ctx: &'c TickContext<'_>) -> (Vec<&'c Unit>, Vec<&'c Unit>) {
    (ctx.friendly.iter().collect(), ctx.enemies.iter().collect())
}

/// Axis-aligned unpathable area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blocked {
    /// Lower-left corner.
    pub min: Vec2,
    /// Upper-right corner.
    pub max: Vec2,
}

impl Blocked {
    /// Whether `point` lies inside, borders included.
    #[must_use]
    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }
}

/// In-memory map: a rectangle with blocked areas, straight-line path
/// distances, and optional rally and expansions.
#[derive(Debug, Clone, PartialEq)]
pub struct TestWorld {
    /// Playable size.
    pub size: Vec2,
    /// Unpathable areas.
    pub blocked: Vec<Blocked>,
    /// Combat rally.
    pub rally: Option<Vec2>,
    /// Known expansions.
    pub expansions: Vec<Expansion>,
    /// Global strength flag.
    pub outpowered: bool,
}

impl TestWorld {
    /// Open map of the given size.
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            size: Vec2::new(width, height),
            blocked: Vec::new(),
            rally: None,
            expansions: Vec::new(),
            outpowered: false,
        }
    }

    /// Open 100 × 100 map.
    #[must_use]
    pub fn open() -> Self {
        Self::new(100.0, 100.0)
    }

    /// Set the combat rally.
    #[must_use]
    pub fn with_rally(mut self, x: f64, y: f64) -> Self {
        self.rally = Some(Vec2::new(x, y));
        self
    }

    /// Add an expansion whose town hall stands at its centroid.
    #[must_use]
    pub fn with_expansion(mut self, x: f64, y: f64) -> Self {
        let centroid = Vec2::new(x, y);
        self.expansions.push(Expansion::new(centroid, centroid));
        self
    }

    /// Block the rectangle `min..=max`.
    #[must_use]
    pub fn with_blocked(mut self, min: Vec2, max: Vec2) -> Self {
        self.blocked.push(Blocked { min, max });
        self
    }

    /// Mark our side as outpowered.
    #[must_use]
    pub fn outpowered(mut self) -> Self {
        self.outpowered = true;
        self
    }
}

impl WorldView for TestWorld {
    fn map_size(&self) -> Vec2 {
        self.size
    }

    fn is_pathable(&self, point: Vec2) -> bool {
        !self.blocked.iter().any(|b| b.contains(point))
    }

    fn path_distance(&self, from: Vec2, to: Vec2) -> f64 {
        if self.is_pathable(to) {
            from.distance(to)
        } else {
            f64::INFINITY
        }
    }

    fn combat_rally(&self) -> Option<Vec2> {
        self.rally
    }

    fn expansions(&self) -> &[Expansion] {
        &self.expansions
    }

    fn is_outpowered(&self) -> bool {
        self.outpowered
    }
}
