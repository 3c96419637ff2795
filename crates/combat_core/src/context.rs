//! Per-tick decision context.
//!
//! Built once per tick from the snapshot and shared read-only by every
//! decision made during that tick. Nothing in here changes while units are
//! being evaluated.

use tracing::debug;

use crate::config::CombatConfig;
use crate::data::{UnitDataTable, Weapon};
use crate::error::CombatError;
use crate::math::Vec2;
use crate::stats::CombatStats;
use crate::tracking::EnemyTracker;
use crate::unit::{units_within, Alliance, Unit, UnitId};
use crate::world::Snapshot;

/// Units of a snapshot that passed validation, split by alliance.
#[derive(Debug, Default)]
pub struct ValidatedUnits {
    /// Our units.
    pub friendly: Vec<Unit>,
    /// Opponent units.
    pub enemies: Vec<Unit>,
    /// Neutral units (destructible obstacles).
    pub neutral: Vec<Unit>,
    /// Units skipped this tick with the reason.
    pub skipped: Vec<(UnitId, CombatError)>,
}

impl ValidatedUnits {
    /// Validate every observation of `snapshot`, sorting each group by id.
    #[must_use]
    pub fn from_snapshot(snapshot: &Snapshot, table: &UnitDataTable) -> Self {
        let mut validated = Self::default();
        for observation in &snapshot.units {
            match Unit::from_observation(observation, table) {
                Ok(unit) => match unit.alliance {
                    Alliance::Friendly => validated.friendly.push(unit),
                    Alliance::Enemy => validated.enemies.push(unit),
                    Alliance::Neutral => validated.neutral.push(unit),
                },
                Err(err) => {
                    debug!(tick = snapshot.tick, unit = observation.id, error = %err, "Skipping unit");
                    validated.skipped.push((observation.id, err));
                }
            }
        }
        validated.friendly.sort_by_key(|u| u.id);
        validated.enemies.sort_by_key(|u| u.id);
        validated.neutral.sort_by_key(|u| u.id);
        validated
    }
}

/// An enemy able to hit a specific friendly unit.
#[derive(Debug, Clone, Copy)]
pub struct Threat<'a> {
    /// The enemy.
    pub enemy: &'a Unit,
    /// Weapon of the enemy that can hit the unit.
    pub weapon: &'a Weapon,
    /// Where the enemy is projected to be.
    pub projected: Vec2,
    /// Weapon range plus both radii plus both per-step travel allowances.
    pub effective_range: f64,
}

/// Read-only state shared by all decisions of one tick.
#[derive(Debug)]
pub struct TickContext<'a> {
    /// Decision tick index.
    pub tick: u64,
    /// Game loop of the snapshot.
    pub time: f64,
    /// Decision constants.
    pub config: &'a CombatConfig,
    /// Statistics engine.
    pub stats: CombatStats<'a>,
    /// Enemy position histories, already updated for this tick.
    pub tracker: &'a EnemyTracker,
    /// Our units, sorted by id.
    pub friendly: Vec<Unit>,
    /// Enemy units, sorted by id.
    pub enemies: Vec<Unit>,
    /// Neutral units, sorted by id.
    pub neutral: Vec<Unit>,
}

impl<'a> TickContext<'a> {
    /// Assemble a context from validated units.
    #[must_use]
    pub fn new(
        tick: u64,
        time: f64,
        table: &'a UnitDataTable,
        config: &'a CombatConfig,
        tracker: &'a EnemyTracker,
        units: ValidatedUnits,
    ) -> Self {
        Self {
            tick,
            time,
            config,
            stats: CombatStats::new(table, config),
            tracker,
            friendly: units.friendly,
            enemies: units.enemies,
            neutral: units.neutral,
        }
    }

    /// Unit-type table.
    #[must_use]
    pub fn table(&self) -> &'a UnitDataTable {
        self.stats.table()
    }

    /// Time enemy positions are projected to: one step ahead.
    #[must_use]
    pub fn projection_time(&self) -> f64 {
        self.time + self.config.step_size
    }

    /// Projected position of `enemy`.
    #[must_use]
    pub fn projected(&self, enemy: &Unit) -> Vec2 {
        self.tracker.projected_position(enemy, self.projection_time())
    }

    /// Distance `unit` moves in one step.
    #[must_use]
    pub fn travel(&self, unit: &Unit) -> f64 {
        unit.travel_per_step(self.config.step_size)
    }

    /// Enemies within `radius` of `position`.
    #[must_use]
    pub fn enemies_near(&self, position: Vec2, radius: f64) -> Vec<&Unit> {
        units_within(&self.enemies, position, radius)
    }

    /// Friendly units within `radius` of `position`.
    #[must_use]
    pub fn friendly_near(&self, position: Vec2, radius: f64) -> Vec<&Unit> {
        units_within(&self.friendly, position, radius)
    }

    /// Friendly unit by id.
    #[must_use]
    pub fn friendly_unit(&self, id: UnitId) -> Option<&Unit> {
        self.friendly
            .binary_search_by_key(&id, |u| u.id)
            .ok()
            .map(|i| &self.friendly[i])
    }

    /// Finished bunkers.
    pub fn ready_bunkers(&self) -> impl Iterator<Item = &Unit> {
        self.friendly.iter().filter(|u| u.is_bunker && u.is_ready())
    }

    /// Threat posed by `enemy` to `unit`, if it has a weapon for it.
    /// `unit_travel` is the allowance used for the friendly side.
    #[must_use]
    pub fn threat<'u>(&'u self, enemy: &'u Unit, unit: &Unit, unit_travel: f64) -> Option<Threat<'u>> {
        let weapon = self
            .table()
            .weapon_that_can_attack(&enemy.unit_type, unit)
            .filter(|w| w.is_usable())?;
        Some(Threat {
            enemy,
            weapon,
            projected: self.projected(enemy),
            effective_range: weapon.range + enemy.radius + unit.radius + unit_travel + self.travel(enemy),
        })
    }

    /// Threats to `unit` among enemies within the engagement radius.
    #[must_use]
    pub fn threats_to(&self, unit: &Unit, unit_travel: f64) -> Vec<Threat<'_>> {
        self.enemies_near(unit.position, self.config.engagement_radius)
            .into_iter()
            .filter_map(|enemy| self.threat(enemy, unit, unit_travel))
            .collect()
    }
}
