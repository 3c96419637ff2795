//! Scripted multi-tick skirmish.
//!
//! A deliberately crude stand-in for the game: friendly units carry out the
//! orders the orchestrator issued, enemies drift along scripted velocities
//! and shoot whatever friendly unit they can reach. Good enough to drive
//! the orchestrator through many ticks with acknowledgements, deaths and
//! moving targets.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use combat_core::command::{Ability, CommandBatch, ObservedOrder};
use combat_core::config::CombatConfig;
use combat_core::data::UnitDataTable;
use combat_core::decision_log::DecisionLog;
use combat_core::math::{quantize, Vec2, GAME_LOOPS_PER_SECOND};
use combat_core::orchestrator::CombatOrchestrator;
use combat_core::unit::{closest_unit, Alliance, Unit, UnitId, UnitObservation};
use combat_core::world::WorldView;

use crate::fixtures::{snapshot, standard_table, LOOPS_PER_TICK};

/// Point at most `max` from `from` towards `to`.
#[must_use]
pub fn step_towards(from: Vec2, to: Vec2, max: f64) -> Vec2 {
    if from.distance(to) <= max {
        to
    } else {
        from.offset(from.direction_to(to), max)
    }
}

/// An orchestrator playing against scripted enemies.
pub struct Skirmish<W: WorldView> {
    orchestrator: CombatOrchestrator,
    world: W,
    units: Vec<UnitObservation>,
    velocities: BTreeMap<UnitId, Vec2>,
    tick: u64,
    log: DecisionLog,
}

impl<W: WorldView> Skirmish<W> {
    /// Skirmish on `world` using the standard table and default config.
    #[must_use]
    pub fn new(name: &str, world: W, units: Vec<UnitObservation>) -> Self {
        Self::with_orchestrator(
            name,
            CombatOrchestrator::new(standard_table(), CombatConfig::default()),
            world,
            units,
        )
    }

    /// Skirmish driven by a preconfigured orchestrator.
    #[must_use]
    pub fn with_orchestrator(name: &str, orchestrator: CombatOrchestrator, world: W, units: Vec<UnitObservation>) -> Self {
        Self {
            orchestrator,
            world,
            units,
            velocities: BTreeMap::new(),
            tick: 0,
            log: DecisionLog::new(name),
        }
    }

    /// Move enemy `id` by `velocity` every tick.
    #[must_use]
    pub fn with_enemy_velocity(mut self, id: UnitId, velocity: Vec2) -> Self {
        self.velocities.insert(id, velocity);
        self
    }

    /// Run one tick: decide, record, then play the tick out.
    pub fn step(&mut self) -> CommandBatch {
        self.tick += 1;
        let snap = snapshot(self.tick, self.units.clone());
        let batch = self.orchestrator.run_tick(&snap, &self.world);
        self.log.record(&batch);
        self.apply(&batch);
        batch
    }

    /// Run `ticks` ticks.
    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.step();
        }
    }

    /// Ticks run so far.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Current observations.
    #[must_use]
    pub fn units(&self) -> &[UnitObservation] {
        &self.units
    }

    /// Current observation of `id`, if alive.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&UnitObservation> {
        self.units.iter().find(|u| u.id == id)
    }

    /// Alive units of `alliance`.
    #[must_use]
    pub fn count(&self, alliance: Alliance) -> usize {
        self.units.iter().filter(|u| u.alliance == alliance).count()
    }

    /// The orchestrator under test.
    #[must_use]
    pub fn orchestrator(&self) -> &CombatOrchestrator {
        &self.orchestrator
    }

    /// Decisions recorded so far.
    #[must_use]
    pub fn log(&self) -> &DecisionLog {
        &self.log
    }

    /// Hash of the tick, every unit's quantized position and health, and
    /// the last batch.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);
        for unit in &self.units {
            unit.id.hash(&mut hasher);
            unit.position.map(Vec2::quantized_bits).hash(&mut hasher);
            quantize(unit.health).hash(&mut hasher);
            quantize(unit.shield).hash(&mut hasher);
        }
        self.log.ticks.last().map(|t| t.hash).hash(&mut hasher);
        hasher.finish()
    }

    fn apply(&mut self, batch: &CommandBatch) {
        for command in batch.commands().iter().filter(|c| !c.queue) {
            for obs in self.units.iter_mut().filter(|o| command.unit_ids.contains(&o.id)) {
                obs.orders = vec![command.to_observed()];
            }
        }

        let table = self.orchestrator.table();
        #[allow(clippy::cast_precision_loss)]
        let step = LOOPS_PER_TICK as f64;
        let size = self.world.map_size();
        let units: Vec<Unit> = self
            .units
            .iter()
            .filter_map(|o| Unit::from_observation(o, table).ok())
            .collect();
        let friendly: Vec<&Unit> = units.iter().filter(|u| u.alliance == Alliance::Friendly).collect();

        let mut moves: Vec<(UnitId, Vec2)> = Vec::new();
        let mut hits: Vec<(UnitId, UnitId, f64)> = Vec::new();
        for unit in &units {
            let travel = unit.travel_per_step(step);
            match unit.alliance {
                Alliance::Friendly => {
                    if let Some(order) = unit.orders.first() {
                        follow_order(table, unit, order, &units, travel, &mut moves, &mut hits);
                    }
                }
                Alliance::Enemy => {
                    if let Some(velocity) = self.velocities.get(&unit.id) {
                        let to = (unit.position + *velocity).clamp_to_bounds(size.x, size.y);
                        moves.push((unit.id, to));
                    }
                    let reachable = friendly.iter().copied().filter(|f| in_reach(table, unit, f));
                    if let Some(target) = closest_unit(reachable, unit.position) {
                        fire(table, unit, target, &mut hits);
                    }
                }
                Alliance::Neutral => {}
            }
        }

        for obs in &mut self.units {
            obs.weapon_cooldown = (obs.weapon_cooldown - step).max(0.0);
        }
        for (id, to) in moves {
            if let Some(obs) = self.units.iter_mut().find(|o| o.id == id) {
                obs.position = Some(to);
            }
        }
        for (attacker, target, damage) in hits {
            let cycle = self
                .units
                .iter()
                .find(|o| o.id == attacker)
                .and_then(|o| o.unit_type.as_ref())
                .and_then(|t| table.get(t))
                .and_then(|d| d.weapons.first())
                .map_or(0.0, |w| w.cycle_time * GAME_LOOPS_PER_SECOND);
            if let Some(obs) = self.units.iter_mut().find(|o| o.id == attacker) {
                obs.weapon_cooldown = cycle;
            }
            if let Some(obs) = self.units.iter_mut().find(|o| o.id == target) {
                let absorbed = damage.min(obs.shield);
                obs.shield -= absorbed;
                obs.health -= damage - absorbed;
            }
        }
        self.units.retain(|o| o.health > 0.0);
    }
}

fn in_reach(table: &UnitDataTable, attacker: &Unit, target: &Unit) -> bool {
    table
        .weapon_that_can_attack(&attacker.unit_type, target)
        .is_some_and(|w| attacker.distance_to(target) <= w.range + attacker.radius + target.radius)
}

fn fire(table: &UnitDataTable, attacker: &Unit, target: &Unit, hits: &mut Vec<(UnitId, UnitId, f64)>) {
    if attacker.weapon_cooldown <= 0.0 && table.can_attack(attacker, target) {
        hits.push((attacker.id, target.id, table.weapon_damage(attacker, target)));
    }
}

fn follow_order(
    table: &UnitDataTable,
    unit: &Unit,
    order: &ObservedOrder,
    units: &[Unit],
    travel: f64,
    moves: &mut Vec<(UnitId, Vec2)>,
    hits: &mut Vec<(UnitId, UnitId, f64)>,
) {
    let target = order.target_unit_id.and_then(|id| units.iter().find(|u| u.id == id));
    match (order.ability, target, order.target_position) {
        (Ability::Attack, Some(target), _) => {
            if in_reach(table, unit, target) {
                fire(table, unit, target, hits);
            } else {
                moves.push((unit.id, step_towards(unit.position, target.position, travel)));
            }
        }
        (Ability::Attack | Ability::Move, None, Some(position)) => {
            moves.push((unit.id, step_towards(unit.position, position, travel)));
        }
        _ => {}
    }
}
