//! The game model headless scenarios are played in.
//!
//! Friendly units carry out the order the orchestrator last gave them.
//! Enemy units drift along their scripted velocity and shoot the nearest
//! friendly unit in reach. Weapons fire once per cycle and shields absorb
//! damage before health. There is no pathfinding: units walk straight.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use combat_core::command::{Ability, CommandBatch};
use combat_core::data::UnitDataTable;
use combat_core::math::{quantize, Vec2, GAME_LOOPS_PER_SECOND};
use combat_core::unit::{closest_unit, Alliance, Unit, UnitId, UnitObservation};
use combat_core::world::Snapshot;
use serde::{Deserialize, Serialize};

use crate::scenario::Scenario;

/// Distance at which a move order counts as arrived.
const ARRIVAL_TOLERANCE: f64 = 0.05;

/// One shot fired during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Firing unit.
    pub attacker: UnitId,
    /// Unit hit.
    pub target: UnitId,
    /// Damage dealt, before shields.
    pub damage: f64,
}

/// What happened while a tick played out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickEvents {
    /// Shots in firing order.
    pub hits: Vec<Hit>,
    /// Units that died, in id order.
    pub killed: Vec<UnitId>,
}

enum Intent {
    MoveTo(Vec2),
    Fire(UnitId),
}

/// Units on the map plus the scripted enemy movement.
#[derive(Debug, Clone)]
pub struct Arena {
    units: BTreeMap<UnitId, UnitObservation>,
    velocities: BTreeMap<UnitId, Vec2>,
    size: Vec2,
    loops_per_tick: u64,
}

impl Arena {
    /// Arena of `size` holding `units`.
    #[must_use]
    pub fn new(size: Vec2, loops_per_tick: u64, units: Vec<UnitObservation>) -> Self {
        Self {
            units: units.into_iter().map(|u| (u.id, u)).collect(),
            velocities: BTreeMap::new(),
            size,
            loops_per_tick,
        }
    }

    /// Arena at the start of `scenario`.
    #[must_use]
    pub fn from_scenario(scenario: &Scenario, table: &UnitDataTable) -> Self {
        let mut arena = Self::new(scenario.map_size, scenario.loops_per_tick, scenario.initial_units(table));
        for placement in scenario.units.iter().filter(|p| p.alliance == Alliance::Enemy) {
            if let Some(velocity) = placement.velocity {
                arena.velocities.insert(placement.id, velocity);
            }
        }
        arena
    }

    /// Move enemy `id` by `velocity` every tick.
    #[must_use]
    pub fn with_velocity(mut self, id: UnitId, velocity: Vec2) -> Self {
        self.velocities.insert(id, velocity);
        self
    }

    /// What the bot observes at `tick`.
    #[must_use]
    pub fn snapshot(&self, tick: u64) -> Snapshot {
        Snapshot::new(tick, tick * self.loops_per_tick, self.units.values().cloned().collect())
    }

    /// Alive units in id order.
    pub fn units(&self) -> impl Iterator<Item = &UnitObservation> {
        self.units.values()
    }

    /// Alive unit `id`.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&UnitObservation> {
        self.units.get(&id)
    }

    /// Alive units of `alliance`.
    #[must_use]
    pub fn count(&self, alliance: Alliance) -> usize {
        self.units.values().filter(|u| u.alliance == alliance).count()
    }

    /// Hash of every unit's quantized position, health and shield.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for (id, unit) in &self.units {
            id.hash(&mut hasher);
            unit.position.map(Vec2::quantized_bits).hash(&mut hasher);
            quantize(unit.health).hash(&mut hasher);
            quantize(unit.shield).hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Hand `batch` to the units, then play one tick out.
    pub fn apply(&mut self, batch: &CommandBatch, table: &UnitDataTable) -> TickEvents {
        for command in batch.commands() {
            for id in &command.unit_ids {
                if let Some(unit) = self.units.get_mut(id) {
                    if !command.queue {
                        unit.orders.clear();
                    }
                    unit.orders.push(command.to_observed());
                }
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let step = self.loops_per_tick as f64;
        let units: Vec<Unit> = self
            .units
            .values()
            .filter_map(|o| Unit::from_observation(o, table).ok())
            .collect();
        let intents: Vec<(UnitId, Intent)> = units
            .iter()
            .filter_map(|unit| {
                let intent = match unit.alliance {
                    Alliance::Friendly => friendly_intent(unit, &units, table, step),
                    Alliance::Enemy => self.enemy_intent(unit, &units, table),
                    Alliance::Neutral => None,
                };
                intent.map(|i| (unit.id, i))
            })
            .collect();

        for unit in self.units.values_mut() {
            unit.weapon_cooldown = (unit.weapon_cooldown - step).max(0.0);
        }

        let mut events = TickEvents::default();
        for (id, intent) in intents {
            match intent {
                Intent::MoveTo(to) => self.move_unit(id, to.clamp_to_bounds(self.size.x, self.size.y)),
                Intent::Fire(target) => {
                    if let Some(hit) = self.fire(id, target, &units, table) {
                        events.hits.push(hit);
                    }
                }
            }
        }

        events.killed = self
            .units
            .iter()
            .filter(|(_, u)| u.health <= 0.0)
            .map(|(id, _)| *id)
            .collect();
        self.units.retain(|_, u| u.health > 0.0);
        for unit in self.units.values_mut() {
            unit.orders
                .retain(|o| o.target_unit_id.map_or(true, |t| !events.killed.contains(&t)));
        }
        for id in &events.killed {
            self.velocities.remove(id);
        }
        events
    }

    fn enemy_intent(&self, unit: &Unit, units: &[Unit], table: &UnitDataTable) -> Option<Intent> {
        let reachable = units
            .iter()
            .filter(|u| u.alliance == Alliance::Friendly && in_reach(table, unit, u));
        match closest_unit(reachable, unit.position) {
            Some(target) if weapon_ready(unit) => Some(Intent::Fire(target.id)),
            Some(_) => None,
            None => self.velocities.get(&unit.id).map(|v| Intent::MoveTo(unit.position + *v)),
        }
    }

    fn move_unit(&mut self, id: UnitId, to: Vec2) {
        if let Some(unit) = self.units.get_mut(&id) {
            unit.position = Some(to);
            let arrived = unit.orders.first().is_some_and(|o| {
                o.ability == Ability::Move && o.target_position.is_some_and(|p| p.distance(to) <= ARRIVAL_TOLERANCE)
            });
            if arrived {
                unit.orders.remove(0);
            }
        }
    }

    fn fire(&mut self, attacker: UnitId, target: UnitId, units: &[Unit], table: &UnitDataTable) -> Option<Hit> {
        let shooter = units.iter().find(|u| u.id == attacker)?;
        let victim = units.iter().find(|u| u.id == target)?;
        let weapon = table.weapon_that_can_attack(&shooter.unit_type, victim)?;
        let damage = table.weapon_damage(shooter, victim);

        if let Some(unit) = self.units.get_mut(&attacker) {
            unit.weapon_cooldown = weapon.cycle_time * GAME_LOOPS_PER_SECOND;
        }
        let unit = self.units.get_mut(&target)?;
        let absorbed = damage.min(unit.shield);
        unit.shield -= absorbed;
        unit.health -= damage - absorbed;
        Some(Hit {
            attacker,
            target,
            damage,
        })
    }
}

fn friendly_intent(unit: &Unit, units: &[Unit], table: &UnitDataTable, step: f64) -> Option<Intent> {
    let order = unit.orders.first()?;
    let target = order.target_unit_id.and_then(|id| units.iter().find(|u| u.id == id));
    match (order.ability, target, order.target_position) {
        (Ability::Attack, Some(target), _) if in_reach(table, unit, target) => {
            weapon_ready(unit).then_some(Intent::Fire(target.id))
        }
        (Ability::Attack, None, Some(position)) => {
            let hostile = units.iter().filter(|u| u.alliance == Alliance::Enemy && in_reach(table, unit, u));
            match closest_unit(hostile, unit.position) {
                Some(enemy) => weapon_ready(unit).then_some(Intent::Fire(enemy.id)),
                None => Some(Intent::MoveTo(step_towards(unit, position, step))),
            }
        }
        (Ability::Attack | Ability::Smart, Some(target), _) => {
            Some(Intent::MoveTo(step_towards(unit, target.position, step)))
        }
        (Ability::Move, _, Some(position)) => Some(Intent::MoveTo(step_towards(unit, position, step))),
        _ => None,
    }
}

fn weapon_ready(unit: &Unit) -> bool {
    unit.weapon_cooldown <= 0.0
}

fn in_reach(table: &UnitDataTable, attacker: &Unit, target: &Unit) -> bool {
    table
        .weapon_that_can_attack(&attacker.unit_type, target)
        .is_some_and(|w| attacker.distance_to(target) <= w.range + attacker.radius + target.radius)
}

fn step_towards(unit: &Unit, to: Vec2, step: f64) -> Vec2 {
    let travel = unit.travel_per_step(step);
    if unit.position.distance(to) <= travel {
        to
    } else {
        unit.position.offset(unit.position.direction_to(to), travel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use combat_core::command::Command;
    use combat_test_utils::fixtures::{enemy, friendly, standard_table};

    fn arena(units: Vec<UnitObservation>) -> Arena {
        Arena::new(Vec2::new(100.0, 100.0), 8, units)
    }

    fn batch(commands: Vec<Command>) -> CommandBatch {
        let mut batch = CommandBatch::new(1);
        for command in commands {
            batch.push(command);
        }
        batch
    }

    #[test]
    fn test_move_order_walks_and_arrives() {
        let table = standard_table();
        let mut arena = arena(vec![friendly(1, "rifleman", 10.0, 10.0)]);
        // 3.15 speed over 8 loops is 1.575 per tick.
        arena.apply(&batch(vec![Command::move_to(1, Vec2::new(13.0, 10.0))]), &table);
        let unit = arena.unit(1).unwrap();
        assert!((unit.position.unwrap().x - 11.575).abs() < 1e-9);
        assert_eq!(unit.orders.len(), 1);

        arena.apply(&CommandBatch::new(2), &table);
        let unit = arena.unit(1).unwrap();
        assert_eq!(unit.position, Some(Vec2::new(13.0, 10.0)));
        assert!(unit.orders.is_empty());
    }

    #[test]
    fn test_attack_fires_then_reloads() {
        let table = standard_table();
        let mut arena = arena(vec![friendly(1, "brute", 10.0, 10.0), enemy(2, "rifleman", 14.0, 10.0)]);
        let events = arena.apply(&batch(vec![Command::attack_unit(1, 2)]), &table);
        assert_eq!(
            events.hits,
            vec![
                Hit {
                    attacker: 1,
                    target: 2,
                    damage: 20.0
                },
                Hit {
                    attacker: 2,
                    target: 1,
                    damage: 10.0
                },
            ]
        );
        assert_eq!(arena.unit(2).unwrap().health, 130.0);
        assert_eq!(arena.unit(1).unwrap().weapon_cooldown, 1.4 * 16.0);

        // Still reloading: 22.4 - 8 loops left.
        let events = arena.apply(&CommandBatch::new(2), &table);
        assert!(events.hits.is_empty());
    }

    #[test]
    fn test_shield_absorbs_first_and_dead_units_leave() {
        let table = standard_table();
        let mut blade = enemy(2, "blade", 10.5, 10.0);
        blade.shield = 10.0;
        blade.health = 5.0;
        let mut arena = arena(vec![friendly(1, "brute", 10.0, 10.0), blade]);
        let events = arena.apply(&batch(vec![Command::attack_unit(1, 2)]), &table);
        assert_eq!(events.killed, vec![2]);
        assert!(arena.unit(2).is_none());
        assert!(arena.unit(1).unwrap().orders.is_empty());
        assert_eq!(arena.count(Alliance::Enemy), 0);
    }

    #[test]
    fn test_enemy_follows_velocity_until_in_reach() {
        let table = standard_table();
        let mut arena = arena(vec![friendly(1, "rifleman", 10.0, 10.0), enemy(2, "rifleman", 22.0, 10.0)])
            .with_velocity(2, Vec2::new(-1.0, 0.0));
        for tick in 1..=7 {
            arena.apply(&CommandBatch::new(tick), &table);
        }
        // Reach is 5 + 0.5 + 0.5: the enemy stops at x = 16 and opens fire.
        assert_eq!(arena.unit(2).unwrap().position, Some(Vec2::new(16.0, 10.0)));
        assert!(arena.unit(1).unwrap().health < 150.0);
    }

    #[test]
    fn test_snapshot_advances_game_loop() {
        let arena = arena(vec![friendly(1, "rifleman", 10.0, 10.0)]);
        let snap = arena.snapshot(5);
        assert_eq!(snap.game_loop, 40);
        assert_eq!(snap.units.len(), 1);
    }
}
