//! Unit-level micro: melee surround, step-back and ranged kiting.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::command::{Command, CommandBatch};
use crate::context::TickContext;
use crate::engagement::should_engage;
use crate::math::{border_positions, Vec2};
use crate::unit::{Unit, UnitId};
use crate::world::{is_standable, move_away_position, WorldView};

/// Where a melee unit ended up in its per-tick decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeleeState {
    /// Hitting the target, or already in range of it.
    Attacking,
    /// Moving to a free spot around the target.
    Surrounding,
    /// Stepping out of a ranged ally's firing line.
    FallingBack,
}

/// Outcome of melee logic.
#[derive(Debug, Clone, PartialEq)]
pub struct MeleeDecision {
    /// Resulting state.
    pub state: MeleeState,
    /// Command to issue; `None` keeps the current order.
    pub command: Option<Command>,
}

/// Damage already assigned to each enemy this tick by earlier decisions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignedDamage {
    damage: BTreeMap<UnitId, f64>,
}

impl AssignedDamage {
    /// Empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Damage assigned to `unit` so far.
    #[must_use]
    pub fn get(&self, unit: UnitId) -> f64 {
        self.damage.get(&unit).copied().unwrap_or(0.0)
    }

    /// Add `amount` to `unit`.
    pub fn add(&mut self, unit: UnitId, amount: f64) {
        *self.damage.entry(unit).or_insert(0.0) += amount;
    }

    /// Health left after assigned damage.
    #[must_use]
    pub fn remaining_health(&self, unit: &Unit) -> f64 {
        unit.effective_health() - self.get(unit.id)
    }
}

/// Micro decisions for one tick.
pub struct Micro<'c, 'a, W: WorldView + ?Sized> {
    ctx: &'c TickContext<'a>,
    world: &'c W,
}

impl<'c, 'a, W: WorldView + ?Sized> Micro<'c, 'a, W> {
    /// Create a micro controller.
    #[must_use]
    pub fn new(ctx: &'c TickContext<'a>, world: &'c W) -> Self {
        Self { ctx, world }
    }

    fn weapon_ready(&self, unit: &Unit) -> bool {
        unit.weapon_cooldown <= self.ctx.config.cooldown_threshold
    }

    /// Weapon range of `unit` against `target` plus both radii.
    #[must_use]
    pub fn attack_radius(&self, unit: &Unit, target: &Unit) -> Option<f64> {
        self.ctx
            .table()
            .weapon_that_can_attack(&unit.unit_type, target)
            .filter(|w| w.is_usable())
            .map(|w| w.range + unit.radius + target.radius)
    }

    /// Melee decision of `unit` against `target` when the fight is favorable.
    #[must_use]
    pub fn melee(&self, unit: &Unit, target: &Unit, batch: &CommandBatch) -> MeleeDecision {
        let Some(attack_radius) = self.attack_radius(unit, target) else {
            return MeleeDecision {
                state: MeleeState::Attacking,
                command: Some(Command::attack_position(unit.id, target.position)),
            };
        };
        let radius = self.ctx.config.engagement_radius;

        let ranged_ally = self.closest_ranged_ally(unit, target);
        let Some(ally) = ranged_ally else {
            return self.surround_or_attack(unit, target, attack_radius, batch);
        };

        let melee_allies: Vec<&Unit> = self
            .ctx
            .friendly_near(unit.position, radius)
            .into_iter()
            .filter(|u| u.is_melee)
            .collect();
        let enemies_near_target = self.ctx.enemies_near(target.position, radius);
        if should_engage(&self.ctx.stats, &melee_allies, &enemies_near_target) {
            return self.surround_or_attack(unit, target, attack_radius, batch);
        }

        if let Some(point) = self.fallback_position(unit, ally, target) {
            return MeleeDecision {
                state: MeleeState::FallingBack,
                command: Some(Command::move_to(unit.id, point)),
            };
        }
        self.surround_or_attack(unit, target, attack_radius, batch)
    }

    /// Closest friendly unit with a ranged weapon (range over 1) able to hit
    /// `target`.
    fn closest_ranged_ally(&self, unit: &Unit, target: &Unit) -> Option<&'c Unit> {
        let table = self.ctx.table();
        self.ctx
            .friendly
            .iter()
            .filter(|a| a.id != unit.id)
            .filter(|a| {
                table
                    .weapon_that_can_attack(&a.unit_type, target)
                    .is_some_and(|w| w.is_usable() && w.range > 1.0)
            })
            .min_by(|a, b| {
                a.position
                    .distance_squared(unit.position)
                    .total_cmp(&b.position.distance_squared(unit.position))
                    .then(a.id.cmp(&b.id))
            })
    }

    /// Spot just behind `ally` on its line to `target`, when the ally cannot
    /// reach the target yet and we are far enough from it for the enemy not
    /// to follow before we get there.
    fn fallback_position(&self, unit: &Unit, ally: &Unit, target: &Unit) -> Option<Vec2> {
        let table = self.ctx.table();
        let ally_range = table
            .weapon_that_can_attack(&ally.unit_type, target)
            .map_or(0.0, |w| w.range);
        let enemy_range = table
            .weapon_that_can_attack(&target.unit_type, unit)
            .map_or(0.0, |w| w.range);

        let ally_edge_distance = ally.distance_to(target) - ally.radius - target.radius;
        let ally_out_of_range = ally_edge_distance > ally_range + self.ctx.travel(ally);
        let far_from_ally =
            unit.distance_to(ally) > enemy_range + self.ctx.travel(target) + self.ctx.travel(unit);
        if !(ally_out_of_range && far_from_ally) {
            return None;
        }
        let direction = ally.position.direction_to(target.position);
        Some(ally.position.offset(direction, -(ally.radius + unit.radius)))
    }

    /// Attack when the weapon is ready and the target is close; hold when
    /// already in range; otherwise move to a free surround spot.
    #[must_use]
    pub fn surround_or_attack(&self, unit: &Unit, target: &Unit, attack_radius: f64, batch: &CommandBatch) -> MeleeDecision {
        let travel = self.ctx.travel(unit);
        if self.weapon_ready(unit) && unit.distance_to(target) <= attack_radius + travel {
            return MeleeDecision {
                state: MeleeState::Attacking,
                command: Some(Command::attack_unit(unit.id, target.id)),
            };
        }
        let projected = self.ctx.projected(target);
        if unit.position.distance(projected) <= attack_radius {
            return MeleeDecision {
                state: MeleeState::Attacking,
                command: None,
            };
        }
        match self.optimal_surround_position(unit, target, projected, attack_radius, batch) {
            Some(point) => MeleeDecision {
                state: MeleeState::Surrounding,
                command: Some(Command::move_to(unit.id, point)),
            },
            None => MeleeDecision {
                state: MeleeState::Attacking,
                command: Some(Command::attack_unit(unit.id, target.id)),
            },
        }
    }

    /// Free point on the attack circle around the target's projected
    /// position, farthest from the unit so units spread around the target.
    #[must_use]
    pub fn optimal_surround_position(
        &self,
        unit: &Unit,
        target: &Unit,
        projected: Vec2,
        attack_radius: f64,
        batch: &CommandBatch,
    ) -> Option<Vec2> {
        let claimed: Vec<(Vec2, f64)> = batch
            .claimed_positions()
            .filter(|(_, ids)| !ids.contains(&unit.id))
            .map(|(point, ids)| {
                let radius = ids
                    .iter()
                    .filter_map(|id| self.ctx.friendly_unit(*id))
                    .map(|u| u.radius)
                    .fold(unit.radius, f64::max);
                (point, radius)
            })
            .collect();

        border_positions(projected, attack_radius)
            .into_iter()
            .filter(|p| is_standable(self.world, *p, unit.is_flying))
            .filter(|p| {
                !self
                    .ctx
                    .friendly
                    .iter()
                    .filter(|a| a.id != unit.id && !a.is_flying)
                    .any(|a| a.position.distance(*p) < a.radius + unit.radius)
            })
            .filter(|p| !claimed.iter().any(|(c, r)| c.distance(*p) < r + unit.radius))
            .filter(|p| {
                !self
                    .ctx
                    .enemies
                    .iter()
                    .filter(|e| e.id != target.id && !e.is_flying)
                    .any(|e| e.position.distance(*p) < e.radius + unit.radius)
            })
            .max_by(|a, b| {
                a.distance_squared(unit.position)
                    .total_cmp(&b.distance_squared(unit.position))
            })
    }

    /// Melee micro when outmatched and unable to outrun the enemy: back off
    /// from melee enemies in contact while the weapon cools down, otherwise
    /// hit the weakest of them. `None` when no melee enemy is in contact.
    #[must_use]
    pub fn melee_step_back(&self, unit: &Unit) -> Option<Command> {
        let table = self.ctx.table();
        let contacting: Vec<&Unit> = self
            .ctx
            .enemies
            .iter()
            .filter(|e| e.is_melee)
            .filter(|e| {
                table
                    .weapon_that_can_attack(&e.unit_type, unit)
                    .is_some_and(|w| e.distance_to(unit) <= w.range + e.radius + unit.radius + self.ctx.travel(e))
            })
            .collect();
        if contacting.is_empty() {
            return None;
        }

        if !self.weapon_ready(unit) {
            #[allow(clippy::cast_precision_loss)]
            let center = contacting
                .iter()
                .fold(Vec2::ZERO, |acc, e| acc + e.position)
                / contacting.len() as f64;
            if let Some(point) = move_away_position(self.world, center, unit.position, self.ctx.travel(unit)) {
                return Some(Command::move_to(unit.id, point));
            }
        }

        contacting
            .iter()
            .filter(|e| table.can_attack(unit, e))
            .min_by(|a, b| {
                a.effective_health()
                    .total_cmp(&b.effective_health())
                    .then(a.id.cmp(&b.id))
            })
            .map(|weakest| Command::attack_unit(unit.id, weakest.id))
    }

    /// Ranged micro against `target`: kite while the weapon cools down,
    /// otherwise pick a target by remaining health and fire.
    #[must_use]
    pub fn ranged(&self, unit: &Unit, target: &Unit, assigned: &mut AssignedDamage) -> Option<Command> {
        let Some(attack_radius) = self.attack_radius(unit, target) else {
            return Some(Command::attack_position(unit.id, target.position));
        };
        let projected = self.ctx.projected(target);
        if !self.weapon_ready(unit) && unit.position.distance(projected) <= attack_radius {
            if let Some(point) = self.kiting_position(unit) {
                return Some(Command::move_to(unit.id, point));
            }
        }
        let chosen = self.choose_target(unit, assigned)?;
        assigned.add(chosen.id, self.ctx.table().weapon_damage(unit, chosen));
        Some(Command::attack_unit(unit.id, chosen.id))
    }

    /// Closest point keeping at least weapon range plus radii away from every
    /// threat, taken from the circles of that distance around each threat.
    #[must_use]
    pub fn kiting_position(&self, unit: &Unit) -> Option<Vec2> {
        let table = self.ctx.table();
        let threats = self.ctx.threats_to(unit, self.ctx.travel(unit));
        let rings: Vec<(Vec2, f64)> = threats
            .iter()
            .map(|t| {
                let range = table
                    .weapon_that_can_attack(&unit.unit_type, t.enemy)
                    .map_or(0.0, |w| w.range);
                (t.projected, range + unit.radius + t.enemy.radius)
            })
            .collect();

        let spacing = (unit.radius * 2.0).max(0.1);
        rings
            .iter()
            .flat_map(|&(center, optimal)| {
                let count = ring_point_count(optimal, spacing);
                let step = std::f64::consts::TAU / f64::from(count);
                (0..count).map(move |i| center.polar_offset(optimal, step * f64::from(i)))
            })
            .filter(|p| is_standable(self.world, *p, unit.is_flying))
            .filter(|p| {
                !self
                    .ctx
                    .friendly
                    .iter()
                    .chain(&self.ctx.enemies)
                    .filter(|o| o.id != unit.id)
                    .any(|o| o.position.distance(*p) < o.radius + unit.radius)
            })
            .filter(|p| rings.iter().all(|(c, optimal)| c.distance(*p) >= optimal - 1e-9))
            .min_by(|a, b| {
                a.distance_squared(unit.position)
                    .total_cmp(&b.distance_squared(unit.position))
            })
    }

    /// Enemy attacking us within our range with the least health left after
    /// assigned damage; otherwise any attackable enemy in the engagement
    /// radius by the same measure.
    fn choose_target(&self, unit: &Unit, assigned: &AssignedDamage) -> Option<&'c Unit> {
        let table = self.ctx.table();
        let radius = self.ctx.config.engagement_radius;
        let attackable: Vec<&'c Unit> = self
            .ctx
            .enemies
            .iter()
            .filter(|e| e.distance_to(unit) <= radius && table.can_attack(unit, e))
            .collect();
        let weakest = |candidates: &mut dyn Iterator<Item = &'c Unit>| {
            candidates.min_by(|a, b| {
                assigned
                    .remaining_health(a)
                    .total_cmp(&assigned.remaining_health(b))
                    .then(a.id.cmp(&b.id))
            })
        };

        let mut immediate = attackable.iter().copied().filter(|e| {
            let targets_us = e
                .orders
                .iter()
                .any(|o| o.ability == crate::command::Ability::Attack && o.target_unit_id == Some(unit.id));
            targets_us && self.attack_radius(unit, e).is_some_and(|r| e.distance_to(unit) <= r)
        });
        weakest(&mut immediate).or_else(|| weakest(&mut attackable.iter().copied()))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn ring_point_count(radius: f64, spacing: f64) -> u32 {
    let circumference = std::f64::consts::TAU * radius;
    ((circumference / spacing).floor() as u32).max(8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Ability, ObservedOrder};
    use crate::config::CombatConfig;
    use crate::context::ValidatedUnits;
    use crate::data::{TargetClass, UnitDataTable, UnitTypeData, Weapon};
    use crate::tracking::EnemyTracker;
    use crate::unit::{Alliance, UnitObservation};
    use crate::world::{Expansion, Snapshot};

    struct Plain;

    impl WorldView for Plain {
        fn map_size(&self) -> Vec2 {
            Vec2::new(100.0, 100.0)
        }

        fn is_pathable(&self, _point: Vec2) -> bool {
            true
        }

        fn path_distance(&self, from: Vec2, to: Vec2) -> f64 {
            from.distance(to)
        }

        fn combat_rally(&self) -> Option<Vec2> {
            None
        }

        fn expansions(&self) -> &[Expansion] {
            &[]
        }
    }

    fn table() -> UnitDataTable {
        UnitDataTable::new()
            .with_unit(
                "zealot",
                UnitTypeData::new(150.0, 3.15)
                    .with_radius(0.5)
                    .with_weapon(Weapon::new(0.1, 8.0, 2, 1.2, TargetClass::Ground)),
            )
            .with_unit(
                "stalker",
                UnitTypeData::new(160.0, 4.13)
                    .with_radius(0.625)
                    .with_weapon(Weapon::new(6.0, 13.0, 1, 1.34, TargetClass::Any)),
            )
            .with_unit(
                "marine",
                UnitTypeData::new(45.0, 3.15)
                    .with_radius(0.375)
                    .with_weapon(Weapon::new(5.0, 6.0, 1, 0.61, TargetClass::Any)),
            )
    }

    fn with_ctx<R>(observations: Vec<UnitObservation>, f: impl FnOnce(&TickContext<'_>) -> R) -> R {
        let table = table();
        let config = CombatConfig::default();
        let tracker = EnemyTracker::new();
        let snapshot = Snapshot::new(0, 0, observations);
        let units = ValidatedUnits::from_snapshot(&snapshot, &table);
        let ctx = TickContext::new(0, 0.0, &table, &config, &tracker, units);
        f(&ctx)
    }

    fn observe(id: u64, alliance: Alliance, kind: &str, x: f64, y: f64, health: f64) -> UnitObservation {
        let mut obs = UnitObservation::new(id, alliance, kind, Vec2::new(x, y));
        obs.health = health;
        obs
    }

    #[test]
    fn test_melee_attacks_when_ready_and_close() {
        with_ctx(
            vec![
                observe(1, Alliance::Friendly, "zealot", 50.0, 50.0, 150.0),
                observe(2, Alliance::Enemy, "marine", 51.0, 50.0, 45.0),
            ],
            |ctx| {
                let micro = Micro::new(ctx, &Plain);
                let unit = &ctx.friendly[0];
                let target = &ctx.enemies[0];
                let decision = micro.melee(unit, target, &CommandBatch::new(0));
                assert_eq!(decision.state, MeleeState::Attacking);
                assert_eq!(decision.command, Some(Command::attack_unit(1, 2)));
            },
        );
    }

    #[test]
    fn test_melee_surrounds_when_far() {
        with_ctx(
            vec![
                observe(1, Alliance::Friendly, "zealot", 40.0, 50.0, 150.0),
                observe(2, Alliance::Enemy, "marine", 50.0, 50.0, 45.0),
            ],
            |ctx| {
                let micro = Micro::new(ctx, &Plain);
                let decision = micro.melee(&ctx.friendly[0], &ctx.enemies[0], &CommandBatch::new(0));
                assert_eq!(decision.state, MeleeState::Surrounding);
                let point = decision.command.unwrap().target_position.unwrap();
                // on the attack circle, on the far side of the target
                assert!((point.distance(Vec2::new(50.0, 50.0)) - 0.975).abs() < 1e-9);
                assert!(point.x > 50.0);
            },
        );
    }

    #[test]
    fn test_surround_skips_claimed_spot() {
        with_ctx(
            vec![
                observe(1, Alliance::Friendly, "zealot", 40.0, 50.0, 150.0),
                observe(3, Alliance::Friendly, "zealot", 40.0, 60.0, 150.0),
                observe(2, Alliance::Enemy, "marine", 50.0, 50.0, 45.0),
            ],
            |ctx| {
                let micro = Micro::new(ctx, &Plain);
                let target = &ctx.enemies[0];
                let mut batch = CommandBatch::new(0);
                let first = micro.melee(&ctx.friendly[0], target, &batch).command.unwrap();
                let first_point = first.target_position.unwrap();
                batch.push(first);
                let second = micro.melee(&ctx.friendly[1], target, &batch).command.unwrap();
                let second_point = second.target_position.unwrap();
                assert!(first_point.distance(second_point) >= 1.0);
            },
        );
    }

    #[test]
    fn test_melee_falls_back_behind_ranged_ally() {
        with_ctx(
            vec![
                observe(1, Alliance::Friendly, "zealot", 40.0, 50.0, 10.0),
                observe(3, Alliance::Friendly, "stalker", 20.0, 50.0, 160.0),
                observe(2, Alliance::Enemy, "marine", 41.5, 50.0, 45.0),
                observe(4, Alliance::Enemy, "marine", 42.0, 51.0, 45.0),
                observe(5, Alliance::Enemy, "marine", 42.0, 49.0, 45.0),
            ],
            |ctx| {
                let micro = Micro::new(ctx, &Plain);
                let decision = micro.melee(&ctx.friendly[0], &ctx.enemies[0], &CommandBatch::new(0));
                assert_eq!(decision.state, MeleeState::FallingBack);
                let point = decision.command.unwrap().target_position.unwrap();
                assert!((point.x - (20.0 - 1.125)).abs() < 1e-9);
            },
        );
    }

    #[test]
    fn test_step_back_on_cooldown() {
        let mut zealot = observe(1, Alliance::Friendly, "zealot", 50.0, 50.0, 150.0);
        zealot.weapon_cooldown = 12.0;
        with_ctx(
            vec![zealot, observe(2, Alliance::Enemy, "zealot", 51.0, 50.0, 150.0)],
            |ctx| {
                let micro = Micro::new(ctx, &Plain);
                let command = micro.melee_step_back(&ctx.friendly[0]).unwrap();
                assert_eq!(command.ability, Ability::Move);
                assert!(command.target_position.unwrap().x < 50.0);
            },
        );
    }

    #[test]
    fn test_step_back_attacks_weakest_when_ready() {
        with_ctx(
            vec![
                observe(1, Alliance::Friendly, "zealot", 50.0, 50.0, 150.0),
                observe(2, Alliance::Enemy, "zealot", 51.0, 50.0, 150.0),
                observe(3, Alliance::Enemy, "zealot", 49.0, 50.0, 20.0),
            ],
            |ctx| {
                let micro = Micro::new(ctx, &Plain);
                let command = micro.melee_step_back(&ctx.friendly[0]).unwrap();
                assert_eq!(command, Command::attack_unit(1, 3));
            },
        );
    }

    #[test]
    fn test_ranged_kites_on_cooldown() {
        let mut stalker = observe(1, Alliance::Friendly, "stalker", 50.0, 50.0, 160.0);
        stalker.weapon_cooldown = 20.0;
        with_ctx(
            vec![stalker, observe(2, Alliance::Enemy, "marine", 54.0, 50.0, 45.0)],
            |ctx| {
                let micro = Micro::new(ctx, &Plain);
                let mut assigned = AssignedDamage::new();
                let command = micro.ranged(&ctx.friendly[0], &ctx.enemies[0], &mut assigned).unwrap();
                assert_eq!(command.ability, Ability::Move);
                let point = command.target_position.unwrap();
                assert!(point.distance(Vec2::new(54.0, 50.0)) >= 7.0 - 1e-6);
                assert_eq!(assigned.get(2), 0.0);
            },
        );
    }

    #[test]
    fn test_ranged_focuses_attacker_and_assigns_damage() {
        let mut attacker = observe(3, Alliance::Enemy, "marine", 54.0, 52.0, 45.0);
        attacker.orders.push(ObservedOrder {
            ability: Ability::Attack,
            target_unit_id: Some(1),
            target_position: None,
        });
        with_ctx(
            vec![
                observe(1, Alliance::Friendly, "stalker", 50.0, 50.0, 160.0),
                observe(2, Alliance::Enemy, "marine", 53.0, 50.0, 10.0),
                attacker,
            ],
            |ctx| {
                let micro = Micro::new(ctx, &Plain);
                let mut assigned = AssignedDamage::new();
                let command = micro.ranged(&ctx.friendly[0], &ctx.enemies[0], &mut assigned).unwrap();
                assert_eq!(command, Command::attack_unit(1, 3));
                assert_eq!(assigned.get(3), 13.0);
            },
        );
    }

    #[test]
    fn test_ranged_spreads_fire_by_remaining_health() {
        with_ctx(
            vec![
                observe(1, Alliance::Friendly, "stalker", 50.0, 50.0, 160.0),
                observe(2, Alliance::Enemy, "marine", 53.0, 50.0, 20.0),
                observe(3, Alliance::Enemy, "marine", 53.0, 52.0, 30.0),
            ],
            |ctx| {
                let micro = Micro::new(ctx, &Plain);
                let mut assigned = AssignedDamage::new();
                assigned.add(2, 13.0);
                let command = micro.ranged(&ctx.friendly[0], &ctx.enemies[0], &mut assigned).unwrap();
                assert_eq!(command, Command::attack_unit(1, 2));
                assert_eq!(assigned.get(2), 26.0);
            },
        );
    }
}
