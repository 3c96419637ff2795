//! Combat statistics: weapon DPS, health ratios and time-to-kill.
//!
//! Everything here is a pure function of the unit-type table, the upgrade
//! levels it carries and the units passed in. Group computations take the
//! whole opposing group as the target mix, so the same DPS figure is used
//! against every member of that group.

use crate::config::CombatConfig;
use crate::data::{UnitDataTable, UnitTypeData, Weapon};
use crate::unit::{Alliance, Unit, UnitTypeId};

/// Aggregate kill times between two groups.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KillTimes {
    /// Time for our group to destroy the enemy group.
    pub ttk: f64,
    /// Time for the enemy group to destroy ours.
    pub ttbk: f64,
}

impl KillTimes {
    /// Whether we win the race (ties favor us).
    #[must_use]
    pub fn favorable(self) -> bool {
        self.ttk <= self.ttbk
    }
}

/// Health ratio `(health + shield) / (health_max + shield_max)`, 0 for a
/// zero denominator.
#[must_use]
pub fn health_ratio(unit: &Unit) -> f64 {
    let max = unit.health_max + unit.shield_max;
    if max > 0.0 {
        unit.effective_health() / max
    } else {
        0.0
    }
}

/// Statistics engine bound to a unit-type table.
#[derive(Debug, Clone, Copy)]
pub struct CombatStats<'a> {
    table: &'a UnitDataTable,
    cycle_normalization: f64,
}

impl<'a> CombatStats<'a> {
    /// Create an engine using `config`'s cycle normalization.
    #[must_use]
    pub fn new(table: &'a UnitDataTable, config: &CombatConfig) -> Self {
        Self {
            table,
            cycle_normalization: config.cycle_normalization,
        }
    }

    /// The underlying type table.
    #[must_use]
    pub const fn table(&self) -> &'a UnitDataTable {
        self.table
    }

    /// Damage per second a unit of `unit_type` belonging to `alliance` deals
    /// against `enemy_mix`.
    ///
    /// Each weapon's damage is summed over the mix entries it can target and
    /// divided by the length of the whole mix; the best weapon wins. Unknown
    /// types and an empty mix yield 0.
    #[must_use]
    pub fn weapon_dps(&self, unit_type: &UnitTypeId, alliance: Alliance, enemy_mix: &[UnitTypeId]) -> f64 {
        let Some(data) = self.table.get(unit_type) else {
            return 0.0;
        };
        if enemy_mix.is_empty() {
            return 0.0;
        }
        let targets: Vec<Option<&UnitTypeData>> = enemy_mix.iter().map(|t| self.table.get(t)).collect();
        let attack_level = self.table.upgrades.of(alliance).attack_level;
        let enemy_armor_level = f64::from(self.table.upgrades.of(alliance.opponent()).armor_level);

        #[allow(clippy::cast_precision_loss)]
        let mix_len = enemy_mix.len() as f64;

        data.weapons
            .iter()
            .filter(|w| w.is_usable())
            .map(|weapon| {
                let splash = splash_multiplier(weapon, &targets);
                let cycle = weapon.cycle_time / self.cycle_normalization;
                let total: f64 = targets
                    .iter()
                    .flatten()
                    .filter(|target| weapon.can_target(target.is_flying))
                    .map(|target| {
                        let hit = weapon.hit_damage(attack_level, &target.attributes, target.armor + enemy_armor_level);
                        hit * f64::from(weapon.attacks) * splash / cycle
                    })
                    .sum();
                total / mix_len
            })
            .fold(0.0, f64::max)
    }

    /// Summed DPS of `units` against the type mix of `targets`.
    #[must_use]
    pub fn group_dps(&self, units: &[&Unit], targets: &[&Unit]) -> f64 {
        let mix: Vec<UnitTypeId> = targets.iter().map(|t| t.unit_type.clone()).collect();
        units
            .iter()
            .map(|u| self.weapon_dps(&u.unit_type, u.alliance, &mix))
            .sum()
    }

    /// Time for `self_units` to destroy `enemy_units` and vice versa.
    ///
    /// An empty enemy group gives `(0, ∞)`, including when both groups are
    /// empty; otherwise an empty own group gives `(∞, 0)`. Group DPS below 1
    /// is floored at 1.
    #[must_use]
    pub fn time_to_kill_and_be_killed(&self, self_units: &[&Unit], enemy_units: &[&Unit]) -> KillTimes {
        if enemy_units.is_empty() {
            return KillTimes {
                ttk: 0.0,
                ttbk: f64::INFINITY,
            };
        }
        if self_units.is_empty() {
            return KillTimes {
                ttk: f64::INFINITY,
                ttbk: 0.0,
            };
        }

        let self_dps = self.group_dps(self_units, enemy_units).max(1.0);
        let enemy_dps = self.group_dps(enemy_units, self_units).max(1.0);
        let ttk = enemy_units.iter().map(|e| e.effective_health() / self_dps).sum();
        let ttbk = self_units.iter().map(|u| u.effective_health() / enemy_dps).sum();
        KillTimes { ttk, ttbk }
    }

    /// Largest damage a single weapon use of any of `enemies` deals to `unit`.
    #[must_use]
    pub fn max_single_hit_damage(&self, enemies: &[&Unit], unit: &Unit) -> f64 {
        enemies
            .iter()
            .map(|e| self.table.weapon_damage(e, unit))
            .fold(0.0, f64::max)
    }

    /// Effective health multiplied by DPS against `enemy_mix`. Units still
    /// under construction count with full health but contribute nothing
    /// until 90% built.
    #[must_use]
    pub fn dps_health(&self, unit: &Unit, enemy_mix: &[UnitTypeId]) -> f64 {
        if unit.build_progress <= 0.9 {
            return 0.0;
        }
        let health = if unit.is_ready() {
            unit.effective_health()
        } else {
            unit.health_max + unit.shield_max
        };
        self.weapon_dps(&unit.unit_type, unit.alliance, enemy_mix) * health
    }
}

/// Extra targets an area weapon hits per attack, estimated from the ground
/// targets in the mix: splash diameter over their average diameter, clamped
/// to `[1, ground targets]`.
#[must_use]
pub fn splash_multiplier(weapon: &Weapon, targets: &[Option<&UnitTypeData>]) -> f64 {
    let Some(diameter) = weapon.splash_diameter else {
        return 1.0;
    };
    let ground: Vec<&UnitTypeData> = targets.iter().flatten().copied().filter(|t| !t.is_flying).collect();
    let diameters: Vec<f64> = ground.iter().filter_map(|t| t.radius).map(|r| r * 2.0).collect();
    if diameters.is_empty() {
        return 1.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let average = diameters.iter().sum::<f64>() / diameters.len() as f64;
    if average <= 0.0 {
        return 1.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let cap = ground.len() as f64;
    (diameter / average).clamp(1.0, cap.max(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Attribute, TargetClass, UpgradeLevels, Upgrades};
    use crate::math::Vec2;
    use crate::unit::UnitObservation;

    fn table() -> UnitDataTable {
        UnitDataTable::new()
            .with_unit(
                "rifleman",
                UnitTypeData::new(150.0, 3.15)
                    .with_radius(0.5)
                    .with_weapon(Weapon::new(5.0, 10.0, 1, 1.4, TargetClass::Any)),
            )
            .with_unit(
                "brute",
                UnitTypeData::new(150.0, 3.15)
                    .with_radius(0.5)
                    .with_weapon(Weapon::new(5.0, 20.0, 1, 1.4, TargetClass::Any)),
            )
            .with_unit(
                "tank",
                UnitTypeData::new(175.0, 3.15)
                    .with_radius(0.875)
                    .with_armor(1.0)
                    .with_attribute(Attribute::Armored)
                    .with_weapon(Weapon::new(7.0, 15.0, 1, 1.4, TargetClass::Ground).with_bonus(Attribute::Armored, 10.0)),
            )
            .with_unit(
                "flyer",
                UnitTypeData::new(100.0, 4.0).with_radius(0.5).flying(),
            )
            .with_unit(
                "baneling",
                UnitTypeData::new(30.0, 3.5)
                    .with_radius(0.375)
                    .with_weapon(Weapon::new(0.25, 16.0, 1, 1.4, TargetClass::Ground).with_splash(2.2)),
            )
    }

    fn unit(table: &UnitDataTable, id: u64, alliance: Alliance, kind: &str, health: f64) -> Unit {
        let mut obs = UnitObservation::new(id, alliance, kind, Vec2::new(id as f64, 0.0));
        obs.health = health;
        Unit::from_observation(&obs, table).unwrap()
    }

    #[test]
    fn test_weapon_dps_basic() {
        let table = table();
        let config = CombatConfig::default();
        let stats = CombatStats::new(&table, &config);
        let dps = stats.weapon_dps(&"rifleman".into(), Alliance::Friendly, &["brute".into()]);
        assert!((dps - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_weapon_dps_averages_over_whole_mix() {
        let table = table();
        let config = CombatConfig::default();
        let stats = CombatStats::new(&table, &config);
        // ground-only weapon: flyer contributes 0 but still counts in the mix
        let dps = stats.weapon_dps(&"tank".into(), Alliance::Friendly, &["brute".into(), "flyer".into()]);
        assert!((dps - 7.5).abs() < 1e-9);
    }

    #[test]
    fn test_weapon_dps_bonus_and_armor() {
        let table = table();
        let config = CombatConfig::default();
        let stats = CombatStats::new(&table, &config);
        // 15 + 10 bonus - 1 armor
        let dps = stats.weapon_dps(&"tank".into(), Alliance::Friendly, &["tank".into()]);
        assert!((dps - 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_weapon_dps_upgrades() {
        let table = table().with_upgrades(UpgradeLevels {
            friendly: Upgrades {
                attack_level: 2,
                armor_level: 0,
            },
            enemy: Upgrades {
                attack_level: 0,
                armor_level: 1,
            },
        });
        let config = CombatConfig::default();
        let stats = CombatStats::new(&table, &config);
        // 10 + 2 attack - 1 enemy armor
        let dps = stats.weapon_dps(&"rifleman".into(), Alliance::Friendly, &["brute".into()]);
        assert!((dps - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_weapon_dps_empty_or_unknown() {
        let table = table();
        let config = CombatConfig::default();
        let stats = CombatStats::new(&table, &config);
        assert_eq!(stats.weapon_dps(&"rifleman".into(), Alliance::Friendly, &[]), 0.0);
        assert_eq!(stats.weapon_dps(&"nothing".into(), Alliance::Friendly, &["brute".into()]), 0.0);
        assert_eq!(stats.weapon_dps(&"flyer".into(), Alliance::Enemy, &["brute".into()]), 0.0);
    }

    #[test]
    fn test_splash_multiplier() {
        let table = table();
        let baneling = table.get(&"baneling".into()).unwrap();
        let weapon = &baneling.weapons[0];
        let ground: Vec<Option<&UnitTypeData>> = (0..5).map(|_| table.get(&"rifleman".into())).collect();
        // 2.2 / 1.0 average diameter
        assert!((splash_multiplier(weapon, &ground) - 2.2).abs() < 1e-9);

        let single = vec![table.get(&"rifleman".into())];
        assert_eq!(splash_multiplier(weapon, &single), 1.0);

        let air = vec![table.get(&"flyer".into()), table.get(&"flyer".into())];
        assert_eq!(splash_multiplier(weapon, &air), 1.0);
    }

    #[test]
    fn test_ttk_edge_cases() {
        let table = table();
        let config = CombatConfig::default();
        let stats = CombatStats::new(&table, &config);
        let a = unit(&table, 1, Alliance::Friendly, "rifleman", 150.0);

        let times = stats.time_to_kill_and_be_killed(&[&a], &[]);
        assert_eq!(times.ttk, 0.0);
        assert!(times.ttbk.is_infinite());

        let times = stats.time_to_kill_and_be_killed(&[], &[&a]);
        assert!(times.ttk.is_infinite());
        assert_eq!(times.ttbk, 0.0);

        let times = stats.time_to_kill_and_be_killed(&[], &[]);
        assert_eq!(times.ttk, 0.0);
        assert!(times.favorable());
    }

    #[test]
    fn test_ttk_duel() {
        let table = table();
        let config = CombatConfig::default();
        let stats = CombatStats::new(&table, &config);
        let ours = unit(&table, 1, Alliance::Friendly, "rifleman", 150.0);
        let theirs = unit(&table, 2, Alliance::Enemy, "brute", 150.0);
        let times = stats.time_to_kill_and_be_killed(&[&ours], &[&theirs]);
        assert!((times.ttk - 15.0).abs() < 1e-9);
        assert!((times.ttbk - 7.5).abs() < 1e-9);
        assert!(!times.favorable());
    }

    #[test]
    fn test_zero_dps_floors_at_one() {
        let table = table();
        let config = CombatConfig::default();
        let stats = CombatStats::new(&table, &config);
        let flyer = unit(&table, 1, Alliance::Friendly, "flyer", 100.0);
        let brute = unit(&table, 2, Alliance::Enemy, "brute", 40.0);
        let times = stats.time_to_kill_and_be_killed(&[&flyer], &[&brute]);
        assert_eq!(times.ttk, 40.0);
    }

    #[test]
    fn test_health_ratio() {
        let table = table();
        let mut a = unit(&table, 1, Alliance::Friendly, "rifleman", 75.0);
        assert!((health_ratio(&a) - 0.5).abs() < 1e-9);
        a.health_max = 0.0;
        assert_eq!(health_ratio(&a), 0.0);
    }

    #[test]
    fn test_max_single_hit_damage() {
        let table = table();
        let config = CombatConfig::default();
        let stats = CombatStats::new(&table, &config);
        let target = unit(&table, 1, Alliance::Friendly, "tank", 175.0);
        let rifle = unit(&table, 2, Alliance::Enemy, "rifleman", 150.0);
        let tank = unit(&table, 3, Alliance::Enemy, "tank", 175.0);
        assert_eq!(stats.max_single_hit_damage(&[&rifle, &tank], &target), 24.0);
        assert_eq!(stats.max_single_hit_damage(&[], &target), 0.0);
    }

    #[test]
    fn test_dps_health_ignores_early_construction() {
        let table = table();
        let config = CombatConfig::default();
        let stats = CombatStats::new(&table, &config);
        let mut a = unit(&table, 1, Alliance::Friendly, "rifleman", 100.0);
        let mix = vec![UnitTypeId::from("brute")];
        assert!((stats.dps_health(&a, &mix) - 1000.0).abs() < 1e-9);
        a.build_progress = 0.5;
        assert_eq!(stats.dps_health(&a, &mix), 0.0);
        a.build_progress = 0.95;
        assert!((stats.dps_health(&a, &mix) - 1500.0).abs() < 1e-9);
    }
}
