//! Unit type table for data-driven combat statistics.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CombatError, Result};
use crate::unit::{Alliance, Unit, UnitTypeId};

/// Which units a weapon can fire at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetClass {
    /// Ground units only.
    Ground,
    /// Air units only.
    Air,
    /// Both ground and air.
    Any,
}

impl TargetClass {
    /// Whether a target with the given flying state is admitted.
    #[must_use]
    pub const fn admits(self, target_is_flying: bool) -> bool {
        match self {
            Self::Any => true,
            Self::Ground => !target_is_flying,
            Self::Air => target_is_flying,
        }
    }
}

/// Unit attributes that weapons may deal bonus damage against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Attribute {
    /// Light units.
    Light,
    /// Armored units.
    Armored,
    /// Biological units.
    Biological,
    /// Mechanical units.
    Mechanical,
    /// Massive units.
    Massive,
    /// Structures.
    Structure,
    /// Psionic units.
    Psionic,
}

/// Extra damage a weapon deals against one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageBonus {
    /// Attribute the bonus applies to.
    pub attribute: Attribute,
    /// Additional damage per attack.
    pub bonus: f64,
}

const fn default_upgrade_bonus() -> f64 {
    1.0
}

/// A single weapon of a unit type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weapon {
    /// Attack range, edge to edge.
    pub range: f64,
    /// Base damage per attack.
    pub damage: f64,
    /// Attacks per weapon cycle.
    pub attacks: u32,
    /// Cycle time in game seconds.
    pub cycle_time: f64,
    /// Which targets this weapon can hit.
    pub target: TargetClass,
    /// Attribute bonus damage table.
    #[serde(default)]
    pub bonuses: Vec<DamageBonus>,
    /// Damage gained per attack upgrade level.
    #[serde(default = "default_upgrade_bonus")]
    pub upgrade_bonus: f64,
    /// Diameter of the area hit by each attack, for splash weapons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub splash_diameter: Option<f64>,
}

impl Weapon {
    /// Create a single-target weapon with no bonuses.
    #[must_use]
    pub fn new(range: f64, damage: f64, attacks: u32, cycle_time: f64, target: TargetClass) -> Self {
        Self {
            range,
            damage,
            attacks,
            cycle_time,
            target,
            bonuses: Vec::new(),
            upgrade_bonus: default_upgrade_bonus(),
            splash_diameter: None,
        }
    }

    /// Add an attribute bonus.
    #[must_use]
    pub fn with_bonus(mut self, attribute: Attribute, bonus: f64) -> Self {
        self.bonuses.push(DamageBonus { attribute, bonus });
        self
    }

    /// Make this an area-effect weapon.
    #[must_use]
    pub fn with_splash(mut self, diameter: f64) -> Self {
        self.splash_diameter = Some(diameter);
        self
    }

    /// Whether this weapon can hit a target with the given flying state.
    #[must_use]
    pub const fn can_target(&self, target_is_flying: bool) -> bool {
        self.target.admits(target_is_flying)
    }

    /// Whether the weapon has every field needed for DPS math.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.attacks > 0 && self.damage > 0.0 && self.cycle_time > 0.0
    }

    /// Damage of one attack after upgrades, attribute bonuses and armor,
    /// floored at zero.
    #[must_use]
    pub fn hit_damage(&self, attack_level: u32, target_attributes: &[Attribute], target_armor: f64) -> f64 {
        let raw = self.damage + f64::from(attack_level) * self.upgrade_bonus
            + self.bonus_against(target_attributes)
            - target_armor;
        raw.max(0.0)
    }

    /// Summed bonus damage against a target with `attributes`.
    #[must_use]
    pub fn bonus_against(&self, attributes: &[Attribute]) -> f64 {
        self.bonuses
            .iter()
            .filter(|b| attributes.contains(&b.attribute))
            .map(|b| b.bonus)
            .sum()
    }
}

/// Data-driven unit type definition.
///
/// # Example RON
///
/// ```ron
/// UnitTypeData(
///     health_max: 45.0,
///     shield_max: 0.0,
///     armor: 0.0,
///     speed: 3.15,
///     radius: Some(0.375),
///     attributes: [Light, Biological],
///     weapons: [
///         Weapon(range: 5.0, damage: 6.0, attacks: 1, cycle_time: 0.61, target: Any),
///     ],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitTypeData {
    /// Maximum health.
    pub health_max: f64,
    /// Maximum shield.
    #[serde(default)]
    pub shield_max: f64,
    /// Base armor.
    #[serde(default)]
    pub armor: f64,
    /// Movement speed in distance per game second.
    #[serde(default)]
    pub speed: f64,
    /// Footprint radius used when an observation omits it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    /// Whether the unit flies.
    #[serde(default)]
    pub is_flying: bool,
    /// Whether the unit is a worker.
    #[serde(default)]
    pub is_worker: bool,
    /// Passenger slots; non-zero for structures units can shelter in.
    #[serde(default)]
    pub cargo_slots: u32,
    /// Attributes used for bonus damage.
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    /// Weapons (empty for non-combatants).
    #[serde(default)]
    pub weapons: Vec<Weapon>,
}

impl UnitTypeData {
    /// Create a ground unit type with no weapons.
    #[must_use]
    pub fn new(health_max: f64, speed: f64) -> Self {
        Self {
            health_max,
            shield_max: 0.0,
            armor: 0.0,
            speed,
            radius: None,
            is_flying: false,
            is_worker: false,
            cargo_slots: 0,
            attributes: Vec::new(),
            weapons: Vec::new(),
        }
    }

    /// Set the shield maximum.
    #[must_use]
    pub fn with_shield(mut self, shield_max: f64) -> Self {
        self.shield_max = shield_max;
        self
    }

    /// Set base armor.
    #[must_use]
    pub fn with_armor(mut self, armor: f64) -> Self {
        self.armor = armor;
        self
    }

    /// Set the default radius.
    #[must_use]
    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = Some(radius);
        self
    }

    /// Add a weapon.
    #[must_use]
    pub fn with_weapon(mut self, weapon: Weapon) -> Self {
        self.weapons.push(weapon);
        self
    }

    /// Add an attribute.
    #[must_use]
    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Mark as flying.
    #[must_use]
    pub fn flying(mut self) -> Self {
        self.is_flying = true;
        self
    }

    /// Mark as worker.
    #[must_use]
    pub fn worker(mut self) -> Self {
        self.is_worker = true;
        self
    }

    /// Give the type passenger slots.
    #[must_use]
    pub fn with_cargo(mut self, slots: u32) -> Self {
        self.cargo_slots = slots;
        self
    }

    /// Melee units have weapons and none of them reach beyond 1.
    #[must_use]
    pub fn is_melee(&self) -> bool {
        !self.weapons.is_empty() && self.weapons.iter().all(|w| w.range <= 1.0)
    }

    /// Whether this type can deal damage at all.
    #[must_use]
    pub fn is_combatant(&self) -> bool {
        self.weapons.iter().any(Weapon::is_usable)
    }

    /// Longest weapon range.
    #[must_use]
    pub fn max_range(&self) -> f64 {
        self.weapons.iter().map(|w| w.range).fold(0.0, f64::max)
    }
}

/// Upgrade levels of one side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upgrades {
    /// Weapon upgrade level.
    #[serde(default)]
    pub attack_level: u32,
    /// Armor upgrade level.
    #[serde(default)]
    pub armor_level: u32,
}

/// Upgrade levels per alliance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeLevels {
    /// Our upgrades.
    #[serde(default)]
    pub friendly: Upgrades,
    /// Opponent upgrades.
    #[serde(default)]
    pub enemy: Upgrades,
}

impl UpgradeLevels {
    /// Upgrades of the given side. Neutral units never have upgrades.
    #[must_use]
    pub fn of(&self, alliance: Alliance) -> Upgrades {
        match alliance {
            Alliance::Friendly => self.friendly,
            Alliance::Enemy => self.enemy,
            Alliance::Neutral => Upgrades::default(),
        }
    }
}

/// Table of unit types plus per-side upgrade levels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitDataTable {
    /// Unit types keyed by identifier.
    #[serde(default)]
    pub units: BTreeMap<UnitTypeId, UnitTypeData>,
    /// Upgrade levels.
    #[serde(default)]
    pub upgrades: UpgradeLevels,
}

impl UnitDataTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a table from RON text.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        ron::from_str(source).map_err(|e| CombatError::DataParseError {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    /// Load a table from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        ron::from_str(&contents).map_err(|e| CombatError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Insert a unit type.
    #[must_use]
    pub fn with_unit(mut self, id: impl Into<UnitTypeId>, data: UnitTypeData) -> Self {
        self.units.insert(id.into(), data);
        self
    }

    /// Replace upgrade levels.
    #[must_use]
    pub fn with_upgrades(mut self, upgrades: UpgradeLevels) -> Self {
        self.upgrades = upgrades;
        self
    }

    /// Look up a unit type.
    #[must_use]
    pub fn get(&self, id: &UnitTypeId) -> Option<&UnitTypeData> {
        self.units.get(id)
    }

    /// Look up a unit type, failing on unknown identifiers.
    pub fn require(&self, id: &UnitTypeId) -> Result<&UnitTypeData> {
        self.units
            .get(id)
            .ok_or_else(|| CombatError::UnknownUnitType(id.clone()))
    }

    /// Whether the target's flying state admits any weapon of `attacker_type`.
    #[must_use]
    pub fn can_attack_type(&self, attacker_type: &UnitTypeId, target_type: &UnitTypeId) -> bool {
        let (Some(attacker), Some(target)) = (self.get(attacker_type), self.get(target_type)) else {
            return false;
        };
        attacker
            .weapons
            .iter()
            .any(|w| w.is_usable() && w.can_target(target.is_flying))
    }

    /// First weapon of `attacker_type` able to hit `target`.
    #[must_use]
    pub fn weapon_that_can_attack(&self, attacker_type: &UnitTypeId, target: &Unit) -> Option<&Weapon> {
        self.get(attacker_type)?
            .weapons
            .iter()
            .find(|w| w.can_target(target.is_flying))
    }

    /// Whether `attacker` has a weapon able to hit `target`.
    #[must_use]
    pub fn can_attack(&self, attacker: &Unit, target: &Unit) -> bool {
        self.weapon_that_can_attack(&attacker.unit_type, target)
            .is_some_and(Weapon::is_usable)
    }

    /// Damage of one weapon use of `attacker` against `target`, after
    /// upgrades and armor. Zero when no usable weapon can hit the target.
    #[must_use]
    pub fn weapon_damage(&self, attacker: &Unit, target: &Unit) -> f64 {
        let Some(weapon) = self
            .weapon_that_can_attack(&attacker.unit_type, target)
            .filter(|w| w.is_usable())
        else {
            return 0.0;
        };
        let (attributes, armor) = self
            .get(&target.unit_type)
            .map_or((&[][..], 0.0), |d| (d.attributes.as_slice(), d.armor));
        let armor = armor + f64::from(self.upgrades.of(target.alliance).armor_level);
        let attack_level = self.upgrades.of(attacker.alliance).attack_level;
        weapon.hit_damage(attack_level, attributes, armor) * f64::from(weapon.attacks)
    }

    /// Longest-range weapon of `attacker_type` hitting targets with the given flying state.
    #[must_use]
    pub fn highest_range_weapon(&self, attacker_type: &UnitTypeId, target_is_flying: bool) -> Option<&Weapon> {
        self.get(attacker_type)?
            .weapons
            .iter()
            .filter(|w| w.can_target(target_is_flying))
            .max_by(|a, b| a.range.total_cmp(&b.range))
    }

    /// Validate internal consistency, returning one message per problem.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (id, data) in &self.units {
            if data.health_max + data.shield_max <= 0.0 {
                problems.push(format!("{id}: health_max + shield_max must be positive"));
            }
            if data.speed < 0.0 {
                problems.push(format!("{id}: negative speed"));
            }
            for (i, weapon) in data.weapons.iter().enumerate() {
                if !weapon.is_usable() {
                    problems.push(format!(
                        "{id}: weapon {i} needs positive damage, attacks and cycle_time"
                    ));
                }
                if weapon.range < 0.0 {
                    problems.push(format!("{id}: weapon {i} has negative range"));
                }
            }
        }
        problems
    }
}
