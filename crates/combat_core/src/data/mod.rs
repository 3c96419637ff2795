//! Data structures for unit type definitions.
//!
//! Pure data describing unit types, their weapons and the upgrade levels of
//! each side. Everything here deserializes from RON so tables can live next
//! to scenarios and be validated offline.

mod unit_data;

pub use unit_data::{
    Attribute, DamageBonus, TargetClass, UnitDataTable, UnitTypeData, UpgradeLevels, Upgrades,
    Weapon,
};
