//! Role tags assigned to friendly units by the orchestrator.
//!
//! Roles are not intrinsic to a unit: they are set and cleared explicitly
//! as combat evolves and live in a [`RoleBook`] keyed by unit id, never on
//! the unit itself.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::unit::UnitId;

/// A role tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// Spellcaster kept behind the fight until needed.
    SupportCaster,
    /// Unit stationed away from the main base.
    Proxy,
    /// Worker pulled to defend; makes it eligible for combat decisions.
    Defending,
    /// An enemy can hit the unit within its effective range.
    Threatened,
    /// The unit was last sent to a retreat destination.
    Retreating,
}

impl Role {
    /// Whether the role is assigned from outside the orchestrator (as
    /// opposed to tracked combat state).
    #[must_use]
    pub const fn is_assignment(self) -> bool {
        match self {
            Self::SupportCaster | Self::Proxy | Self::Defending => true,
            Self::Threatened | Self::Retreating => false,
        }
    }
}

/// Orchestrator-owned decoration of one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDecoration {
    roles: BTreeSet<Role>,
}

impl UnitDecoration {
    /// Whether the role is set.
    #[must_use]
    pub fn has(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Set roles, in order.
    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.roles.iter().copied()
    }

    /// Whether no role is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Role tags for every friendly unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBook {
    units: BTreeMap<UnitId, UnitDecoration>,
}

impl RoleBook {
    /// Create an empty role book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `role` on `unit`. Returns `true` if it was not already set.
    pub fn set(&mut self, unit: UnitId, role: Role) -> bool {
        self.units.entry(unit).or_default().roles.insert(role)
    }

    /// Clear `role` on `unit`. Returns `true` if it was set.
    pub fn clear(&mut self, unit: UnitId, role: Role) -> bool {
        let Some(decoration) = self.units.get_mut(&unit) else {
            return false;
        };
        let removed = decoration.roles.remove(&role);
        if decoration.is_empty() {
            self.units.remove(&unit);
        }
        removed
    }

    /// Set or clear `role` depending on `active`.
    pub fn toggle(&mut self, unit: UnitId, role: Role, active: bool) {
        if active {
            self.set(unit, role);
        } else {
            self.clear(unit, role);
        }
    }

    /// Whether `unit` has `role`.
    #[must_use]
    pub fn has(&self, unit: UnitId, role: Role) -> bool {
        self.units.get(&unit).is_some_and(|d| d.has(role))
    }

    /// Decoration of `unit`, if any role is set.
    #[must_use]
    pub fn get(&self, unit: UnitId) -> Option<&UnitDecoration> {
        self.units.get(&unit)
    }

    /// Units carrying `role`, in id order.
    pub fn units_with(&self, role: Role) -> impl Iterator<Item = UnitId> + '_ {
        self.units
            .iter()
            .filter(move |(_, d)| d.has(role))
            .map(|(id, _)| *id)
    }

    /// Drop decorations of units no longer alive.
    pub fn retain_alive(&mut self, alive: &BTreeSet<UnitId>) {
        self.units.retain(|id, _| alive.contains(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let mut book = RoleBook::new();
        assert!(book.set(1, Role::Threatened));
        assert!(!book.set(1, Role::Threatened));
        assert!(book.has(1, Role::Threatened));
        assert!(book.clear(1, Role::Threatened));
        assert!(!book.has(1, Role::Threatened));
        assert!(book.get(1).is_none());
    }

    #[test]
    fn test_toggle() {
        let mut book = RoleBook::new();
        book.toggle(4, Role::Retreating, true);
        book.toggle(4, Role::Defending, true);
        book.toggle(4, Role::Retreating, false);
        let roles: Vec<Role> = book.get(4).unwrap().roles().collect();
        assert_eq!(roles, vec![Role::Defending]);
    }

    #[test]
    fn test_units_with_role_sorted() {
        let mut book = RoleBook::new();
        book.set(9, Role::SupportCaster);
        book.set(2, Role::SupportCaster);
        book.set(5, Role::Proxy);
        let casters: Vec<UnitId> = book.units_with(Role::SupportCaster).collect();
        assert_eq!(casters, vec![2, 9]);
    }

    #[test]
    fn test_retain_alive() {
        let mut book = RoleBook::new();
        book.set(1, Role::Proxy);
        book.set(2, Role::Proxy);
        book.retain_alive(&BTreeSet::from([2]));
        assert!(!book.has(1, Role::Proxy));
        assert!(book.has(2, Role::Proxy));
    }

    #[test]
    fn test_assignment_roles() {
        assert!(Role::Defending.is_assignment());
        assert!(!Role::Threatened.is_assignment());
    }
}
