//! Fight-or-flight decisions built on [`CombatStats`].
//!
//! [`should_engage`] is the only place the kill-time comparison is made;
//! every other favorability check in the crate goes through it.

use crate::math::Vec2;
use crate::stats::CombatStats;
use crate::unit::{units_within, Unit};

/// Whether `self_units` should fight `enemy_units`: our time-to-kill does
/// not exceed their time-to-kill-us. No enemies means no cost, so the
/// answer is `true` even when both groups are empty.
#[must_use]
pub fn should_engage(stats: &CombatStats<'_>, self_units: &[&Unit], enemy_units: &[&Unit]) -> bool {
    stats
        .time_to_kill_and_be_killed(self_units, enemy_units)
        .favorable()
}

/// Smallest prefix of `candidates` that, added to `base`, makes the fight
/// against `enemies` favorable.
///
/// Empty when there are no enemies or `base` already wins; all candidates
/// when no prefix is enough.
#[must_use]
pub fn minimal_reinforcement<'u>(
    stats: &CombatStats<'_>,
    candidates: &[&'u Unit],
    base: &[&Unit],
    enemies: &[&Unit],
) -> Vec<&'u Unit> {
    if enemies.is_empty() || should_engage(stats, base, enemies) {
        return Vec::new();
    }

    let mut group: Vec<&Unit> = base.to_vec();
    let mut chosen = Vec::with_capacity(candidates.len());
    for &candidate in candidates {
        chosen.push(candidate);
        group.push(candidate);
        if should_engage(stats, &group, enemies) {
            return chosen;
        }
    }
    chosen
}

/// Whether `friendly` units within `radius` of `position` would win against
/// the enemies there.
///
/// Only enemies that can fight are counted. A lone enemy worker is treated
/// as no threat at all.
#[must_use]
pub fn is_stronger_at_position(
    stats: &CombatStats<'_>,
    friendly: &[Unit],
    enemies: &[Unit],
    position: Vec2,
    radius: f64,
) -> bool {
    let table = stats.table();
    let threats: Vec<&Unit> = units_within(enemies, position, radius)
        .into_iter()
        .filter(|e| e.is_worker || table.get(&e.unit_type).is_some_and(|d| d.is_combatant()))
        .collect();

    match threats.as_slice() {
        [] => true,
        [only] if only.is_worker => true,
        _ => {
            let allies = units_within(friendly, position, radius);
            should_engage(stats, &allies, &threats)
        }
    }
}
