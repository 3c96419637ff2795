//! Proptest strategies.
//!
//! Generate random but reproducible fights over the standard unit table.
//! Ids are assigned by position in the generated list so they never
//! collide between the two sides.

use combat_core::math::Vec2;
use combat_core::unit::{Alliance, UnitObservation};
use proptest::prelude::*;

use crate::fixtures::observe;

/// Unit types of the standard table that can fight.
pub const COMBAT_KINDS: [&str; 6] = ["rifleman", "brute", "blade", "crawler", "hawk", "caster"];

/// First id used for enemy units; friendly ids count up from 1.
pub const ENEMY_ID_BASE: u64 = 1000;

/// A combat unit type name.
pub fn arb_kind() -> impl Strategy<Value = &'static str> {
    prop::sample::select(COMBAT_KINDS.to_vec())
}

/// A position inside a `size` × `size` square.
pub fn arb_position(size: f64) -> impl Strategy<Value = Vec2> {
    (0.0..size, 0.0..size).prop_map(|(x, y)| Vec2::new(x, y))
}

/// Health fraction, never zero.
pub fn arb_health_fraction() -> impl Strategy<Value = f64> {
    0.05f64..=1.0
}

/// One unit setup: type, position, health fraction, weapon cooldown.
pub fn arb_unit_setup(size: f64) -> impl Strategy<Value = (&'static str, Vec2, f64, f64)> {
    (arb_kind(), arb_position(size), arb_health_fraction(), 0.0f64..24.0)
}

fn build(alliance: Alliance, id_base: u64, setups: Vec<(&'static str, Vec2, f64, f64)>) -> Vec<UnitObservation> {
    (id_base..)
        .zip(setups)
        .map(|(id, (kind, position, fraction, cooldown))| {
            let mut obs = observe(id, alliance, kind, position.x, position.y);
            obs.health = (obs.health * fraction).max(1.0);
            obs.shield *= fraction;
            obs.weapon_cooldown = cooldown;
            obs
        })
        .collect()
}

/// Up to `max` units of `alliance` inside a `size` square.
pub fn arb_group(alliance: Alliance, max: usize, size: f64) -> impl Strategy<Value = Vec<UnitObservation>> {
    let id_base = match alliance {
        Alliance::Enemy => ENEMY_ID_BASE,
        Alliance::Friendly | Alliance::Neutral => 1,
    };
    prop::collection::vec(arb_unit_setup(size), 0..=max).prop_map(move |setups| build(alliance, id_base, setups))
}

/// A friendly group and an enemy group sharing a `size` square.
pub fn arb_fight(max_per_side: usize, size: f64) -> impl Strategy<Value = (Vec<UnitObservation>, Vec<UnitObservation>)> {
    (
        arb_group(Alliance::Friendly, max_per_side, size),
        arb_group(Alliance::Enemy, max_per_side, size),
    )
}
