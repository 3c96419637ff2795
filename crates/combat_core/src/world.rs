//! Read-only view of the world the combat core decides against.
//!
//! The pathfinder, map analysis and strategic strength assessment belong to
//! other parts of the bot. They are reached through [`WorldView`], so the
//! core can be driven by the live game, a headless scenario or a test
//! fixture alike.

use serde::{Deserialize, Serialize};

use crate::math::Vec2;
use crate::unit::UnitObservation;

/// A base location on the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Expansion {
    /// Center of the expansion area.
    pub centroid: Vec2,
    /// Where the town hall stands (or would stand).
    pub townhall_position: Vec2,
    /// Radius of the expansion area around the centroid.
    #[serde(default = "default_area_radius")]
    pub area_radius: f64,
}

const fn default_area_radius() -> f64 {
    6.0
}

impl Expansion {
    /// Expansion with the default area size.
    #[must_use]
    pub const fn new(centroid: Vec2, townhall_position: Vec2) -> Self {
        Self {
            centroid,
            townhall_position,
            area_radius: default_area_radius(),
        }
    }

    /// Whether `point` lies inside the expansion area.
    #[must_use]
    pub fn contains(&self, point: Vec2) -> bool {
        point.distance_squared(self.centroid) <= self.area_radius * self.area_radius
    }
}

/// Everything observed in one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Decision tick index.
    pub tick: u64,
    /// Game loop at which the snapshot was taken.
    pub game_loop: u64,
    /// Every alive unit of every alliance.
    pub units: Vec<UnitObservation>,
}

impl Snapshot {
    /// Create a snapshot.
    #[must_use]
    pub fn new(tick: u64, game_loop: u64, units: Vec<UnitObservation>) -> Self {
        Self {
            tick,
            game_loop,
            units,
        }
    }
}

/// Map and strategic queries answered by the rest of the bot.
pub trait WorldView {
    /// Playable map size; positions lie within `[0, size.x] x [0, size.y]`.
    fn map_size(&self) -> Vec2;

    /// Whether ground units can stand at `point`.
    fn is_pathable(&self, point: Vec2) -> bool;

    /// Ground path length from `from` to `to`; infinite when unreachable.
    fn path_distance(&self, from: Vec2, to: Vec2) -> f64;

    /// Points along the ground path from `from` to `to`.
    ///
    /// The default walks the straight segment in unit steps.
    fn path(&self, from: Vec2, to: Vec2) -> Vec<Vec2> {
        straight_path(from, to)
    }

    /// Staging point for combat units, if one is designated.
    fn combat_rally(&self) -> Option<Vec2>;

    /// Known expansions.
    fn expansions(&self) -> &[Expansion];

    /// Whether our side is currently assessed weaker overall.
    fn is_outpowered(&self) -> bool {
        false
    }
}

/// Points on the segment `from → to`, one distance unit apart, including
/// both ends.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn straight_path(from: Vec2, to: Vec2) -> Vec<Vec2> {
    let steps = from.distance(to).ceil().max(1.0) as usize;
    (0..=steps)
        .map(|i| from.lerp(to, i as f64 / steps as f64))
        .collect()
}

/// Whether a unit may stand at `point`: in bounds and, for ground units,
/// pathable.
#[must_use]
pub fn is_standable<W: WorldView + ?Sized>(world: &W, point: Vec2, flying: bool) -> bool {
    let size = world.map_size();
    let in_bounds = point.x >= 0.0 && point.y >= 0.0 && point.x <= size.x && point.y <= size.y;
    in_bounds && (flying || world.is_pathable(point))
}

/// Point `distance` away from `from`, continuing past `position`, clamped to
/// the map. `None` when the result is not pathable.
#[must_use]
pub fn move_away_position<W: WorldView + ?Sized>(world: &W, from: Vec2, position: Vec2, distance: f64) -> Option<Vec2> {
    let direction = from.direction_to(position);
    if direction == Vec2::ZERO {
        return None;
    }
    let size = world.map_size();
    let target = position.offset(direction, distance).clamp_to_bounds(size.x, size.y);
    world.is_pathable(target).then_some(target)
}

/// Closest pathable point to `point` within `max_radius`, searching rings of
/// growing radius.
#[must_use]
pub fn nearby_pathable_position<W: WorldView + ?Sized>(world: &W, point: Vec2, max_radius: f64) -> Option<Vec2> {
    if world.is_pathable(point) {
        return Some(point);
    }
    let mut radius = 1.0;
    while radius <= max_radius {
        let found = crate::math::border_positions(point, radius)
            .into_iter()
            .filter(|p| is_standable(world, *p, false))
            .min_by(|a, b| a.distance_squared(point).total_cmp(&b.distance_squared(point)));
        if found.is_some() {
            return found;
        }
        radius += 1.0;
    }
    None
}
