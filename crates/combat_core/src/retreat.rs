//! Retreat destination resolution.
//!
//! Given a unit and the enemies threatening it, pick one place to run to.
//! Structured destinations are tried first, in order:
//!
//! 1. the combat rally point, when we are stronger there and can reach it
//!    safely before the primary threat;
//! 2. the nearest ready bunker within the bunker threshold;
//! 3. the closest expansion we reach ahead of its nearest threat along a
//!    safe path;
//! 4. the closest safe spot in a cone facing away from the primary threat;
//! 5. a directional move away from the threats.
//!
//! Every returned point is standable: in bounds and, for ground units,
//! pathable. A destination that is not falls through to the next rule. When
//! nothing qualifies the resolver returns `None` and the caller holds
//! position.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::context::{Threat, TickContext};
use crate::engagement::{is_stronger_at_position, should_engage};
use crate::math::Vec2;
use crate::unit::{units_within, Unit};
use crate::world::{is_standable, move_away_position, nearby_pathable_position, WorldView};

/// Angle between rotated attempts of the directional fallback, in degrees.
const FALLBACK_ROTATION_STEP_DEG: f64 = 15.0;

/// How far from an unpathable town hall spot a replacement check point may be.
const TOWNHALL_SEARCH_RADIUS: f64 = 5.0;

/// Expansions closer than this to the destination are not "on the way".
const DESTINATION_EXCLUSION: f64 = 1.0;

/// A possible retreat destination.
#[derive(Debug, Clone, PartialEq)]
pub struct RetreatCandidate {
    /// Destination point.
    pub point: Vec2,
    /// Whether the path and point passed the safety checks.
    pub safe: bool,
    /// Path distance from the retreating unit.
    pub path_distance: f64,
    /// Centroids of expansions crossed on the way.
    pub expansions_in_path: Vec<Vec2>,
}

/// Which rule produced a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetreatKind {
    /// Combat rally point.
    Rally,
    /// A ready bunker.
    Bunker,
    /// A safe expansion.
    Expansion,
    /// Closest safe spot away from the threat.
    SafeSpot,
    /// Plain move away from the threats.
    Directional,
}

/// A resolved destination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetreatDestination {
    /// Where to go.
    pub point: Vec2,
    /// Rule that chose it.
    pub kind: RetreatKind,
}

/// Resolves retreat destinations against one tick's context.
pub struct RetreatResolver<'c, 'a, W: WorldView + ?Sized> {
    ctx: &'c TickContext<'a>,
    world: &'c W,
}

impl<'c, 'a, W: WorldView + ?Sized> RetreatResolver<'c, 'a, W> {
    /// Create a resolver.
    #[must_use]
    pub fn new(ctx: &'c TickContext<'a>, world: &'c W) -> Self {
        Self { ctx, world }
    }

    /// Destination for `unit` fleeing `enemies`, or `None` to hold position.
    ///
    /// Only enemies within the engagement radius that can hit the unit count
    /// as threats.
    #[must_use]
    pub fn resolve(&self, unit: &Unit, enemies: &[&Unit]) -> Option<RetreatDestination> {
        let travel = self.retreat_travel(unit);
        let radius = self.ctx.config.engagement_radius;
        let mut threats: Vec<Threat<'_>> = enemies
            .iter()
            .filter(|e| e.distance_to(unit) <= radius)
            .filter_map(|e| self.ctx.threat(e, unit, travel))
            .collect();
        if threats.is_empty() {
            return None;
        }
        threats.sort_by(|a, b| {
            b.effective_range
                .total_cmp(&a.effective_range)
                .then(a.enemy.id.cmp(&b.enemy.id))
        });
        let primary = threats[0];

        let bunker = self.nearest_bunker(unit);
        let bunker_distance = bunker.map_or(f64::INFINITY, |(_, d)| d);

        let standable = |(point, kind): (Vec2, RetreatKind)| {
            if is_standable(self.world, point, unit.is_flying) {
                Some(RetreatDestination { point, kind })
            } else {
                trace!(unit = unit.id, ?kind, "Rejected unstandable retreat destination");
                None
            }
        };
        self.rally(unit, &primary, bunker_distance, travel)
            .map(|p| (p, RetreatKind::Rally))
            .and_then(standable)
            .or_else(|| bunker.map(|(p, _)| (p, RetreatKind::Bunker)).and_then(standable))
            .or_else(|| {
                self.safe_expansion(unit, &threats)
                    .map(|c| (c.point, RetreatKind::Expansion))
                    .and_then(standable)
            })
            .or_else(|| {
                self.closest_safe_position(unit, &threats, travel)
                    .map(|p| (p, RetreatKind::SafeSpot))
                    .and_then(standable)
            })
            .or_else(|| {
                self.directional(unit, &threats, travel)
                    .map(|p| (p, RetreatKind::Directional))
                    .and_then(standable)
            })
    }

    /// Per-step travel allowance of a retreating unit: two steps' worth.
    #[must_use]
    pub fn retreat_travel(&self, unit: &Unit) -> f64 {
        self.ctx.travel(unit) * 2.0
    }

    fn rally(&self, unit: &Unit, primary: &Threat<'_>, bunker_distance: f64, travel: f64) -> Option<Vec2> {
        let rally = self.world.combat_rally()?;
        if !is_standable(self.world, rally, unit.is_flying) {
            return None;
        }
        let radius = self.ctx.config.engagement_radius;
        if !is_stronger_at_position(&self.ctx.stats, &self.ctx.friendly, &self.ctx.enemies, rally, radius) {
            trace!(unit = unit.id, "Rally rejected: weaker there");
            return None;
        }
        let unit_distance = self.world.path_distance(unit.position, rally);
        let threat_distance = self.world.path_distance(primary.projected, rally);
        let reachable = unit_distance.is_finite() && unit_distance > travel;
        if !reachable || unit_distance > threat_distance || unit_distance >= bunker_distance {
            trace!(unit = unit.id, unit_distance, threat_distance, bunker_distance, "Rally rejected: distance");
            return None;
        }
        if !self.is_safe_path(unit, &self.world.path(unit.position, rally)) {
            trace!(unit = unit.id, "Rally rejected: path closes on an enemy");
            return None;
        }
        Some(rally)
    }

    /// Nearest ready bunker within the threshold, as a standable point next
    /// to it and its path distance.
    fn nearest_bunker(&self, unit: &Unit) -> Option<(Vec2, f64)> {
        self.ctx
            .ready_bunkers()
            .map(|b| (b, self.world.path_distance(unit.position, b.position)))
            .filter(|(_, d)| d.is_finite() && *d <= self.ctx.config.bunker_threshold)
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.id.cmp(&b.0.id)))
            .and_then(|(bunker, distance)| {
                let point = if unit.is_flying {
                    bunker.position
                } else {
                    nearby_pathable_position(self.world, bunker.position, bunker.radius + unit.radius + 1.0)?
                };
                Some((point, distance))
            })
    }

    /// Every expansion as a retreat candidate, with its safety verdict.
    #[must_use]
    pub fn expansion_candidates(&self, unit: &Unit, threats: &[Threat<'_>]) -> Vec<RetreatCandidate> {
        self.world
            .expansions()
            .iter()
            .filter_map(|expansion| {
                let point = if unit.is_flying {
                    expansion.centroid
                } else {
                    nearby_pathable_position(self.world, expansion.centroid, TOWNHALL_SEARCH_RADIUS)?
                };
                let path_distance = self.world.path_distance(unit.position, point);
                if !path_distance.is_finite() {
                    return None;
                }
                let crossed = self.expansions_in_path(unit, point);
                let safe = self.outruns_nearest_threat(point, path_distance, threats)
                    && self.check_points(unit, point, &crossed);
                Some(RetreatCandidate {
                    point,
                    safe,
                    path_distance,
                    expansions_in_path: crossed.iter().map(|(centroid, _)| *centroid).collect(),
                })
            })
            .collect()
    }

    fn safe_expansion(&self, unit: &Unit, threats: &[Threat<'_>]) -> Option<RetreatCandidate> {
        self.expansion_candidates(unit, threats)
            .into_iter()
            .filter(|c| c.safe)
            .min_by(|a, b| a.path_distance.total_cmp(&b.path_distance))
    }

    /// The unit gets to `point` before the threat closest to it is in range
    /// of it.
    fn outruns_nearest_threat(&self, point: Vec2, unit_distance: f64, threats: &[Threat<'_>]) -> bool {
        let nearest = threats
            .iter()
            .map(|t| (t, self.world.path_distance(t.projected, point)))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        match nearest {
            Some((threat, threat_distance)) => unit_distance < threat_distance - threat.effective_range,
            None => true,
        }
    }

    /// Expansions crossed by the path to `point`, as `(centroid, check point)`.
    fn expansions_in_path(&self, unit: &Unit, point: Vec2) -> Vec<(Vec2, Vec2)> {
        let path = self.world.path(unit.position, point);
        let radius = self.ctx.config.engagement_radius;
        self.world
            .expansions()
            .iter()
            .filter(|e| {
                e.centroid.distance(point) >= DESTINATION_EXCLUSION && e.centroid.distance(unit.position) > radius
            })
            .filter(|e| path.iter().any(|p| e.contains(*p)))
            .filter_map(|e| {
                let check = if unit.is_flying {
                    e.townhall_position
                } else {
                    nearby_pathable_position(self.world, e.townhall_position, TOWNHALL_SEARCH_RADIUS)?
                };
                Some((e.centroid, check))
            })
            .collect()
    }

    fn check_points(&self, unit: &Unit, point: Vec2, crossed: &[(Vec2, Vec2)]) -> bool {
        crossed
            .iter()
            .map(|(_, check)| *check)
            .chain(std::iter::once(point))
            .all(|p| self.is_point_safe(unit, p))
    }

    /// Whether moving `unit` towards `point` is safe: no enemy would be in
    /// range of the point while we close in on it, and our units there would
    /// win against the enemies there.
    #[must_use]
    pub fn is_point_safe(&self, unit: &Unit, point: Vec2) -> bool {
        let closing = self.ctx.enemies.iter().any(|enemy| self.closes_on(unit, enemy, point));
        if closing {
            return false;
        }
        let radius = self.ctx.config.engagement_radius;
        let allies: Vec<&Unit> = units_within(&self.ctx.friendly, point, radius)
            .into_iter()
            .filter(|a| !a.is_worker)
            .collect();
        let enemies = self.ctx.enemies_near(point, radius);
        should_engage(&self.ctx.stats, &allies, &enemies)
    }

    /// Whether `point` is within `enemy`'s reach and moving there heads
    /// towards the enemy.
    fn closes_on(&self, unit: &Unit, enemy: &Unit, point: Vec2) -> bool {
        let Some(weapon) = self.ctx.table().weapon_that_can_attack(&enemy.unit_type, unit) else {
            return false;
        };
        if weapon.range <= 0.0 {
            return false;
        }
        let projected = self.ctx.projected(enemy);
        let reach = weapon.range + unit.radius + enemy.radius;
        let towards_enemy = projected - unit.position;
        let movement = point - unit.position;
        towards_enemy.dot(movement) > 0.0 && point.distance_squared(projected) <= reach * reach
    }

    /// Path check used for the rally: at every path point the nearest enemy
    /// must not be closing in.
    fn is_safe_path(&self, unit: &Unit, path: &[Vec2]) -> bool {
        path.iter().all(|point| {
            let nearest = self.ctx.enemies.iter().min_by(|a, b| {
                self.ctx
                    .projected(a)
                    .distance_squared(*point)
                    .total_cmp(&self.ctx.projected(b).distance_squared(*point))
                    .then(a.id.cmp(&b.id))
            });
            nearest.map_or(true, |enemy| !self.closes_on(unit, enemy, *point))
        })
    }

    /// Closest point in the half circle facing away from the primary threat
    /// that every threat cannot reach.
    fn closest_safe_position(&self, unit: &Unit, threats: &[Threat<'_>], travel: f64) -> Option<Vec2> {
        let config = self.ctx.config;
        let primary = threats.first()?;
        let away = primary.projected.direction_to(unit.position);
        if away == Vec2::ZERO {
            return None;
        }
        let base_angle = away.y.atan2(away.x);
        let angle_step = config.safe_search_angle_step_deg.to_radians();
        let half_cone = std::f64::consts::FRAC_PI_2;
        let safety_radius = self.safety_radius(unit, threats, travel);

        let mut radius = travel.max(config.safe_search_radius_step);
        while radius <= config.safe_search_max_radius {
            let mut best: Option<Vec2> = None;
            let mut angle = -half_cone;
            while angle <= half_cone + 1e-9 {
                let point = unit.position.polar_offset(radius, base_angle + angle);
                if self.is_safe_spot(unit, point, threats, safety_radius)
                    && best.map_or(true, |b| point.distance_squared(unit.position) < b.distance_squared(unit.position))
                {
                    best = Some(point);
                }
                angle += angle_step;
            }
            if best.is_some() {
                return best;
            }
            radius += config.safe_search_radius_step;
        }
        None
    }

    fn safety_radius(&self, unit: &Unit, threats: &[Threat<'_>], travel: f64) -> f64 {
        let reach = threats
            .iter()
            .map(|t| t.weapon.range + t.enemy.radius + self.ctx.travel(t.enemy))
            .fold(0.0, f64::max);
        reach + unit.radius + travel
    }

    fn is_safe_spot(&self, unit: &Unit, point: Vec2, threats: &[Threat<'_>], safety_radius: f64) -> bool {
        if !is_standable(self.world, point, unit.is_flying) {
            return false;
        }
        let nearest = threats.iter().min_by(|a, b| {
            a.projected
                .distance_squared(point)
                .total_cmp(&b.projected.distance_squared(point))
        });
        if let Some(nearest) = nearest {
            if nearest.projected.distance(point) <= nearest.projected.distance(unit.position) {
                return false;
            }
        }
        if threats.iter().any(|t| t.projected.distance(point) <= t.effective_range) {
            return false;
        }
        let safety_sq = safety_radius * safety_radius;
        !self
            .ctx
            .enemies
            .iter()
            .any(|e| self.ctx.projected(e).distance_squared(point) <= safety_sq)
    }

    /// Move away from the threats: from the proximity-weighted average
    /// direction when there are several, straight away from the primary
    /// threat otherwise.
    fn directional(&self, unit: &Unit, threats: &[Threat<'_>], travel: f64) -> Option<Vec2> {
        if threats.len() > 1 {
            if let Some(point) = self.away_from_many(unit, threats) {
                return Some(point);
            }
        }
        let primary = threats.first()?;
        if unit.is_flying {
            let size = self.world.map_size();
            let away = primary.projected.direction_to(unit.position);
            return (away != Vec2::ZERO).then(|| unit.position.offset(away, travel).clamp_to_bounds(size.x, size.y));
        }
        move_away_position(self.world, primary.projected, unit.position, travel)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn away_from_many(&self, unit: &Unit, threats: &[Threat<'_>]) -> Option<Vec2> {
        let weights: Vec<f64> = threats
            .iter()
            .map(|t| 1.0 / t.projected.distance(unit.position).max(f64::EPSILON))
            .collect();
        let total: f64 = weights.iter().sum();
        let offset = threats
            .iter()
            .zip(&weights)
            .fold(Vec2::ZERO, |acc, (t, w)| acc + (t.projected - unit.position) * (w / total));
        if offset == Vec2::ZERO || !offset.is_finite() {
            return None;
        }

        let size = self.world.map_size();
        let retreat = offset * -self.ctx.config.retreat_distance;
        let step = FALLBACK_ROTATION_STEP_DEG.to_radians();
        let rotations = (180.0 / FALLBACK_ROTATION_STEP_DEG) as i32;
        (0..=rotations)
            .flat_map(|i| if i == 0 { vec![0.0] } else { vec![step * f64::from(i), -step * f64::from(i)] })
            .map(|angle| (unit.position + retreat.rotate(angle)).clamp_to_bounds(size.x, size.y))
            .find(|point| is_standable(self.world, *point, unit.is_flying))
    }
}
