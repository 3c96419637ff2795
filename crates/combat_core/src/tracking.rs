//! Enemy position history and linear extrapolation.
//!
//! The tracker is the only state the combat core carries from one tick to
//! the next. It keeps the last two observed positions of every enemy and
//! projects where the enemy will be a moment later.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::math::Vec2;
use crate::unit::{Unit, UnitId};

/// One observed position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    /// Observed position.
    pub position: Vec2,
    /// Game loop of the observation.
    pub time: f64,
}

/// Ring buffer holding the two most recent samples of one unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionHistory {
    slots: [Option<PositionSample>; 2],
    head: usize,
}

impl PositionHistory {
    /// Empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [None, None],
            head: 0,
        }
    }

    /// Record a sample, overwriting the oldest one.
    ///
    /// A sample with the same time stamp as the latest one is ignored and
    /// `false` is returned, so feeding the same snapshot twice is harmless.
    pub fn push(&mut self, position: Vec2, time: f64) -> bool {
        if self.current().is_some_and(|s| s.time == time) {
            return false;
        }
        let next = match self.slots[self.head] {
            None => self.head,
            Some(_) => (self.head + 1) % 2,
        };
        self.slots[next] = Some(PositionSample { position, time });
        self.head = next;
        true
    }

    /// Most recent sample.
    #[must_use]
    pub fn current(&self) -> Option<PositionSample> {
        self.slots[self.head]
    }

    /// Sample before the most recent one.
    #[must_use]
    pub fn previous(&self) -> Option<PositionSample> {
        self.slots[(self.head + 1) % 2]
    }

    /// Number of stored samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Whether no sample has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current().is_none()
    }

    /// Position linearly extrapolated to time `at`.
    ///
    /// Falls back to the latest sample when only one exists or both share a
    /// time stamp.
    #[must_use]
    pub fn project(&self, at: f64) -> Option<Vec2> {
        let current = self.current()?;
        let Some(previous) = self.previous() else {
            return Some(current.position);
        };
        let elapsed = current.time - previous.time;
        if elapsed == 0.0 {
            return Some(current.position);
        }
        let velocity = (current.position - previous.position) / elapsed;
        Some(current.position + velocity * (at - current.time))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct TrackedEnemy {
    history: PositionHistory,
    last_seen_tick: u64,
}

/// Position histories of every enemy seen recently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnemyTracker {
    enemies: BTreeMap<UnitId, TrackedEnemy>,
}

impl EnemyTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the positions of `enemies` observed at `time` during `tick`.
    /// Returns how many histories received a new sample.
    pub fn update<'a>(&mut self, tick: u64, time: f64, enemies: impl IntoIterator<Item = &'a Unit>) -> usize {
        let mut updated = 0;
        for enemy in enemies {
            let entry = self.enemies.entry(enemy.id).or_insert(TrackedEnemy {
                history: PositionHistory::new(),
                last_seen_tick: tick,
            });
            entry.last_seen_tick = entry.last_seen_tick.max(tick);
            if entry.history.push(enemy.position, time) {
                updated += 1;
            }
        }
        updated
    }

    /// Forget enemies not seen for more than `retention` ticks.
    pub fn prune(&mut self, tick: u64, retention: u64) {
        self.enemies
            .retain(|_, e| tick.saturating_sub(e.last_seen_tick) <= retention);
    }

    /// History of one enemy.
    #[must_use]
    pub fn history(&self, unit: UnitId) -> Option<&PositionHistory> {
        self.enemies.get(&unit).map(|e| &e.history)
    }

    /// Projected position of `unit` at time `at`, or its observed position
    /// when there is no usable history.
    #[must_use]
    pub fn projected_position(&self, unit: &Unit, at: f64) -> Vec2 {
        self.history(unit.id)
            .and_then(|h| h.project(at))
            .filter(|p| p.is_finite())
            .unwrap_or(unit.position)
    }

    /// Number of tracked enemies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.enemies.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.enemies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{UnitDataTable, UnitTypeData};
    use crate::unit::{Alliance, UnitObservation};

    fn enemy_at(id: UnitId, x: f64) -> Unit {
        let table = UnitDataTable::new().with_unit("scout", UnitTypeData::new(40.0, 4.0).with_radius(0.5));
        let obs = UnitObservation::new(id, Alliance::Enemy, "scout", Vec2::new(x, 0.0));
        Unit::from_observation(&obs, &table).unwrap()
    }

    #[test]
    fn test_ring_buffer_keeps_two_latest() {
        let mut history = PositionHistory::new();
        assert!(history.is_empty());
        history.push(Vec2::new(0.0, 0.0), 0.0);
        history.push(Vec2::new(1.0, 0.0), 1.0);
        history.push(Vec2::new(2.0, 0.0), 2.0);
        assert_eq!(history.len(), 2);
        assert_eq!(history.current().unwrap().position, Vec2::new(2.0, 0.0));
        assert_eq!(history.previous().unwrap().position, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_projection_linear() {
        let mut history = PositionHistory::new();
        history.push(Vec2::new(10.0, 0.0), 0.0);
        history.push(Vec2::new(12.0, 0.0), 1.0);
        assert_eq!(history.project(2.0), Some(Vec2::new(14.0, 0.0)));
    }

    #[test]
    fn test_projection_single_sample() {
        let mut history = PositionHistory::new();
        assert_eq!(history.project(5.0), None);
        history.push(Vec2::new(3.0, 4.0), 1.0);
        assert_eq!(history.project(5.0), Some(Vec2::new(3.0, 4.0)));
    }

    #[test]
    fn test_same_time_stamp_ignored() {
        let mut history = PositionHistory::new();
        history.push(Vec2::new(10.0, 0.0), 0.0);
        history.push(Vec2::new(12.0, 0.0), 1.0);
        assert!(!history.push(Vec2::new(50.0, 0.0), 1.0));
        assert_eq!(history.project(2.0), Some(Vec2::new(14.0, 0.0)));
    }

    #[test]
    fn test_tracker_projects_and_prunes() {
        let mut tracker = EnemyTracker::new();
        assert_eq!(tracker.update(0, 0.0, &[enemy_at(1, 10.0)]), 1);
        let moved = enemy_at(1, 12.0);
        assert_eq!(tracker.update(1, 8.0, [&moved]), 1);
        // repeated snapshot is a no-op
        assert_eq!(tracker.update(1, 8.0, [&moved]), 0);
        assert_eq!(tracker.projected_position(&moved, 16.0), Vec2::new(14.0, 0.0));

        let unseen = enemy_at(2, 5.0);
        assert_eq!(tracker.projected_position(&unseen, 16.0), Vec2::new(5.0, 0.0));

        tracker.prune(30, 22);
        assert!(tracker.is_empty());
    }
}
