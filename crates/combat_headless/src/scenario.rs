//! Scenario loading and configuration.
//!
//! A scenario describes one scripted fight: the map, the units on both
//! sides, how the enemies move, and which unit data and combat
//! configuration the orchestrator runs with. Scenarios are RON files; a few
//! ship built in.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use combat_core::config::CombatConfig;
use combat_core::data::UnitDataTable;
use combat_core::error::CombatError;
use combat_core::math::Vec2;
use combat_core::unit::{Alliance, UnitId, UnitObservation};
use combat_core::world::{straight_path, Expansion, WorldView};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unit roster used when a scenario does not bring its own.
pub const DEFAULT_UNIT_DATA: &str = include_str!("../data/units.ron");

const BUILTIN_SCENARIOS: [(&str, &str); 3] = [
    ("skirmish", include_str!("../scenarios/skirmish.ron")),
    ("bunker_defense", include_str!("../scenarios/bunker_defense.ron")),
    ("melee_brawl", include_str!("../scenarios/melee_brawl.ron")),
];

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// Neither a file nor a built-in scenario of that name exists.
    #[error("Scenario not found: {0}")]
    NotFound(String),
    /// Failed to read or write a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// Failed to encode JSON output.
    #[error("Failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
    /// Unit data, config or decision log error from the combat core.
    #[error(transparent)]
    Combat(#[from] CombatError),
    /// The scenario is well-formed but unusable.
    #[error("Scenario '{name}' is invalid: {problems}")]
    Invalid {
        /// Scenario name.
        name: String,
        /// Every problem found, joined.
        problems: String,
    },
}

/// Axis-aligned unpathable region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Lower-left corner.
    pub min: Vec2,
    /// Upper-right corner.
    pub max: Vec2,
}

impl Region {
    /// Whether `point` lies inside, borders included.
    #[must_use]
    pub fn contains(&self, point: Vec2) -> bool {
        (self.min.x..=self.max.x).contains(&point.x) && (self.min.y..=self.max.y).contains(&point.y)
    }
}

/// Where the unit-type table comes from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum UnitDataSource {
    /// The roster shipped with the runner.
    #[default]
    Builtin,
    /// A RON file, relative to the scenario file.
    File(PathBuf),
    /// A table embedded in the scenario.
    Inline(UnitDataTable),
}

const fn full_health() -> f64 {
    1.0
}

/// Placement of one unit at scenario start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitPlacement {
    /// Unit id; unique across the scenario.
    pub id: UnitId,
    /// Owning side.
    pub alliance: Alliance,
    /// Unit type identifier.
    pub kind: String,
    /// Starting position.
    pub position: Vec2,
    /// Starting health and shield as a fraction of the maximum.
    #[serde(default = "full_health")]
    pub health: f64,
    /// Distance moved every tick. Only enemy units follow a velocity.
    #[serde(default)]
    pub velocity: Option<Vec2>,
}

impl UnitPlacement {
    /// Create a full-health placement.
    #[must_use]
    pub fn new(id: UnitId, alliance: Alliance, kind: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id,
            alliance,
            kind: kind.into(),
            position: Vec2::new(x, y),
            health: full_health(),
            velocity: None,
        }
    }

    /// Initial observation, with health and shield scaled from the table.
    #[must_use]
    pub fn observe(&self, table: &UnitDataTable) -> UnitObservation {
        let mut obs = UnitObservation::new(self.id, self.alliance, self.kind.as_str(), self.position);
        if let Some(data) = table.get(&self.kind.as_str().into()) {
            obs.health = data.health_max * self.health;
            obs.shield = data.shield_max * self.health;
        }
        obs
    }
}

/// A complete scenario configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Playable map size.
    pub map_size: Vec2,
    /// Decision ticks to run.
    #[serde(default = "default_ticks")]
    pub ticks: u64,
    /// Game loops between decision ticks.
    #[serde(default = "default_loops_per_tick")]
    pub loops_per_tick: u64,
    /// Unpathable regions.
    #[serde(default)]
    pub blocked: Vec<Region>,
    /// Combat rally point.
    #[serde(default)]
    pub rally: Option<Vec2>,
    /// Expansion locations; town halls stand on the centroids.
    #[serde(default)]
    pub expansions: Vec<Vec2>,
    /// Whether our side counts as weaker overall.
    #[serde(default)]
    pub outpowered: bool,
    /// Units on the map at tick 0.
    pub units: Vec<UnitPlacement>,
    /// Unit-type table.
    #[serde(default)]
    pub unit_data: UnitDataSource,
    /// Orchestrator configuration; missing fields take their defaults.
    #[serde(default)]
    pub config: CombatConfig,
    /// Directory of the file the scenario was loaded from.
    #[serde(skip)]
    pub source_dir: Option<PathBuf>,
}

const fn default_ticks() -> u64 {
    120
}

const fn default_loops_per_tick() -> u64 {
    8
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            name: "Empty".to_string(),
            description: String::new(),
            map_size: Vec2::new(100.0, 100.0),
            ticks: default_ticks(),
            loops_per_tick: default_loops_per_tick(),
            blocked: Vec::new(),
            rally: None,
            expansions: Vec::new(),
            outpowered: false,
            units: Vec::new(),
            unit_data: UnitDataSource::Builtin,
            config: CombatConfig::default(),
            source_dir: None,
        }
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::NotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let mut scenario = Self::from_ron_str(&contents)?;
        scenario.source_dir = path.parent().map(Path::to_path_buf);
        Ok(scenario)
    }

    /// Load from a RON string.
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Names of the scenarios shipped with the runner.
    pub fn builtin_names() -> impl Iterator<Item = &'static str> {
        BUILTIN_SCENARIOS.iter().map(|(name, _)| *name)
    }

    /// A built-in scenario by name.
    pub fn builtin(name: &str) -> Result<Self, ScenarioError> {
        BUILTIN_SCENARIOS
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .ok_or_else(|| ScenarioError::NotFound(name.to_string()))
            .and_then(|(_, source)| Self::from_ron_str(source))
    }

    /// Load `source` as a file path when it exists, else as a built-in name.
    pub fn resolve(source: &str) -> Result<Self, ScenarioError> {
        if Path::new(source).exists() {
            Self::load(source)
        } else {
            Self::builtin(source)
        }
    }

    /// The unit-type table this scenario runs with.
    pub fn unit_table(&self) -> Result<UnitDataTable, ScenarioError> {
        let table = match &self.unit_data {
            UnitDataSource::Builtin => UnitDataTable::from_ron_str(DEFAULT_UNIT_DATA)?,
            UnitDataSource::File(path) => {
                let path = match &self.source_dir {
                    Some(dir) if path.is_relative() => dir.join(path),
                    _ => path.clone(),
                };
                UnitDataTable::load(path)?
            }
            UnitDataSource::Inline(table) => table.clone(),
        };
        Ok(table)
    }

    /// Observations of every unit at tick 0.
    #[must_use]
    pub fn initial_units(&self, table: &UnitDataTable) -> Vec<UnitObservation> {
        self.units.iter().map(|p| p.observe(table)).collect()
    }

    /// The map as the orchestrator sees it.
    #[must_use]
    pub fn world(&self) -> ScenarioWorld {
        ScenarioWorld {
            size: self.map_size,
            blocked: self.blocked.clone(),
            rally: self.rally,
            expansions: self.expansions.iter().map(|&c| Expansion::new(c, c)).collect(),
            outpowered: self.outpowered,
        }
    }

    /// Every problem that would make a run meaningless.
    #[must_use]
    pub fn validate(&self, table: &UnitDataTable) -> Vec<String> {
        let mut problems = table.validate();
        problems.extend(self.config.validate());
        if self.map_size.x <= 0.0 || self.map_size.y <= 0.0 {
            problems.push(format!("map size {:?} must be positive", self.map_size));
        }
        if self.loops_per_tick == 0 {
            problems.push("loops_per_tick must be positive".to_string());
        }

        let mut seen = BTreeSet::new();
        for placement in &self.units {
            if !seen.insert(placement.id) {
                problems.push(format!("unit {}: duplicate id", placement.id));
            }
            if table.get(&placement.kind.as_str().into()).is_none() {
                problems.push(format!("unit {}: unknown type '{}'", placement.id, placement.kind));
            }
            let p = placement.position;
            if !p.is_finite() || p.x < 0.0 || p.y < 0.0 || p.x > self.map_size.x || p.y > self.map_size.y {
                problems.push(format!("unit {}: position ({}, {}) is off the map", placement.id, p.x, p.y));
            }
            if !(placement.health > 0.0 && placement.health <= 1.0) {
                problems.push(format!("unit {}: health fraction must be in (0, 1]", placement.id));
            }
        }
        problems
    }

    /// [`Self::validate`] as a `Result`.
    pub fn check(&self, table: &UnitDataTable) -> Result<(), ScenarioError> {
        let problems = self.validate(table);
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ScenarioError::Invalid {
                name: self.name.clone(),
                problems: problems.join("; "),
            })
        }
    }
}

/// The scenario map: a rectangle with blocked regions and straight-line
/// ground paths that fail when they cross one.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioWorld {
    size: Vec2,
    blocked: Vec<Region>,
    rally: Option<Vec2>,
    expansions: Vec<Expansion>,
    outpowered: bool,
}

impl WorldView for ScenarioWorld {
    fn map_size(&self) -> Vec2 {
        self.size
    }

    fn is_pathable(&self, point: Vec2) -> bool {
        point.x >= 0.0
            && point.y >= 0.0
            && point.x <= self.size.x
            && point.y <= self.size.y
            && !self.blocked.iter().any(|r| r.contains(point))
    }

    fn path_distance(&self, from: Vec2, to: Vec2) -> f64 {
        if straight_path(from, to).into_iter().skip(1).all(|p| self.is_pathable(p)) {
            from.distance(to)
        } else {
            f64::INFINITY
        }
    }

    fn combat_rally(&self) -> Option<Vec2> {
        self.rally
    }

    fn expansions(&self) -> &[Expansion] {
        &self.expansions
    }

    fn is_outpowered(&self) -> bool {
        self.outpowered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn duel() -> Scenario {
        Scenario {
            name: "duel".to_string(),
            units: vec![
                UnitPlacement::new(1, Alliance::Friendly, "rifleman", 40.0, 50.0),
                UnitPlacement::new(2, Alliance::Enemy, "brute", 46.0, 50.0),
            ],
            ..Scenario::default()
        }
    }

    #[test]
    fn test_builtin_scenarios_parse_and_validate() {
        for name in Scenario::builtin_names() {
            let scenario = Scenario::builtin(name).unwrap();
            let table = scenario.unit_table().unwrap();
            assert!(scenario.validate(&table).is_empty(), "{name}: {:?}", scenario.validate(&table));
            assert!(!scenario.units.is_empty());
        }
    }

    #[test]
    fn test_unknown_builtin() {
        assert!(matches!(Scenario::builtin("nope"), Err(ScenarioError::NotFound(_))));
        assert!(matches!(Scenario::resolve("no/such/file.ron"), Err(ScenarioError::NotFound(_))));
    }

    #[test]
    fn test_parse_from_ron() {
        let ron = r#"
            Scenario(
                name: "Test",
                map_size: (x: 60.0, y: 40.0),
                ticks: 10,
                rally: Some((x: 5.0, y: 20.0)),
                units: [
                    UnitPlacement(id: 1, alliance: Friendly, kind: "rifleman", position: (x: 10.0, y: 20.0)),
                    UnitPlacement(
                        id: 2,
                        alliance: Enemy,
                        kind: "brute",
                        position: (x: 30.0, y: 20.0),
                        health: 0.5,
                        velocity: Some((x: -0.5, y: 0.0)),
                    ),
                ],
                config: (step_size: 4.0),
            )
        "#;
        let scenario = Scenario::from_ron_str(ron).unwrap();
        assert_eq!(scenario.name, "Test");
        assert_eq!(scenario.ticks, 10);
        assert_eq!(scenario.loops_per_tick, 8);
        assert_eq!(scenario.config.step_size, 4.0);
        assert_eq!(scenario.config.engagement_radius, CombatConfig::default().engagement_radius);
        assert_eq!(scenario.unit_data, UnitDataSource::Builtin);

        let table = scenario.unit_table().unwrap();
        let units = scenario.initial_units(&table);
        assert_eq!(units[1].health, 75.0);
    }

    #[test]
    fn test_validate_reports_problems() {
        let mut scenario = duel();
        scenario.units.push(UnitPlacement::new(2, Alliance::Enemy, "dragon", 500.0, 50.0));
        let table = scenario.unit_table().unwrap();
        let problems = scenario.validate(&table);
        assert_eq!(problems.len(), 3, "{problems:?}");
        assert!(scenario.check(&table).is_err());
        assert!(duel().check(&table).is_ok());
    }

    #[test]
    fn test_unit_data_file_relative_to_scenario() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("units.ron"), DEFAULT_UNIT_DATA).unwrap();
        let mut scenario = duel();
        scenario.unit_data = UnitDataSource::File(PathBuf::from("units.ron"));
        let path = dir.path().join("duel.ron");
        std::fs::write(&path, ron::ser::to_string_pretty(&scenario, ron::ser::PrettyConfig::default()).unwrap())
            .unwrap();

        let loaded = Scenario::load(&path).unwrap();
        assert!(loaded.unit_table().unwrap().get(&"brute".into()).is_some());
    }

    #[test]
    fn test_world_paths_fail_through_walls() {
        let scenario = Scenario {
            blocked: vec![Region {
                min: Vec2::new(45.0, 0.0),
                max: Vec2::new(55.0, 100.0),
            }],
            ..duel()
        };
        let world = scenario.world();
        assert!(!world.is_pathable(Vec2::new(50.0, 50.0)));
        assert!(!world.is_pathable(Vec2::new(101.0, 50.0)));
        assert!(world.path_distance(Vec2::new(40.0, 50.0), Vec2::new(60.0, 50.0)).is_infinite());
        assert_eq!(world.path_distance(Vec2::new(10.0, 50.0), Vec2::new(40.0, 50.0)), 30.0);
    }
}
