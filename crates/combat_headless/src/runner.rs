//! Drives the orchestrator through a scenario.
//!
//! Each tick the runner takes a snapshot of the arena, asks the
//! orchestrator for a command batch, records the batch in the decision log
//! and plays the tick out. Tick output is one JSON object per line.

use std::io::Write;

use combat_core::command::Command;
use combat_core::decision_log::DecisionLog;
use combat_core::orchestrator::{CombatOrchestrator, Decision};
use combat_core::unit::{Alliance, UnitId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::arena::{Arena, TickEvents};
use crate::scenario::{Scenario, ScenarioError, ScenarioWorld};

/// Everything that happened in one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickOutput {
    /// Tick index, starting at 1.
    pub tick: u64,
    /// Commands issued, in issue order.
    pub commands: Vec<Command>,
    /// Decision per considered unit.
    pub decisions: Vec<(UnitId, Decision)>,
    /// Units the orchestrator could not validate.
    pub skipped: Vec<UnitId>,
    /// Shots and deaths while the tick played out.
    pub events: TickEvents,
    /// Friendly units alive after the tick.
    pub friendly_alive: usize,
    /// Enemy units alive after the tick.
    pub enemy_alive: usize,
    /// Hash of the command batch.
    pub batch_hash: u64,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Every enemy unit died.
    Victory,
    /// Every friendly unit died.
    Defeat,
    /// Both sides still standing when the tick limit was reached.
    Unresolved,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Scenario name.
    pub scenario: String,
    /// Ticks played.
    pub ticks: u64,
    /// Commands issued over the run.
    pub commands: usize,
    /// Friendly units lost.
    pub friendly_losses: usize,
    /// Enemy units killed.
    pub enemy_losses: usize,
    /// How the run ended.
    pub outcome: Outcome,
    /// Arena state hash after the last tick.
    pub final_hash: u64,
}

/// Runner settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Stop as soon as one side has no units left.
    pub stop_when_decided: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            stop_when_decided: true,
        }
    }
}

/// Headless scenario runner.
pub struct HeadlessRunner {
    scenario: Scenario,
    config: RunnerConfig,
    orchestrator: CombatOrchestrator,
    world: ScenarioWorld,
    arena: Arena,
    log: DecisionLog,
    tick: u64,
    initial_friendly: usize,
    initial_enemy: usize,
}

impl HeadlessRunner {
    /// Runner for `scenario`, after validating it.
    pub fn new(scenario: Scenario) -> Result<Self, ScenarioError> {
        Self::with_config(scenario, RunnerConfig::default())
    }

    /// Runner with explicit settings.
    pub fn with_config(scenario: Scenario, config: RunnerConfig) -> Result<Self, ScenarioError> {
        let table = scenario.unit_table()?;
        scenario.check(&table)?;

        let arena = Arena::from_scenario(&scenario, &table);
        let world = scenario.world();
        let log = DecisionLog::new(scenario.name.clone());
        let initial_friendly = arena.count(Alliance::Friendly);
        let initial_enemy = arena.count(Alliance::Enemy);
        let orchestrator = CombatOrchestrator::new(table, scenario.config.clone());
        Ok(Self {
            scenario,
            config,
            orchestrator,
            world,
            arena,
            log,
            tick: 0,
            initial_friendly,
            initial_enemy,
        })
    }

    /// The scenario being run.
    #[must_use]
    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Current arena state.
    #[must_use]
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Decisions recorded so far.
    #[must_use]
    pub fn log(&self) -> &DecisionLog {
        &self.log
    }

    /// Consume the runner, keeping its decision log.
    #[must_use]
    pub fn into_log(self) -> DecisionLog {
        self.log
    }

    /// Ticks played so far.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Whether one side has been wiped out.
    #[must_use]
    pub fn is_decided(&self) -> bool {
        self.arena.count(Alliance::Friendly) == 0 || self.arena.count(Alliance::Enemy) == 0
    }

    /// Whether another tick should be played.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.tick < self.scenario.ticks && !(self.config.stop_when_decided && self.is_decided())
    }

    /// Play one tick.
    pub fn step(&mut self) -> TickOutput {
        self.tick += 1;
        let snapshot = self.arena.snapshot(self.tick);
        let batch = self.orchestrator.run_tick(&snapshot, &self.world);
        self.log.record(&batch);

        let events = self.arena.apply(&batch, self.orchestrator.table());
        for id in &events.killed {
            debug!(tick = self.tick, unit = id, "Unit killed");
        }

        let report = self.orchestrator.last_report();
        TickOutput {
            tick: self.tick,
            batch_hash: batch.batch_hash(),
            commands: batch.into_commands(),
            decisions: report.decisions.clone(),
            skipped: report.skipped.clone(),
            events,
            friendly_alive: self.arena.count(Alliance::Friendly),
            enemy_alive: self.arena.count(Alliance::Enemy),
        }
    }

    /// Play the scenario to its end, writing each tick as a JSON line to
    /// `out` when given.
    pub fn run(&mut self, mut out: Option<&mut dyn Write>) -> Result<RunSummary, ScenarioError> {
        info!(scenario = %self.scenario.name, ticks = self.scenario.ticks, "Starting scenario");
        while self.is_running() {
            let output = self.step();
            if let Some(out) = out.as_deref_mut() {
                serde_json::to_writer(&mut *out, &output)?;
                writeln!(out)?;
            }
        }
        let summary = self.summary();
        info!(
            scenario = %summary.scenario,
            ticks = summary.ticks,
            outcome = ?summary.outcome,
            commands = summary.commands,
            "Scenario finished"
        );
        Ok(summary)
    }

    /// Summary of the run so far.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        let friendly = self.arena.count(Alliance::Friendly);
        let enemy = self.arena.count(Alliance::Enemy);
        let outcome = match (friendly, enemy) {
            (_, 0) => Outcome::Victory,
            (0, _) => Outcome::Defeat,
            _ => Outcome::Unresolved,
        };
        RunSummary {
            scenario: self.scenario.name.clone(),
            ticks: self.tick,
            commands: self.log.command_count(),
            friendly_losses: self.initial_friendly.saturating_sub(friendly),
            enemy_losses: self.initial_enemy.saturating_sub(enemy),
            outcome,
            final_hash: self.arena.state_hash(),
        }
    }
}

/// Replay `scenario` and check its decisions against `recorded`.
pub fn verify_log(scenario: Scenario, recorded: &DecisionLog) -> Result<RunSummary, ScenarioError> {
    let mut runner = HeadlessRunner::new(scenario)?;
    let summary = runner.run(None)?;
    recorded.verify_against(runner.log())?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::UnitPlacement;

    fn three_on_one() -> Scenario {
        Scenario {
            name: "three-on-one".to_string(),
            ticks: 80,
            units: vec![
                UnitPlacement::new(1, Alliance::Friendly, "rifleman", 40.0, 50.0),
                UnitPlacement::new(2, Alliance::Friendly, "rifleman", 40.0, 51.0),
                UnitPlacement::new(3, Alliance::Friendly, "rifleman", 40.0, 49.0),
                UnitPlacement::new(10, Alliance::Enemy, "rifleman", 46.0, 50.0),
            ],
            ..Scenario::default()
        }
    }

    #[test]
    fn test_outnumbered_enemy_is_destroyed() {
        let mut runner = HeadlessRunner::new(three_on_one()).unwrap();
        let summary = runner.run(None).unwrap();
        assert_eq!(summary.outcome, Outcome::Victory);
        assert_eq!(summary.enemy_losses, 1);
        assert_eq!(summary.friendly_losses, 0);
        assert!(summary.ticks < 80);
        assert_eq!(runner.log().len() as u64, summary.ticks);
    }

    #[test]
    fn test_runs_to_tick_limit_without_stop() {
        let config = RunnerConfig {
            stop_when_decided: false,
        };
        let scenario = Scenario {
            ticks: 12,
            ..three_on_one()
        };
        let mut runner = HeadlessRunner::with_config(scenario, config).unwrap();
        runner.run(None).unwrap();
        assert_eq!(runner.tick(), 12);
        assert!(!runner.is_running());
    }

    #[test]
    fn test_json_lines_output() {
        let scenario = Scenario {
            ticks: 5,
            ..three_on_one()
        };
        let mut runner = HeadlessRunner::new(scenario).unwrap();
        let mut out: Vec<u8> = Vec::new();
        runner.run(Some(&mut out)).unwrap();

        let lines: Vec<TickOutput> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0].tick, 1);
        assert!(!lines[0].commands.is_empty());
        assert_eq!(lines[0].decisions.len(), 3);
    }

    #[test]
    fn test_invalid_scenario_rejected() {
        let mut scenario = three_on_one();
        scenario.units.push(UnitPlacement::new(1, Alliance::Enemy, "rifleman", 60.0, 50.0));
        assert!(matches!(HeadlessRunner::new(scenario), Err(ScenarioError::Invalid { .. })));
    }

    #[test]
    fn test_replay_verifies_and_detects_divergence() {
        let mut runner = HeadlessRunner::new(three_on_one()).unwrap();
        runner.run(None).unwrap();
        let log = runner.into_log();
        assert!(verify_log(three_on_one(), &log).is_ok());

        let mut weaker = three_on_one();
        weaker.units.remove(2);
        let err = verify_log(weaker, &log).unwrap_err();
        assert!(matches!(
            err,
            ScenarioError::Combat(combat_core::error::CombatError::Divergence { .. })
        ));
    }

    #[test]
    fn test_builtin_scenarios_run_deterministically() {
        for name in Scenario::builtin_names() {
            let a = HeadlessRunner::new(Scenario::builtin(name).unwrap()).unwrap().run(None).unwrap();
            let b = HeadlessRunner::new(Scenario::builtin(name).unwrap()).unwrap().run(None).unwrap();
            assert_eq!(a, b, "{name} diverged");
        }
    }
}
