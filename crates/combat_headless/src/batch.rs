//! Batch scenario runner.
//!
//! Runs many scenarios, each several times, in parallel using rayon. Every
//! repeat of a scenario must end in the same state; a batch reports which
//! scenarios did not.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::runner::{HeadlessRunner, Outcome, RunSummary};
use crate::scenario::Scenario;

/// Configuration for a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Scenario files or built-in names.
    pub scenarios: Vec<String>,
    /// Runs per scenario.
    pub repeats: u32,
    /// Worker threads (0 = rayon default).
    pub parallel: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            scenarios: Scenario::builtin_names().map(str::to_string).collect(),
            repeats: 3,
            parallel: 0,
        }
    }
}

impl BatchConfig {
    /// Batch over `scenarios`.
    #[must_use]
    pub fn new(scenarios: Vec<String>) -> Self {
        Self {
            scenarios,
            ..Self::default()
        }
    }

    /// Set runs per scenario.
    #[must_use]
    pub fn with_repeats(mut self, repeats: u32) -> Self {
        self.repeats = repeats;
        self
    }

    /// Set worker threads.
    #[must_use]
    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel;
        self
    }
}

/// A run that could not be completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    /// Scenario file or name.
    pub scenario: String,
    /// Repeat index.
    pub repeat: u32,
    /// Error message.
    pub message: String,
}

/// Aggregate over every repeat of one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    /// Completed runs.
    pub runs: usize,
    /// Runs that ended in victory.
    pub victories: usize,
    /// Runs that ended in defeat.
    pub defeats: usize,
    /// Whether every run ended in the same state.
    pub deterministic: bool,
}

impl ScenarioSummary {
    fn from_runs<'a>(runs: impl IntoIterator<Item = &'a RunSummary>) -> Self {
        let runs: Vec<&RunSummary> = runs.into_iter().collect();
        Self {
            runs: runs.len(),
            victories: runs.iter().filter(|r| r.outcome == Outcome::Victory).count(),
            defeats: runs.iter().filter(|r| r.outcome == Outcome::Defeat).count(),
            deterministic: runs.windows(2).all(|w| w[0] == w[1]),
        }
    }
}

/// Results from a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Configuration used.
    pub config: BatchConfig,
    /// Every completed run, grouped by scenario in config order.
    pub runs: Vec<RunSummary>,
    /// Per-scenario aggregates keyed by scenario name.
    pub summary: BTreeMap<String, ScenarioSummary>,
    /// Runs that failed.
    pub errors: Vec<BatchError>,
    /// Wall-clock duration.
    pub duration_seconds: f64,
}

impl BatchResults {
    /// Whether every scenario ran without error and reproduced itself.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.summary.values().all(|s| s.deterministic)
    }

    /// Save results to a JSON file.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load results from a JSON file.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}

fn run_one(source: &str) -> Result<RunSummary, String> {
    let scenario = Scenario::resolve(source).map_err(|e| e.to_string())?;
    let mut runner = HeadlessRunner::new(scenario).map_err(|e| e.to_string())?;
    runner.run(None).map_err(|e| e.to_string())
}

/// Run a batch.
pub fn run_batch(config: BatchConfig) -> BatchResults {
    let start = Instant::now();
    info!(
        scenarios = config.scenarios.len(),
        repeats = config.repeats,
        "Starting batch run"
    );

    let jobs: Vec<(&str, u32)> = config
        .scenarios
        .iter()
        .flat_map(|s| (0..config.repeats).map(move |r| (s.as_str(), r)))
        .collect();
    let execute = || -> Vec<Result<RunSummary, BatchError>> {
        jobs.par_iter()
            .map(|&(source, repeat)| {
                run_one(source).map_err(|message| {
                    warn!(scenario = source, repeat, error = %message, "Run failed");
                    BatchError {
                        scenario: source.to_string(),
                        repeat,
                        message,
                    }
                })
            })
            .collect()
    };

    let results = if config.parallel > 0 {
        match rayon::ThreadPoolBuilder::new().num_threads(config.parallel).build() {
            Ok(pool) => pool.install(execute),
            Err(e) => {
                warn!(error = %e, "Failed to build thread pool, using the global pool");
                execute()
            }
        }
    } else {
        execute()
    };

    let (runs, errors): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    let runs: Vec<RunSummary> = runs.into_iter().filter_map(Result::ok).collect();
    let errors: Vec<BatchError> = errors.into_iter().filter_map(Result::err).collect();

    let mut grouped: BTreeMap<String, Vec<&RunSummary>> = BTreeMap::new();
    for run in &runs {
        grouped.entry(run.scenario.clone()).or_default().push(run);
    }
    let summary = grouped
        .into_iter()
        .map(|(name, group)| (name, ScenarioSummary::from_runs(group)))
        .collect();

    let duration_seconds = start.elapsed().as_secs_f64();
    info!(
        runs = runs.len(),
        failed = errors.len(),
        duration_secs = format!("{duration_seconds:.2}"),
        "Batch complete"
    );

    BatchResults {
        config,
        runs,
        summary,
        errors,
        duration_seconds,
    }
}

/// Scenario files with a `.ron` extension directly inside `dir`, sorted.
pub fn scenario_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "ron"))
        .collect();
    files.sort();
    Ok(files)
}
