//! Headless combat runner.
//!
//! Plays combat scenarios against the orchestrator without a game client.
//! Designed for CI, decision-log regression checks and data validation.
//!
//! # Usage
//!
//! ```bash
//! # Play a built-in scenario, JSON lines on stdout
//! cargo run -p combat_headless -- run --scenario skirmish
//!
//! # Record a decision log, then verify a fresh run against it
//! cargo run -p combat_headless -- run --scenario scenarios/melee_brawl.ron --record brawl.log
//! cargo run -p combat_headless -- verify --scenario scenarios/melee_brawl.ron --log brawl.log
//!
//! # Run every scenario in a directory five times each
//! cargo run -p combat_headless -- batch --dir scenarios --repeats 5 --output results/batch.json
//!
//! # Validate data files
//! cargo run -p combat_headless -- validate data
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use combat_core::decision_log::DecisionLog;
use combat_core::error::CombatError;
use combat_headless::batch::scenario_files;
use combat_headless::validate::validate_path;
use combat_headless::{run_batch, verify_log, BatchConfig, HeadlessRunner, Scenario, ScenarioError};

#[derive(Parser)]
#[command(name = "combat_headless")]
#[command(about = "Headless combat scenario runner for CI and decision-log checks")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play one scenario, printing each tick as a JSON line
    Run {
        /// Scenario file or built-in name
        #[arg(short, long, default_value = "skirmish")]
        scenario: String,

        /// Override the scenario's tick limit
        #[arg(short, long)]
        ticks: Option<u64>,

        /// Write the decision log to this file
        #[arg(long)]
        record: Option<PathBuf>,

        /// Only print the final summary
        #[arg(short, long)]
        quiet: bool,
    },

    /// Replay a scenario and compare its decisions with a recorded log
    Verify {
        /// Scenario file or built-in name
        #[arg(short, long)]
        scenario: String,

        /// Recorded decision log
        #[arg(short, long)]
        log: PathBuf,
    },

    /// Run scenarios repeatedly in parallel and check they reproduce
    Batch {
        /// Scenario files or built-in names (default: every built-in)
        #[arg(short, long)]
        scenario: Vec<String>,

        /// Also run every .ron scenario in this directory
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Runs per scenario
        #[arg(short, long, default_value = "3")]
        repeats: u32,

        /// Worker threads (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: usize,

        /// Write results as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate unit data, config and scenario files
    Validate {
        /// File or directory to check
        #[arg(default_value = "data")]
        path: PathBuf,
    },

    /// List built-in scenarios
    List,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries tick output.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let result = match cli.command {
        Commands::Run {
            scenario,
            ticks,
            record,
            quiet,
        } => cmd_run(&scenario, ticks, record, quiet),
        Commands::Verify { scenario, log } => cmd_verify(&scenario, &log),
        Commands::Batch {
            scenario,
            dir,
            repeats,
            parallel,
            output,
        } => cmd_batch(scenario, dir, repeats, parallel, output),
        Commands::Validate { path } => cmd_validate(&path),
        Commands::List => {
            for name in Scenario::builtin_names() {
                println!("{name}");
            }
            Ok(true)
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}

fn cmd_run(source: &str, ticks: Option<u64>, record: Option<PathBuf>, quiet: bool) -> Result<bool, ScenarioError> {
    let mut scenario = Scenario::resolve(source)?;
    if let Some(ticks) = ticks {
        scenario.ticks = ticks;
    }

    let mut runner = HeadlessRunner::new(scenario)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let summary = if quiet {
        runner.run(None)?
    } else {
        runner.run(Some(&mut out))?
    };
    serde_json::to_writer(&mut out, &summary)?;
    writeln!(out)?;

    if let Some(path) = record {
        runner.log().save(&path)?;
        tracing::info!(path = %path.display(), ticks = runner.log().len(), "Decision log saved");
    }
    Ok(true)
}

fn cmd_verify(source: &str, log: &Path) -> Result<bool, ScenarioError> {
    let recorded = DecisionLog::load(log)?;
    let scenario = Scenario::resolve(source)?;
    if recorded.scenario != scenario.name {
        tracing::warn!(
            recorded = %recorded.scenario,
            scenario = %scenario.name,
            "Decision log was recorded for a different scenario"
        );
    }

    match verify_log(scenario, &recorded) {
        Ok(summary) => {
            tracing::info!(ticks = summary.ticks, "Replay matches the decision log");
            Ok(true)
        }
        Err(ScenarioError::Combat(divergence @ CombatError::Divergence { .. })) => {
            tracing::error!(error = %divergence, "Replay diverged");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

fn cmd_batch(
    mut scenarios: Vec<String>,
    dir: Option<PathBuf>,
    repeats: u32,
    parallel: usize,
    output: Option<PathBuf>,
) -> Result<bool, ScenarioError> {
    if let Some(dir) = dir {
        scenarios.extend(scenario_files(&dir)?.iter().map(|p| p.display().to_string()));
    }
    let config = if scenarios.is_empty() {
        BatchConfig::default()
    } else {
        BatchConfig::new(scenarios)
    }
    .with_repeats(repeats)
    .with_parallel(parallel);

    let results = run_batch(config);
    for (name, summary) in &results.summary {
        eprintln!(
            "{name:<20} runs {:>3}  victories {:>3}  defeats {:>3}  {}",
            summary.runs,
            summary.victories,
            summary.defeats,
            if summary.deterministic { "deterministic" } else { "NON-DETERMINISTIC" }
        );
    }
    for error in &results.errors {
        eprintln!("FAILED {} (repeat {}): {}", error.scenario, error.repeat, error.message);
    }

    if let Some(path) = output {
        results.save(&path)?;
        tracing::info!(path = %path.display(), "Batch results saved");
    }
    Ok(results.is_clean())
}

fn cmd_validate(path: &Path) -> Result<bool, ScenarioError> {
    tracing::info!(path = %path.display(), "Validating data files");
    let reports = validate_path(path)?;
    for report in &reports {
        if report.is_valid() {
            tracing::info!(file = %report.path.display(), kind = ?report.kind, "OK");
        }
        for problem in &report.problems {
            tracing::error!(file = %report.path.display(), "{problem}");
        }
    }
    Ok(reports.iter().all(|r| r.is_valid()))
}
