//! Data validation utilities.
//!
//! Checks unit data tables, combat configurations and scenarios before
//! they are used, reporting every problem instead of stopping at the first.

use std::path::{Path, PathBuf};

use combat_core::config::CombatConfig;
use combat_core::data::UnitDataTable;
use serde::Serialize;

use crate::scenario::Scenario;

/// Kind of file being validated, picked from its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DataKind {
    /// A unit-type table.
    UnitData,
    /// A combat configuration.
    Config,
    /// A scenario.
    Scenario,
}

/// Validation outcome for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    /// File checked.
    pub path: PathBuf,
    /// What the file was parsed as, if anything.
    pub kind: Option<DataKind>,
    /// Problems found; empty when the file is valid.
    pub problems: Vec<String>,
}

impl FileReport {
    /// Whether the file is usable.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.kind.is_some() && self.problems.is_empty()
    }
}

/// Validate one RON file as a scenario, unit table or config, in that
/// order of preference.
#[must_use]
pub fn validate_file(path: &Path) -> FileReport {
    let report = |kind, problems| FileReport {
        path: path.to_path_buf(),
        kind,
        problems,
    };

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => return report(None, vec![format!("cannot read: {e}")]),
    };

    if let Ok(mut scenario) = Scenario::from_ron_str(&contents) {
        scenario.source_dir = path.parent().map(Path::to_path_buf);
        let problems = match scenario.unit_table() {
            Ok(table) => scenario.validate(&table),
            Err(e) => vec![format!("unit data: {e}")],
        };
        return report(Some(DataKind::Scenario), problems);
    }
    if let Ok(table) = UnitDataTable::from_ron_str(&contents) {
        if !table.units.is_empty() {
            return report(Some(DataKind::UnitData), table.validate());
        }
    }
    match CombatConfig::from_ron_str(&contents) {
        Ok(config) => report(Some(DataKind::Config), config.validate()),
        Err(e) => report(None, vec![format!("not a scenario, unit table or config: {e}")]),
    }
}

/// Validate every `.ron` file directly inside `dir`, in name order.
pub fn validate_data_directory(dir: &Path) -> std::io::Result<Vec<FileReport>> {
    Ok(crate::batch::scenario_files(dir)?
        .iter()
        .map(|path| validate_file(path))
        .collect())
}

/// Validate a file, or every data file of a directory.
pub fn validate_path(path: &Path) -> std::io::Result<Vec<FileReport>> {
    if path.is_dir() {
        validate_data_directory(path)
    } else {
        Ok(vec![validate_file(path)])
    }
}
