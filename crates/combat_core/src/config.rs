//! Tunable constants for combat decisions.
//!
//! Every threshold the decision code compares against lives here so
//! scenarios can tweak them from RON without recompiling.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CombatError, Result};

/// Combat decision configuration.
///
/// # Example RON
///
/// ```ron
/// CombatConfig(
///     engagement_radius: 16.0,
///     cooldown_threshold: 8.0,
///     clear_rocks: false,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// Radius of local clusters and threat detection.
    pub engagement_radius: f64,
    /// Maximum path distance to a bunker considered as a retreat target.
    pub bunker_threshold: f64,
    /// Weapon cooldown, in game loops, at or below which a weapon counts as ready.
    pub cooldown_threshold: f64,
    /// Game loops between two decision ticks.
    pub step_size: f64,
    /// Ticks before an unacknowledged pending order expires.
    pub pending_order_timeout: u64,
    /// Multiplier applied to the averaged threat offset when fleeing several threats.
    pub retreat_distance: f64,
    /// Largest radius of the safe-position sweep.
    pub safe_search_max_radius: f64,
    /// Radius increment of the safe-position sweep.
    pub safe_search_radius_step: f64,
    /// Angular increment of the safe-position sweep, in degrees.
    pub safe_search_angle_step_deg: f64,
    /// Divisor applied to weapon cycle times (game speed normalization).
    pub cycle_normalization: f64,
    /// Whether idle units may attack destructible obstacles.
    pub clear_rocks: bool,
    /// Ticks an enemy may go unseen before its position history is dropped.
    pub tracking_retention: u64,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            engagement_radius: 16.0,
            bunker_threshold: 16.0,
            cooldown_threshold: 8.0,
            step_size: 8.0,
            pending_order_timeout: 3,
            retreat_distance: 2.0,
            safe_search_max_radius: 16.0,
            safe_search_radius_step: 0.5,
            safe_search_angle_step_deg: 2.5,
            cycle_normalization: 1.4,
            clear_rocks: true,
            tracking_retention: 22,
        }
    }
}

impl CombatConfig {
    /// Parse a configuration from RON text. Missing fields take their defaults.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let config: Self = ron::from_str(source).map_err(|e| CombatError::DataParseError {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        config.check("<inline>")?;
        Ok(config)
    }

    /// Load a configuration from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: Self = ron::from_str(&contents).map_err(|e| CombatError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.check(&path.display().to_string())?;
        Ok(config)
    }

    /// Problems that make the configuration unusable.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let positive = [
            ("engagement_radius", self.engagement_radius),
            ("step_size", self.step_size),
            ("safe_search_radius_step", self.safe_search_radius_step),
            ("safe_search_angle_step_deg", self.safe_search_angle_step_deg),
            ("cycle_normalization", self.cycle_normalization),
        ];
        for (name, value) in positive {
            if value.is_nan() || value <= 0.0 {
                problems.push(format!("{name} must be positive, got {value}"));
            }
        }
        if self.bunker_threshold < 0.0 {
            problems.push("bunker_threshold must not be negative".to_string());
        }
        problems
    }

    fn check(&self, path: &str) -> Result<()> {
        let problems = self.validate();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(CombatError::DataParseError {
                path: path.to_string(),
                message: problems.join("; "),
            })
        }
    }
}
