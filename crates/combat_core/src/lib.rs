//! # Combat Core
//!
//! Per-tick combat decisions for an RTS bot: for every friendly unit, fight
//! or withdraw, and when withdrawing, where to go.
//!
//! This crate contains **only** decision logic:
//! - No game protocol or transport
//! - No pathfinder (map queries come through [`world::WorldView`])
//! - No state persisted between games
//!
//! Each tick reads one immutable snapshot and produces one command batch.
//! Units are visited in id order and every map is ordered, so identical
//! inputs always produce identical batches.
//!
//! ## Crate Structure
//!
//! - [`stats`] - Weapon DPS and time-to-kill math
//! - [`engagement`] - Fight-or-flight decisions and reinforcement selection
//! - [`retreat`] - Retreat destination resolution
//! - [`micro`] - Melee surround and ranged kiting
//! - [`orchestrator`] - The per-tick driver
//! - [`context`] - Per-tick read-only decision context
//! - [`tracking`] - Enemy position history and extrapolation
//! - [`data`] - Unit type definitions loaded from RON

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod command;
pub mod config;
pub mod context;
pub mod data;
pub mod decision_log;
pub mod engagement;
pub mod error;
pub mod math;
pub mod micro;
pub mod orchestrator;
pub mod orders;
pub mod retreat;
pub mod role;
pub mod stats;
pub mod tracking;
pub mod unit;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::command::{Ability, Command, CommandBatch, ObservedOrder};
    pub use crate::config::CombatConfig;
    pub use crate::context::{TickContext, ValidatedUnits};
    pub use crate::data::{TargetClass, UnitDataTable, UnitTypeData, UpgradeLevels, Upgrades, Weapon};
    pub use crate::decision_log::DecisionLog;
    pub use crate::engagement::{is_stronger_at_position, minimal_reinforcement, should_engage};
    pub use crate::error::{CombatError, Result};
    pub use crate::math::Vec2;
    pub use crate::orchestrator::{CombatOrchestrator, Decision, TickReport};
    pub use crate::retreat::{RetreatDestination, RetreatKind, RetreatResolver};
    pub use crate::role::Role;
    pub use crate::stats::{CombatStats, KillTimes};
    pub use crate::tracking::EnemyTracker;
    pub use crate::unit::{Alliance, Unit, UnitId, UnitObservation, UnitTypeId};
    pub use crate::world::{Expansion, Snapshot, WorldView};
}
