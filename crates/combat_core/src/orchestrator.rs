//! Per-tick combat driver.
//!
//! [`CombatOrchestrator::run_tick`] takes one snapshot and produces one
//! [`CommandBatch`]. Within the tick every decision reads the same
//! [`TickContext`]; commands go into the batch and are only handed over at
//! the end. The only state kept between ticks is the enemy tracker, the
//! role book and the pending-orders ledger.
//!
//! # Determinism
//!
//! - Units are visited in ascending id order.
//! - All maps are `BTreeMap`s; no hashing order leaks into decisions.
//! - Re-running a tick on an identical snapshot yields an identical batch.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::command::{Command, CommandBatch};
use crate::config::CombatConfig;
use crate::context::{TickContext, ValidatedUnits};
use crate::data::{UnitDataTable, UnitTypeData};
use crate::engagement::{minimal_reinforcement, should_engage};
use crate::math::{border_positions, Vec2};
use crate::micro::{AssignedDamage, MeleeState, Micro};
use crate::orders::PendingOrders;
use crate::retreat::{RetreatKind, RetreatResolver};
use crate::role::{Role, RoleBook};
use crate::tracking::EnemyTracker;
use crate::unit::{closest_unit, units_within, Alliance, Unit, UnitId};
use crate::world::{is_standable, move_away_position, Snapshot, WorldView};

/// What the orchestrator decided for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// Waiting for the previous order to show up in the snapshot.
    Pending,
    /// Nothing to do.
    Idle,
    /// Attacking a destructible obstacle.
    ClearObstacle(UnitId),
    /// Loading into a bunker.
    LoadBunker(UnitId),
    /// Attack-moving to the combat rally.
    Rally,
    /// Melee logic outcome.
    Melee(MeleeState),
    /// Melee step-back micro while outmatched.
    StepBack,
    /// Ranged kiting or target selection.
    Ranged,
    /// Retreating to a resolved destination.
    Retreat(RetreatKind),
    /// Flying unit moving directly away.
    MoveAway,
    /// No destination found; holding position.
    Hold,
    /// Support caster not needed in the fight.
    StandDown,
}

/// Outcome of the last tick, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    /// Tick index.
    pub tick: u64,
    /// Decisions in the order they were made.
    pub decisions: Vec<(UnitId, Decision)>,
    /// Units dropped by validation.
    pub skipped: Vec<UnitId>,
}

impl TickReport {
    /// Decision made for `unit`, if it was considered.
    #[must_use]
    pub fn decision_for(&self, unit: UnitId) -> Option<Decision> {
        self.decisions
            .iter()
            .find(|(id, _)| *id == unit)
            .map(|(_, d)| *d)
    }
}

/// Owns cross-tick combat state and runs the per-tick decision pass.
#[derive(Debug, Clone)]
pub struct CombatOrchestrator {
    table: UnitDataTable,
    config: CombatConfig,
    tracker: EnemyTracker,
    roles: RoleBook,
    pending: PendingOrders,
    last_report: TickReport,
}

impl CombatOrchestrator {
    /// Create an orchestrator with empty state.
    #[must_use]
    pub fn new(table: UnitDataTable, config: CombatConfig) -> Self {
        let pending = PendingOrders::new(config.pending_order_timeout);
        Self {
            table,
            config,
            tracker: EnemyTracker::new(),
            roles: RoleBook::new(),
            pending,
            last_report: TickReport::default(),
        }
    }

    /// Decision constants.
    #[must_use]
    pub const fn config(&self) -> &CombatConfig {
        &self.config
    }

    /// Unit-type table.
    #[must_use]
    pub const fn table(&self) -> &UnitDataTable {
        &self.table
    }

    /// Role tags.
    #[must_use]
    pub const fn roles(&self) -> &RoleBook {
        &self.roles
    }

    /// Role tags, for assigning `SupportCaster`, `Proxy` or `Defending`.
    pub fn roles_mut(&mut self) -> &mut RoleBook {
        &mut self.roles
    }

    /// Enemy position histories.
    #[must_use]
    pub const fn tracker(&self) -> &EnemyTracker {
        &self.tracker
    }

    /// Pending-orders ledger.
    #[must_use]
    pub const fn pending(&self) -> &PendingOrders {
        &self.pending
    }

    /// Report of the most recent tick.
    #[must_use]
    pub const fn last_report(&self) -> &TickReport {
        &self.last_report
    }

    /// Decide every friendly unit's command for `snapshot`.
    pub fn run_tick<W: WorldView + ?Sized>(&mut self, snapshot: &Snapshot, world: &W) -> CommandBatch {
        let tick = snapshot.tick;
        #[allow(clippy::cast_precision_loss)]
        let time = snapshot.game_loop as f64;

        let units = ValidatedUnits::from_snapshot(snapshot, &self.table);
        let skipped: Vec<UnitId> = units.skipped.iter().map(|(id, _)| *id).collect();
        let alive: BTreeSet<UnitId> = units.friendly.iter().map(|u| u.id).collect();

        for observation in snapshot.units.iter().filter(|o| o.alliance == Alliance::Friendly) {
            self.pending.acknowledge(observation);
        }
        self.pending.expire(tick);
        self.pending.retain_units(|id| alive.contains(&id));
        self.roles.retain_alive(&alive);

        self.tracker.update(tick, time, &units.enemies);
        self.tracker.prune(tick, self.config.tracking_retention);

        let ctx = TickContext::new(tick, time, &self.table, &self.config, &self.tracker, units);
        let mut run = TickRun::new(&ctx, world, &self.roles, &self.pending);
        run.decide_all();
        let TickRun {
            batch,
            decisions,
            role_updates,
            ..
        } = run;

        for (unit, role, active) in role_updates {
            self.roles.toggle(unit, role, active);
        }
        for command in batch.commands() {
            self.pending.record(command, tick);
        }

        info!(
            tick,
            commands = batch.len(),
            decided = decisions.len(),
            skipped = skipped.len(),
            pending = self.pending.len(),
            "Combat tick"
        );
        self.last_report = TickReport {
            tick,
            decisions,
            skipped,
        };
        batch
    }
}

fn contains(units: &[&Unit], unit: &Unit) -> bool {
    units.iter().any(|u| u.id == unit.id)
}

/// Working state of one tick's decision pass.
struct TickRun<'c, 'a, W: WorldView + ?Sized> {
    ctx: &'c TickContext<'a>,
    world: &'c W,
    roles: &'c RoleBook,
    pending: &'c PendingOrders,
    micro: Micro<'c, 'a, W>,
    resolver: RetreatResolver<'c, 'a, W>,
    assigned: AssignedDamage,
    batch: CommandBatch,
    decisions: Vec<(UnitId, Decision)>,
    role_updates: Vec<(UnitId, Role, bool)>,
}

impl<'c, 'a, W: WorldView + ?Sized> TickRun<'c, 'a, W> {
    fn new(ctx: &'c TickContext<'a>, world: &'c W, roles: &'c RoleBook, pending: &'c PendingOrders) -> Self {
        Self {
            ctx,
            world,
            roles,
            pending,
            micro: Micro::new(ctx, world),
            resolver: RetreatResolver::new(ctx, world),
            assigned: AssignedDamage::new(),
            batch: CommandBatch::new(ctx.tick),
            decisions: Vec::new(),
            role_updates: Vec::new(),
        }
    }

    /// Mobile, finished combat units; workers only while defending.
    fn is_eligible(&self, unit: &Unit) -> bool {
        if unit.is_worker && !self.roles.has(unit.id, Role::Defending) {
            return false;
        }
        unit.is_ready()
            && unit.speed > 0.0
            && unit
                .type_data(self.ctx.table())
                .is_some_and(UnitTypeData::is_combatant)
    }

    fn is_pending(&mut self, unit: &Unit) -> bool {
        let pending = self.pending.is_pending(unit.id, self.ctx.tick);
        if pending {
            self.decisions.push((unit.id, Decision::Pending));
        }
        pending
    }

    fn decide_all(&mut self) {
        let ctx = self.ctx;
        let enemies: Vec<&'c Unit> = ctx.enemies.iter().collect();

        let eligible: Vec<&'c Unit> = ctx.friendly.iter().filter(|u| self.is_eligible(u)).collect();
        let mut casters = Vec::new();
        let mut melee = Vec::new();
        let mut others = Vec::new();
        for unit in eligible {
            self.update_threatened(unit);
            if self.roles.has(unit.id, Role::SupportCaster) {
                casters.push(unit);
            } else if unit.is_melee {
                melee.push(unit);
            } else {
                others.push(unit);
            }
        }
        let (low_health, healthy): (Vec<&Unit>, Vec<&Unit>) = melee
            .into_iter()
            .partition(|u| u.effective_health() <= ctx.stats.max_single_hit_damage(&enemies, u));

        let needed_casters = minimal_reinforcement(&ctx.stats, &casters, &others, &enemies);
        let needed_low = minimal_reinforcement(&ctx.stats, &low_health, &others, &enemies);
        for caster in casters.iter().filter(|c| !contains(&needed_casters, c)) {
            if caster.is_attacking() && !self.is_pending(caster) {
                self.issue(caster, Some(Command::stop(caster.id)), Decision::StandDown);
            }
        }
        for unit in low_health.iter().filter(|u| !contains(&needed_low, u)) {
            if self.is_pending(unit) {
                continue;
            }
            if let Some((command, decision)) = self.retreat_command(unit, &enemies) {
                self.issue(unit, Some(command), decision);
            }
        }

        let mut battle: Vec<&'c Unit> = needed_casters
            .into_iter()
            .chain(needed_low)
            .chain(others)
            .chain(healthy)
            .collect();
        battle.sort_by_key(|u| u.id);
        for &unit in &battle {
            if !self.is_pending(unit) {
                self.decide(unit, &battle);
            }
        }
    }

    fn update_threatened(&mut self, unit: &Unit) {
        let threatened = self
            .ctx
            .threats_to(unit, self.ctx.travel(unit))
            .iter()
            .any(|t| unit.position.distance(t.projected) <= t.effective_range);
        self.role_updates.push((unit.id, Role::Threatened, threatened));
    }

    fn issue(&mut self, unit: &Unit, command: Option<Command>, decision: Decision) {
        if let Some(command) = command {
            self.batch.push(command);
        }
        self.role_updates
            .push((unit.id, Role::Retreating, matches!(decision, Decision::Retreat(_))));
        debug!(tick = self.ctx.tick, unit = unit.id, ?decision, "Unit decision");
        self.decisions.push((unit.id, decision));
    }

    fn decide(&mut self, unit: &'c Unit, battle: &[&'c Unit]) {
        let ctx = self.ctx;
        let table = ctx.table();
        let radius = ctx.config.engagement_radius;
        let attackable = ctx
            .enemies
            .iter()
            .filter(|e| table.can_attack(unit, e) && e.distance_to(unit) < radius);
        let Some(target) = closest_unit(attackable, unit.position) else {
            self.idle(unit, battle);
            return;
        };

        let allies = units_within(battle.iter().copied(), unit.position, radius);
        let local_enemies = ctx.enemies_near(unit.position, radius);
        if should_engage(&ctx.stats, &allies, &local_enemies) {
            self.engage(unit, target);
        } else {
            self.disengage(unit, target, &local_enemies);
        }
    }

    fn engage(&mut self, unit: &Unit, target: &Unit) {
        if unit.is_melee {
            let decision = self.micro.melee(unit, target, &self.batch);
            self.issue(unit, decision.command, Decision::Melee(decision.state));
        } else {
            let command = self.micro.ranged(unit, target, &mut self.assigned);
            self.issue(unit, command, Decision::Ranged);
        }
    }

    fn disengage(&mut self, unit: &Unit, target: &Unit, local_enemies: &[&Unit]) {
        if unit.speed < target.speed {
            if unit.is_melee {
                if let Some(command) = self.micro.melee_step_back(unit) {
                    self.issue(unit, Some(command), Decision::StepBack);
                    return;
                }
            } else if self.in_attack_range(unit, target) {
                let command = self.micro.ranged(unit, target, &mut self.assigned);
                self.issue(unit, command, Decision::Ranged);
                return;
            }
            self.retreat_or_hold(unit, &[target]);
        } else if unit.is_flying {
            let away = move_away_position(self.world, target.position, unit.position, self.ctx.travel(unit));
            match away {
                Some(point) => self.issue(unit, Some(Command::move_to(unit.id, point)), Decision::MoveAway),
                None => self.issue(unit, Some(Command::stop(unit.id)), Decision::Hold),
            }
        } else {
            let threat = self.closest_by_range(unit, local_enemies).unwrap_or(target);
            self.retreat_or_hold(unit, &[threat]);
        }
    }

    fn retreat_command(&self, unit: &Unit, enemies: &[&Unit]) -> Option<(Command, Decision)> {
        self.resolver
            .resolve(unit, enemies)
            .map(|dest| (Command::move_to(unit.id, dest.point), Decision::Retreat(dest.kind)))
    }

    fn retreat_or_hold(&mut self, unit: &Unit, enemies: &[&Unit]) {
        match self.retreat_command(unit, enemies) {
            Some((command, decision)) => self.issue(unit, Some(command), decision),
            None => self.issue(unit, Some(Command::stop(unit.id)), Decision::Hold),
        }
    }

    /// Whether `target` is within weapon range of `unit`, allowing one step
    /// of movement for both.
    fn in_attack_range(&self, unit: &Unit, target: &Unit) -> bool {
        self.micro.attack_radius(unit, target).is_some_and(|radius| {
            unit.distance_to(target) <= radius + self.ctx.travel(unit) + self.ctx.travel(target)
        })
    }

    /// Enemy whose weapon reach is closest to covering `unit`.
    fn closest_by_range<'u>(&self, unit: &Unit, enemies: &[&'u Unit]) -> Option<&'u Unit> {
        let table = self.ctx.table();
        enemies
            .iter()
            .filter_map(|e| {
                let weapon = table.weapon_that_can_attack(&e.unit_type, unit)?;
                let margin = e.distance_to(unit) - (weapon.range + e.radius + unit.radius);
                Some((*e, margin))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.id.cmp(&b.0.id)))
            .map(|(e, _)| e)
    }

    fn idle(&mut self, unit: &Unit, battle: &[&Unit]) {
        let ctx = self.ctx;
        if ctx.config.clear_rocks && !self.world.is_outpowered() {
            let obstacles = ctx.neutral.iter().filter(|n| {
                n.health_max > 0.0
                    && n.distance_to(unit) < ctx.config.engagement_radius
                    && ctx.table().can_attack(unit, n)
            });
            if let Some(obstacle) = closest_unit(obstacles, unit.position) {
                self.clear_obstacle(unit, obstacle, battle);
                return;
            }
        }

        let bunker = closest_unit(ctx.ready_bunkers().filter(|b| b.can_load), unit.position);
        if let Some(bunker) = bunker {
            self.issue(unit, Some(Command::smart(unit.id, bunker.id)), Decision::LoadBunker(bunker.id));
        } else if let Some(rally) = self.world.combat_rally() {
            self.issue(unit, Some(Command::attack_position(unit.id, rally)), Decision::Rally);
        } else {
            self.issue(unit, None, Decision::Idle);
        }
    }

    fn clear_obstacle(&mut self, unit: &Unit, obstacle: &Unit, battle: &[&Unit]) {
        let Some(attack_radius) = self.micro.attack_radius(unit, obstacle) else {
            self.issue(unit, None, Decision::Idle);
            return;
        };
        let attack = Command::attack_unit(unit.id, obstacle.id);
        if unit.distance_to(obstacle) <= attack_radius + 1.0 {
            self.issue(unit, Some(attack), Decision::ClearObstacle(obstacle.id));
            return;
        }

        let claimed: Vec<Vec2> = self.batch.claimed_positions().map(|(p, _)| p).collect();
        let spot = border_positions(obstacle.position, attack_radius)
            .into_iter()
            .filter(|p| is_standable(self.world, *p, unit.is_flying))
            .filter(|p| {
                !battle
                    .iter()
                    .filter(|a| a.id != unit.id)
                    .any(|a| a.position.distance(*p) <= a.radius + unit.radius)
            })
            .filter(|p| !claimed.iter().any(|c| c.distance(*p) <= unit.radius * 2.0))
            .min_by(|a, b| {
                a.distance_squared(unit.position)
                    .total_cmp(&b.distance_squared(unit.position))
            });
        match spot {
            Some(point) => {
                self.batch.push(Command::move_to(unit.id, point));
                self.issue(unit, Some(attack.queued()), Decision::ClearObstacle(obstacle.id));
            }
            None => self.issue(unit, None, Decision::Idle),
        }
    }
}
