//! Property-based tests for the kill-time math, engagement decisions, the
//! retreat resolver and the orchestrator.

use combat_core::context::TickContext;
use combat_core::prelude::*;
use combat_test_utils::fixtures::{snapshot, standard_table, validate, TestWorld};
use combat_test_utils::proptest::prelude::*;
use combat_test_utils::strategies::{arb_fight, arb_group, arb_position};

fn config() -> CombatConfig {
    CombatConfig::default()
}

proptest! {
    #[test]
    fn test_no_enemies_means_instant_win(friendly in arb_group(Alliance::Friendly, 6, 40.0)) {
        let table = standard_table();
        let config = config();
        let stats = CombatStats::new(&table, &config);
        let units = validate(&table, friendly);
        let ours: Vec<&Unit> = units.friendly.iter().collect();

        let times = stats.time_to_kill_and_be_killed(&ours, &[]);
        prop_assert_eq!(times.ttk, 0.0);
        prop_assert!(times.ttbk.is_infinite());
        prop_assert!(should_engage(&stats, &ours, &[]));
    }

    #[test]
    fn test_no_army_means_instant_loss(enemies in arb_group(Alliance::Enemy, 6, 40.0)) {
        prop_assume!(!enemies.is_empty());
        let table = standard_table();
        let config = config();
        let stats = CombatStats::new(&table, &config);
        let units = validate(&table, enemies);
        let theirs: Vec<&Unit> = units.enemies.iter().collect();

        let times = stats.time_to_kill_and_be_killed(&[], &theirs);
        prop_assert!(times.ttk.is_infinite());
        prop_assert_eq!(times.ttbk, 0.0);
        prop_assert!(!should_engage(&stats, &[], &theirs));
    }

    #[test]
    fn test_should_engage_matches_kill_times((friendly, enemies) in arb_fight(6, 40.0)) {
        let table = standard_table();
        let config = config();
        let stats = CombatStats::new(&table, &config);
        let mut all = friendly;
        all.extend(enemies);
        let units = validate(&table, all);
        let ours: Vec<&Unit> = units.friendly.iter().collect();
        let theirs: Vec<&Unit> = units.enemies.iter().collect();

        let times = stats.time_to_kill_and_be_killed(&ours, &theirs);
        prop_assert_eq!(should_engage(&stats, &ours, &theirs), times.ttk <= times.ttbk);
        prop_assert!(times.ttk >= 0.0 && times.ttbk >= 0.0);
    }

    #[test]
    fn test_minimal_reinforcement_is_shortest_winning_prefix(
        (friendly, enemies) in arb_fight(8, 40.0),
        split in 0usize..8,
    ) {
        let table = standard_table();
        let config = config();
        let stats = CombatStats::new(&table, &config);
        let mut all = friendly;
        all.extend(enemies);
        let units = validate(&table, all);
        let split = split.min(units.friendly.len());
        let base: Vec<&Unit> = units.friendly[..split].iter().collect();
        let candidates: Vec<&Unit> = units.friendly[split..].iter().collect();
        let theirs: Vec<&Unit> = units.enemies.iter().collect();

        let chosen = minimal_reinforcement(&stats, &candidates, &base, &theirs);
        prop_assert!(chosen.len() <= candidates.len());
        for (picked, candidate) in chosen.iter().zip(&candidates) {
            prop_assert_eq!(picked.id, candidate.id);
        }

        let wins_with = |n: usize| {
            let group: Vec<&Unit> = base.iter().chain(&candidates[..n]).copied().collect();
            should_engage(&stats, &group, &theirs)
        };
        let winning_prefix = (0..=candidates.len()).find(|&n| wins_with(n));
        match winning_prefix {
            Some(n) => {
                prop_assert_eq!(chosen.len(), n);
                prop_assert!(wins_with(chosen.len()));
            }
            None => prop_assert_eq!(chosen.len(), candidates.len()),
        }
    }

    #[test]
    fn test_retreat_destination_is_pathable(
        (friendly, enemies) in arb_fight(4, 30.0),
        wall in arb_position(30.0),
        rally in arb_position(30.0),
    ) {
        prop_assume!(!friendly.is_empty());
        let world = TestWorld::new(30.0, 30.0)
            .with_rally(rally.x, rally.y)
            .with_expansion(5.0, 5.0)
            .with_blocked(wall, wall + Vec2::new(4.0, 6.0));
        let table = standard_table();
        let config = config();
        let tracker = EnemyTracker::new();
        let mut all = friendly;
        all.extend(enemies);
        let ctx = TickContext::new(0, 0.0, &table, &config, &tracker, validate(&table, all));
        let resolver = RetreatResolver::new(&ctx, &world);
        let enemies: Vec<&Unit> = ctx.enemies.iter().collect();

        for unit in &ctx.friendly {
            if let Some(dest) = resolver.resolve(unit, &enemies) {
                prop_assert!(dest.point.is_finite());
                prop_assert!(unit.is_flying || world.is_pathable(dest.point));
                let size = world.map_size();
                prop_assert!(dest.point.x >= 0.0 && dest.point.x <= size.x);
                prop_assert!(dest.point.y >= 0.0 && dest.point.y <= size.y);
            }
        }
    }

    #[test]
    fn test_orchestrator_tick_is_idempotent((friendly, enemies) in arb_fight(5, 30.0)) {
        let world = TestWorld::new(30.0, 30.0).with_rally(2.0, 2.0);
        let mut all = friendly;
        all.extend(enemies);
        let snap = snapshot(1, all);
        let mut orch = CombatOrchestrator::new(standard_table(), config());

        let first = orch.run_tick(&snap, &world);
        let second = orch.run_tick(&snap, &world);
        prop_assert_eq!(first.batch_hash(), second.batch_hash());
        prop_assert_eq!(first.commands(), second.commands());

        for unit in &snap.units {
            let replacing = first.commands_for(unit.id).filter(|c| !c.queue).count();
            prop_assert!(replacing <= 1);
        }
    }
}
