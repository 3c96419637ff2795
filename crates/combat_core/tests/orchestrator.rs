//! Orchestrator behaviour over whole ticks and multi-tick skirmishes.

use combat_core::command::Ability;
use combat_core::micro::MeleeState;
use combat_core::prelude::*;
use combat_test_utils::determinism::{find_first_divergence, run_parallel_scoped, verify_determinism};
use combat_test_utils::fixtures::{enemy, friendly, neutral, snapshot, standard_table, TestWorld};
use combat_test_utils::skirmish::Skirmish;

fn orchestrator() -> CombatOrchestrator {
    CombatOrchestrator::new(standard_table(), CombatConfig::default())
}

// =============================================================================
// Single-tick Decisions
// =============================================================================

mod decisions {
    use super::*;

    /// An outmatched flyer that is faster than its attacker just moves away.
    #[test]
    fn test_outmatched_flyer_moves_away() {
        let mut orch = orchestrator();
        let batch = orch.run_tick(
            &snapshot(1, vec![friendly(1, "hawk", 50.0, 50.0), enemy(2, "brute", 53.0, 50.0)]),
            &TestWorld::open(),
        );
        assert_eq!(orch.last_report().decision_for(1), Some(Decision::MoveAway));
        let command = batch.commands_for(1).next().expect("command for hawk");
        assert_eq!(command.ability, Ability::Move);
        assert!(command.target_position.expect("move target").x < 50.0);
    }

    /// A slow melee unit caught by faster melee enemies while reloading
    /// backs off from them instead of running.
    #[test]
    fn test_slow_melee_steps_back_while_reloading() {
        let mut crawler = friendly(1, "crawler", 50.0, 50.0);
        crawler.weapon_cooldown = 20.0;
        let mut orch = orchestrator();
        let batch = orch.run_tick(
            &snapshot(1, vec![crawler, enemy(2, "blade", 51.2, 50.0), enemy(3, "blade", 50.0, 51.2)]),
            &TestWorld::open(),
        );
        assert_eq!(orch.last_report().decision_for(1), Some(Decision::StepBack));
        let target = batch.commands_for(1).next().and_then(|c| c.target_position).expect("move target");
        assert!(target.x < 50.0 && target.y < 50.0);
    }

    /// The same slow unit with its weapon ready hits the weakest enemy in contact.
    #[test]
    fn test_slow_melee_hits_weakest_when_ready() {
        let mut hurt = enemy(3, "blade", 50.0, 51.2);
        hurt.shield = 0.0;
        let mut orch = orchestrator();
        let batch = orch.run_tick(
            &snapshot(1, vec![friendly(1, "crawler", 50.0, 50.0), enemy(2, "blade", 51.2, 50.0), hurt]),
            &TestWorld::open(),
        );
        assert_eq!(batch.commands_for(1).next(), Some(&Command::attack_unit(1, 3)));
    }

    /// Melee units converging on one target spread around it.
    #[test]
    fn test_melee_units_take_distinct_surround_spots() {
        let mut orch = orchestrator();
        let batch = orch.run_tick(
            &snapshot(
                1,
                vec![
                    friendly(1, "blade", 40.0, 50.0),
                    friendly(2, "blade", 40.0, 52.0),
                    friendly(3, "blade", 40.0, 48.0),
                    enemy(10, "rifleman", 46.0, 50.0),
                ],
            ),
            &TestWorld::open(),
        );

        let target = Vec2::new(46.0, 50.0);
        let spots: Vec<Vec2> = (1..=3)
            .map(|id| {
                assert_eq!(
                    orch.last_report().decision_for(id),
                    Some(Decision::Melee(MeleeState::Surrounding))
                );
                batch.commands_for(id).next().and_then(|c| c.target_position).expect("surround spot")
            })
            .collect();
        for (i, a) in spots.iter().enumerate() {
            assert!((a.distance(target) - 1.1).abs() < 1e-6);
            for b in &spots[i + 1..] {
                assert!(a.distance(*b) >= 1.0 - 1e-9, "spots {a:?} and {b:?} overlap");
            }
        }
    }

    /// Pocket around (50, 50) with no room to retreat.
    fn boxed_in() -> TestWorld {
        TestWorld::open()
            .with_blocked(Vec2::new(0.0, 0.0), Vec2::new(47.5, 100.0))
            .with_blocked(Vec2::new(52.5, 0.0), Vec2::new(100.0, 100.0))
            .with_blocked(Vec2::new(0.0, 0.0), Vec2::new(100.0, 47.5))
            .with_blocked(Vec2::new(0.0, 52.5), Vec2::new(100.0, 100.0))
    }

    /// A held unit whose stop shows as an empty order list is decided again
    /// on the next tick.
    #[test]
    fn test_held_unit_redecided_after_stop() {
        let world = boxed_in();
        let units = vec![friendly(1, "rifleman", 50.0, 50.0), enemy(2, "brute", 54.0, 50.0)];
        let mut orch = orchestrator();
        let batch = orch.run_tick(&snapshot(1, units.clone()), &world);
        assert_eq!(orch.last_report().decision_for(1), Some(Decision::Hold));
        assert_eq!(batch.commands_for(1).next(), Some(&Command::stop(1)));

        let batch = orch.run_tick(&snapshot(2, units), &world);
        assert_eq!(orch.last_report().decision_for(1), Some(Decision::Hold));
        assert!(batch.has_command_for(1));
        assert!(orch.pending().get(1).is_some_and(|e| e.issued_tick == 2));
    }

    /// Until the old order is gone the stop is still pending.
    #[test]
    fn test_stop_pending_while_old_order_shows() {
        let world = boxed_in();
        let mut orch = orchestrator();
        orch.run_tick(
            &snapshot(1, vec![friendly(1, "rifleman", 50.0, 50.0), enemy(2, "brute", 54.0, 50.0)]),
            &world,
        );

        let mut busy = friendly(1, "rifleman", 50.0, 50.0);
        busy.orders.push(ObservedOrder {
            ability: Ability::Move,
            target_unit_id: None,
            target_position: Some(Vec2::new(80.0, 50.0)),
        });
        let batch = orch.run_tick(&snapshot(2, vec![busy, enemy(2, "brute", 54.0, 50.0)]), &world);
        assert_eq!(orch.last_report().decision_for(1), Some(Decision::Pending));
        assert!(!batch.has_command_for(1));
    }

    /// A short move finished within the step releases the unit.
    #[test]
    fn test_finished_move_away_redecided() {
        let world = TestWorld::open();
        let mut orch = orchestrator();
        let batch = orch.run_tick(
            &snapshot(1, vec![friendly(1, "hawk", 50.0, 50.0), enemy(2, "brute", 53.0, 50.0)]),
            &world,
        );
        let target = batch.commands_for(1).next().and_then(|c| c.target_position).expect("move target");

        orch.run_tick(
            &snapshot(2, vec![friendly(1, "hawk", target.x, target.y), enemy(2, "brute", 53.0, 50.0)]),
            &world,
        );
        assert_eq!(orch.last_report().decision_for(1), Some(Decision::MoveAway));
    }

    /// Obstacles are only cleared while we are not outpowered.
    #[test]
    fn test_obstacles_left_alone_when_outpowered() {
        let units = vec![friendly(1, "rifleman", 50.0, 50.0), neutral(9, "rock", 53.0, 50.0)];

        let mut orch = orchestrator();
        orch.run_tick(&snapshot(1, units.clone()), &TestWorld::open().with_rally(20.0, 20.0));
        assert_eq!(orch.last_report().decision_for(1), Some(Decision::ClearObstacle(9)));

        let mut orch = orchestrator();
        let batch = orch.run_tick(&snapshot(1, units), &TestWorld::open().with_rally(20.0, 20.0).outpowered());
        assert_eq!(orch.last_report().decision_for(1), Some(Decision::Rally));
        assert_eq!(batch.commands(), &[Command::attack_position(1, Vec2::new(20.0, 20.0))]);
    }

    /// Clearing is also switched off by configuration.
    #[test]
    fn test_obstacle_clearing_can_be_disabled() {
        let config = CombatConfig {
            clear_rocks: false,
            ..CombatConfig::default()
        };
        let mut orch = CombatOrchestrator::new(standard_table(), config);
        orch.run_tick(
            &snapshot(1, vec![friendly(1, "rifleman", 50.0, 50.0), neutral(9, "rock", 53.0, 50.0)]),
            &TestWorld::open(),
        );
        assert_eq!(orch.last_report().decision_for(1), Some(Decision::Idle));
    }

    /// Retreating and threatened tags follow the unit's situation.
    #[test]
    fn test_role_tags_follow_the_fight() {
        let mut orch = orchestrator();
        let world = TestWorld::open();
        orch.run_tick(
            &snapshot(1, vec![friendly(1, "rifleman", 50.0, 50.0), enemy(2, "brute", 54.0, 50.0)]),
            &world,
        );
        assert!(orch.roles().has(1, Role::Retreating));
        assert!(orch.roles().has(1, Role::Threatened));

        orch.run_tick(&snapshot(5, vec![friendly(1, "rifleman", 20.0, 50.0)]), &world);
        assert!(!orch.roles().has(1, Role::Retreating));
        assert!(!orch.roles().has(1, Role::Threatened));
    }

    /// Dead units lose their tags.
    #[test]
    fn test_roles_dropped_for_dead_units() {
        let mut orch = orchestrator();
        orch.roles_mut().set(4, Role::Defending);
        orch.run_tick(&snapshot(1, vec![friendly(1, "rifleman", 50.0, 50.0)]), &TestWorld::open());
        assert!(!orch.roles().has(4, Role::Defending));
    }
}

// =============================================================================
// Idempotence and Determinism
// =============================================================================

mod determinism {
    use super::*;

    fn melee() -> Skirmish<TestWorld> {
        Skirmish::new(
            "melee-brawl",
            TestWorld::open().with_rally(10.0, 50.0),
            vec![
                friendly(1, "blade", 40.0, 50.0),
                friendly(2, "blade", 40.0, 52.0),
                friendly(3, "rifleman", 36.0, 50.0),
                friendly(4, "rifleman", 36.0, 48.0),
                friendly(5, "hawk", 38.0, 55.0),
                enemy(10, "rifleman", 52.0, 50.0),
                enemy(11, "brute", 53.0, 47.0),
                enemy(12, "blade", 50.0, 53.0),
            ],
        )
        .with_enemy_velocity(11, Vec2::new(-0.5, 0.0))
        .with_enemy_velocity(12, Vec2::new(-0.8, -0.1))
    }

    /// Re-running a tick on an identical snapshot yields the identical batch.
    #[test]
    fn test_rerun_is_idempotent() {
        let world = TestWorld::open();
        let snap = snapshot(
            1,
            vec![
                friendly(1, "blade", 40.0, 50.0),
                friendly(2, "rifleman", 38.0, 50.0),
                friendly(3, "crawler", 40.0, 46.0),
                enemy(10, "brute", 46.0, 50.0),
                enemy(11, "rifleman", 47.0, 52.0),
            ],
        );
        let mut orch = orchestrator();
        let first = orch.run_tick(&snap, &world);
        let report = orch.last_report().clone();
        let second = orch.run_tick(&snap, &world);
        assert_eq!(first.commands(), second.commands());
        assert_eq!(first.batch_hash(), second.batch_hash());
        assert_eq!(&report, orch.last_report());
    }

    #[test]
    fn test_skirmish_is_deterministic() {
        verify_determinism(3, 30, melee, |s| { s.step(); }, Skirmish::state_hash).assert_deterministic();
    }

    #[test]
    fn test_parallel_skirmishes_match() {
        run_parallel_scoped(4, 30, melee, |s| { s.step(); }, Skirmish::state_hash).assert_deterministic();
    }

    #[test]
    fn test_no_divergence_tick() {
        assert_eq!(find_first_divergence(melee, 30, |s| { s.step(); }, Skirmish::state_hash), None);
    }

    #[test]
    fn test_decision_logs_verify() {
        let mut a = melee();
        let mut b = melee();
        a.run(30);
        b.run(30);
        assert!(a.log().verify_against(b.log()).is_ok());

        let decoded = DecisionLog::from_bytes(&a.log().to_bytes().expect("encode")).expect("decode");
        assert!(decoded.verify_against(b.log()).is_ok());
        assert_eq!(decoded.scenario, "melee-brawl");
    }

    /// Every unit gets at most one replacing command per tick, over a whole skirmish.
    #[test]
    fn test_one_command_per_unit_per_tick() {
        let mut skirmish = melee();
        for _ in 0..30 {
            let batch = skirmish.step();
            for unit in skirmish.units() {
                let replacing = batch.commands_for(unit.id).filter(|c| !c.queue).count();
                assert!(replacing <= 1, "unit {} got {replacing} commands at tick {}", unit.id, batch.tick());
            }
        }
    }
}
