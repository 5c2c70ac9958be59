mod support;

use telematics_core::accident::AccidentType;
use telematics_core::clock::{ONE_MIN_MS, ONE_SEC_MS};
use telematics_core::ecs::BehaviorState;
use telematics_core::geo::distance_m;
use support::entities::{driver, spawn_driving, spawn_in_state};
use support::schedule::ScheduleRunner;
use support::world::{TestWorldBuilder, START_MS};

#[test]
fn disabled_random_accidents_never_crash_a_driver() {
    let mut world = TestWorldBuilder::new()
        .with_config(|c| {
            c.crash.probability_per_tick = 1.0;
            c.crash.min_messages_before_crash = 0;
        })
        .with_random_accidents(false)
        .build();
    let drivers: Vec<_> = (1..=5)
        .map(|id| spawn_driving(&mut world, id, 30.0, START_MS))
        .collect();
    let mut runner = ScheduleRunner::new();
    for step in 1..=2_000u64 {
        let entity = drivers[(step % 5) as usize];
        let outcome = runner.tick_at(&mut world, entity, START_MS + step * 500);
        assert!(outcome.crash.is_none());
        assert_ne!(driver(&world, entity).state(), BehaviorState::PostCrashIdle);
    }
}

#[test]
fn speed_and_cursor_invariants_hold_every_tick() {
    let mut world = TestWorldBuilder::new().with_seed(7).build();
    let drivers: Vec<_> = (1..=4)
        .map(|id| spawn_driving(&mut world, id, 25.0, START_MS))
        .collect();
    let mut runner = ScheduleRunner::new();
    for step in 1..=3_000u64 {
        let entity = drivers[(step % 4) as usize];
        runner.tick_at(&mut world, entity, START_MS + step * 750);
        let d = driver(&world, entity);
        assert!(d.speed_mph() >= 0.0, "negative speed at step {step}");
        assert!(d.cursor() <= d.route().last_index());
        assert!((0.0..=100.0).contains(&d.trip_progress_pct()));
        if d.state() == BehaviorState::PostCrashIdle {
            assert!(d.crash().is_some());
        } else {
            assert!(d.crash().is_none());
        }
    }
}

#[test]
fn stationary_drivers_do_not_move() {
    let mut world = TestWorldBuilder::new()
        .with_config(|c| c.behavior.start_probability = 0.0)
        .build();
    let parked = spawn_in_state(&mut world, 1, BehaviorState::Parked, START_MS);
    let on_break = spawn_in_state(&mut world, 2, BehaviorState::BreakTime, START_MS);
    let start = driver(&world, parked).kinematics.position;
    let mut runner = ScheduleRunner::new();
    for step in 1..=100u64 {
        let now = START_MS + step * ONE_SEC_MS;
        for entity in [parked, on_break] {
            let outcome = runner.tick_at(&mut world, entity, now);
            let record = outcome.record.expect("record");
            assert_eq!(record.speed_mph, 0.0);
        }
    }
    assert_eq!(driver(&world, parked).kinematics.position, start);
    assert_eq!(driver(&world, on_break).kinematics.position, start);
}

#[test]
fn distance_moved_tracks_speed() {
    let mut world = TestWorldBuilder::new()
        .with_config(|c| {
            c.behavior.stop_probability = 0.0;
            c.movement.speed.noise_mph = 0.0;
        })
        .build();
    let slow = spawn_driving(&mut world, 1, 10.0, START_MS);
    let fast = spawn_driving(&mut world, 2, 40.0, START_MS);
    let mut runner = ScheduleRunner::new();
    let now = START_MS + ONE_SEC_MS;
    let slow_start = driver(&world, slow).kinematics.position;
    let fast_start = driver(&world, fast).kinematics.position;
    runner.tick_at(&mut world, slow, now);
    runner.tick_at(&mut world, fast, now);
    let slow_moved = distance_m(slow_start, driver(&world, slow).kinematics.position);
    let fast_moved = distance_m(fast_start, driver(&world, fast).kinematics.position);
    assert!(slow_moved > 0.0);
    assert!(fast_moved > slow_moved * 2.0, "{fast_moved} vs {slow_moved}");
}

#[test]
fn traffic_stop_resumes_after_its_dwell() {
    let mut world = TestWorldBuilder::new()
        .with_config(|c| {
            c.behavior.stop_probability = 1.0;
            c.behavior.stop_transitions = vec![telematics_core::config::StateWeight {
                state: BehaviorState::TrafficStop,
                weight: 1.0,
            }];
        })
        .build();
    let entity = spawn_driving(&mut world, 1, 30.0, START_MS);
    let mut runner = ScheduleRunner::new();
    let outcome = runner.tick_at(&mut world, entity, START_MS + ONE_SEC_MS);
    assert_eq!(outcome.record.map(|r| r.speed_mph), Some(0.0));
    let d = driver(&world, entity);
    assert_eq!(d.state(), BehaviorState::TrafficStop);
    let resume_at = d.state_changed_at_ms() + d.traffic_stop_dwell_ms;

    runner.tick_at(&mut world, entity, resume_at - 1);
    assert_eq!(driver(&world, entity).state(), BehaviorState::TrafficStop);
    runner.tick_at(&mut world, entity, resume_at);
    assert_eq!(driver(&world, entity).state(), BehaviorState::Driving);
}

#[test]
fn random_crash_freezes_speed_at_impact() {
    let mut world = TestWorldBuilder::new()
        .with_config(|c| {
            c.crash.probability_per_tick = 1.0;
            c.crash.min_messages_before_crash = 0;
            c.behavior.stop_probability = 0.0;
        })
        .with_random_accidents(true)
        .build();
    let entity = spawn_driving(&mut world, 1, 37.5, START_MS);
    let mut runner = ScheduleRunner::new();
    let outcome = runner.tick_at(&mut world, entity, START_MS + ONE_SEC_MS);

    let accident = outcome.crash.expect("crash fired");
    assert_ne!(accident, AccidentType::RearEnded);
    let record = outcome.record.expect("crash record");
    assert_eq!(record.accident_type, Some(accident));
    assert_eq!(record.speed_mph, 37.5);
    assert!(record.g_force >= 6.0);
    let d = driver(&world, entity);
    assert_eq!(d.state(), BehaviorState::PostCrashIdle);
    assert_eq!(d.speed_mph(), 0.0);

    // Idle ticks echo the tag with frozen readings.
    let idle = runner
        .tick_at(&mut world, entity, START_MS + 2 * ONE_MIN_MS)
        .record
        .expect("idle record");
    assert_eq!(idle.accident_type, Some(accident));
    assert_eq!(idle.speed_mph, 0.0);
    assert_eq!(idle.gps_satellite_count, 12);
}
