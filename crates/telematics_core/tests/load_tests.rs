mod support;

use std::collections::HashSet;
use std::time::Duration;

use telematics_core::ecs::BehaviorState;
use telematics_core::routing::FileRouteSource;
use support::world::TestSimBuilder;

#[test]
#[ignore] // Only run explicitly: cargo test --package telematics_core --test load_tests -- --ignored
fn fleet_of_fifty_runs_a_long_session() {
    let mut t = TestSimBuilder::new()
        .with_drivers(50)
        .with_routes(FileRouteSource::demo())
        .with_config(|c| {
            c.crash.random_accidents_enabled = true;
            c.crash.probability_per_tick = 0.01;
            c.crash.min_messages_before_crash = 2;
            c.summary_every = 1_000;
        })
        .build();

    let mut seen = HashSet::new();
    for _ in 0..5_000 {
        t.time.advance(Duration::from_millis(250));
        let report = t.sim.tick().expect("tick");
        seen.insert(report.driver_id);
        let driver = t.sim.driver(report.driver_id).expect("driver");
        assert!(driver.speed_mph() >= 0.0);
        assert!(driver.cursor() <= driver.route().last_index());
        assert!(report.delivered());
    }

    assert_eq!(seen.len(), 50, "uniform selection reaches every driver");
    assert_eq!(t.sim.messages_sent(), 5_000);
    let counts = t.sim.counts();
    assert_eq!(counts.total(), 50);
    let snapshots = t.sim.snapshots().snapshot();
    let messages: u64 = snapshots.iter().map(|s| s.message_count).sum();
    assert_eq!(messages, 5_000);
    for s in snapshots {
        if s.state == BehaviorState::PostCrashIdle {
            assert!(s.accident_type.is_some());
        }
    }
}

#[test]
#[ignore]
fn loop_mode_fleet_keeps_cursors_in_bounds() {
    let mut t = TestSimBuilder::new()
        .with_drivers(200)
        .with_config(|c| {
            c.movement.route_mode = telematics_core::config::RouteMode::Loop;
            c.summary_every = 0;
        })
        .build();

    for _ in 0..20_000 {
        t.time.advance(Duration::from_millis(100));
        let report = t.sim.tick().expect("tick");
        let driver = t.sim.driver(report.driver_id).expect("driver");
        assert!(driver.cursor() <= driver.route().last_index());
        assert_eq!(driver.route().name(), "test_route");
    }
    assert_eq!(t.sim.snapshots().len(), 200);
}
