mod support;

use std::thread;
use std::time::Duration;

use telematics_core::control::{CrashTarget, MIN_INTERVAL_MS};
use telematics_core::ecs::BehaviorState;
use telematics_core::error::TriggerError;
use support::world::{TestSimBuilder, START_MS};

#[test]
fn pause_skips_generation_until_resumed() {
    let mut t = TestSimBuilder::new().with_drivers(2).build();
    let handle = t.sim.control_handle();
    let before = t.sim.snapshots().snapshot();

    handle.pause();
    assert_eq!(t.sim.run_for(5), 5);
    assert!(t.transport.sent().is_empty());
    assert_eq!(t.sim.snapshots().snapshot(), before);
    assert_eq!(t.sleeper.sleeps(), vec![Duration::from_millis(300); 5]);

    handle.resume();
    assert_eq!(t.sim.run_for(3), 3);
    assert_eq!(t.transport.sent().len(), 3);
}

#[test]
fn interval_changes_apply_to_pacing() {
    let mut t = TestSimBuilder::new()
        .with_config(|c| {
            c.jitter_ms = 0;
            c.min_sleep_ms = 0;
        })
        .build();
    let handle = t.sim.control_handle();
    assert_eq!(handle.set_interval_ms(20), MIN_INTERVAL_MS);
    assert_eq!(t.sim.next_delay(), Duration::from_millis(MIN_INTERVAL_MS));
    handle.set_interval_ms(2_000);
    assert_eq!(t.sim.next_delay(), Duration::from_millis(2_000));
}

#[test]
fn run_for_sleeps_between_ticks() {
    let mut t = TestSimBuilder::new().with_drivers(3).build();
    assert_eq!(t.sim.run_for(25), 25);
    assert_eq!(t.transport.sent().len(), 25);
    let sleeps = t.sleeper.sleeps();
    assert_eq!(sleeps.len(), 25);
    assert!(sleeps
        .iter()
        .all(|d| *d >= Duration::from_millis(500) && *d <= Duration::from_millis(1_000)));
}

#[test]
fn enabling_random_accidents_takes_effect_in_the_loop() {
    let mut t = TestSimBuilder::new()
        .with_config(|c| {
            c.crash.probability_per_tick = 1.0;
            c.crash.min_messages_before_crash = 0;
            c.behavior.stop_probability = 0.0;
            c.behavior.initial_states = vec![telematics_core::config::StateWeight {
                state: BehaviorState::Driving,
                weight: 1.0,
            }];
        })
        .build();
    let handle = t.sim.control_handle();

    let tick = t.tick_after(1, 500);
    assert!(tick.crash.is_none());

    handle.set_random_accidents(true);
    let tick = t.tick_after(1, 500);
    assert!(tick.crash.is_some());
    assert_eq!(tick.state, BehaviorState::PostCrashIdle);
    assert_eq!(t.sim.counts().post_crash_idle, 1);
}

#[test]
fn stop_from_another_thread_ends_the_loop() {
    let mut t = TestSimBuilder::new().with_drivers(2).build();
    let handle = t.sim.control_handle();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        handle.stop();
    });
    t.sim.run();
    stopper.join().expect("stopper");
    assert!(t.sim.control().is_stopped());
}

#[test]
fn manual_trigger_over_the_handle() {
    let mut t = TestSimBuilder::new().with_drivers(2).build();
    let handle = t.sim.control_handle();
    let requester = thread::spawn(move || {
        (
            handle.trigger_crash(CrashTarget::Driver(2), Duration::from_secs(10)),
            handle.trigger_crash(CrashTarget::Driver(9), Duration::from_secs(10)),
        )
    });
    let mut answered = 0;
    while answered < 2 {
        answered += t.sim.drain_commands();
        thread::yield_now();
    }
    let (first, second) = requester.join().expect("requester");
    assert_eq!(first.map(|r| r.driver_id), Ok(2));
    assert_eq!(second, Err(TriggerError::DriverNotFound(9)));
}

#[test]
fn request_abandoned_by_its_caller_is_never_applied() {
    let mut t = TestSimBuilder::new().with_drivers(1).build();
    if let Some(mut d) = t.sim.driver_mut(1) {
        d.set_state(BehaviorState::TrafficStop, START_MS);
    }
    let handle = t.sim.control_handle();

    let answer = handle.trigger_crash(CrashTarget::Driver(1), Duration::from_millis(1));
    assert_eq!(answer, Err(TriggerError::LoopUnavailable));

    assert_eq!(t.sim.drain_commands(), 0);
    let driver = t.sim.driver(1).expect("driver 1");
    assert_eq!(driver.state(), BehaviorState::TrafficStop);
    assert!(driver.crash().is_none());
    assert!(t.transport.sent().is_empty());
    assert_eq!(t.sim.messages_sent(), 0);
}
