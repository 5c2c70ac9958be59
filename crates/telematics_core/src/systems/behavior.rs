//! Behavior engine: advances one driver's state machine by one tick.
//!
//! One handler per [`BehaviorState`]; every rule is evaluated against the
//! time spent in the current state. A probabilistic crash can fire only while
//! driving; manual crashes go through [`check_manual_trigger`] and
//! [`crash_driver`] instead.

use bevy_ecs::prelude::{Query, Res, ResMut};
use log::{info, warn};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::accident::AccidentCatalog;
use crate::activity::ActivityProfile;
use crate::clock::{CurrentTick, SimulationClock, ONE_MIN_MS, ONE_SEC_MS};
use crate::config::{BehaviorConfig, CrashConfig, StateWeight};
use crate::control::ControlResource;
use crate::ecs::{BehaviorState, CrashSnapshot, Driver};
use crate::error::TriggerError;
use crate::scenario::SimRng;
use crate::systems::TickOutcome;

/// Read-only inputs to one behavior step.
pub struct BehaviorContext<'a> {
    pub behavior: &'a BehaviorConfig,
    pub crash: &'a CrashConfig,
    pub activity: &'a ActivityProfile,
    pub catalog: &'a AccidentCatalog,
    pub random_accidents_enabled: bool,
}

/// Advances `driver` by one tick. Returns the crash snapshot when a random
/// crash fired on this tick.
pub fn step_behavior<R: Rng + ?Sized>(
    driver: &mut Driver,
    ctx: &BehaviorContext<'_>,
    now_ms: u64,
    rng: &mut R,
) -> Option<CrashSnapshot> {
    match driver.state() {
        BehaviorState::PostCrashIdle => {
            post_crash_idle(driver, ctx, now_ms);
            None
        }
        BehaviorState::Parked => {
            parked(driver, ctx, now_ms, rng);
            None
        }
        BehaviorState::Driving => driving(driver, ctx, now_ms, rng),
        BehaviorState::TrafficStop => {
            if driver.time_in_state_ms(now_ms) >= driver.traffic_stop_dwell_ms {
                resume_driving(driver, now_ms);
            }
            None
        }
        BehaviorState::BreakTime => {
            if driver.time_in_state_ms(now_ms) >= ctx.behavior.break_duration_minutes * ONE_MIN_MS {
                resume_driving(driver, now_ms);
            }
            None
        }
    }
}

fn post_crash_idle(driver: &mut Driver, ctx: &BehaviorContext<'_>, now_ms: u64) {
    driver.set_speed(0.0);
    if driver.time_in_state_ms(now_ms) >= ctx.behavior.post_crash_idle_minutes * ONE_MIN_MS {
        driver.set_state(BehaviorState::Parked, now_ms);
        info!(
            "driver {} recovered from crash, now {}",
            driver.driver_id(),
            BehaviorState::Parked
        );
    }
}

fn parked<R: Rng + ?Sized>(driver: &mut Driver, ctx: &BehaviorContext<'_>, now_ms: u64, rng: &mut R) {
    if driver.time_in_state_ms(now_ms) <= ctx.behavior.min_parked_secs * ONE_SEC_MS {
        return;
    }
    let p = ctx
        .activity
        .start_probability(ctx.behavior.start_probability, now_ms);
    if rng.gen_bool(p) {
        resume_driving(driver, now_ms);
    }
}

fn driving<R: Rng + ?Sized>(
    driver: &mut Driver,
    ctx: &BehaviorContext<'_>,
    now_ms: u64,
    rng: &mut R,
) -> Option<CrashSnapshot> {
    if random_crash_due(driver, ctx, now_ms, rng) {
        return Some(crash_driver(driver, ctx.catalog, now_ms, rng));
    }

    let p = ctx
        .activity
        .stop_probability(ctx.behavior.stop_probability, now_ms);
    if rng.gen_bool(p) {
        let next = draw_state(&ctx.behavior.stop_transitions, rng).unwrap_or(BehaviorState::Parked);
        enter_stop(driver, next, ctx.behavior, now_ms, rng);
    }
    None
}

/// Zeroes speed and enters a stationary state. A traffic stop draws its dwell once.
pub fn enter_stop<R: Rng + ?Sized>(
    driver: &mut Driver,
    state: BehaviorState,
    config: &BehaviorConfig,
    now_ms: u64,
    rng: &mut R,
) {
    driver.set_speed(0.0);
    driver.set_state(state, now_ms);
    if state == BehaviorState::TrafficStop {
        let secs = if config.traffic_stop_max_secs > config.traffic_stop_min_secs {
            rng.gen_range(config.traffic_stop_min_secs..=config.traffic_stop_max_secs)
        } else {
            config.traffic_stop_min_secs
        };
        driver.traffic_stop_dwell_ms = secs * ONE_SEC_MS;
    }
    info!(
        "driver {} stopped on {}: {}",
        driver.driver_id(),
        driver.kinematics.street,
        state
    );
}

fn resume_driving(driver: &mut Driver, now_ms: u64) {
    let from = driver.state();
    driver.set_state(BehaviorState::Driving, now_ms);
    driver.last_moved_at_ms = None;
    if driver.kinematics.target_speed_mph <= 0.0 {
        driver.kinematics.target_speed_mph = f64::from(driver.kinematics.speed_limit_mph);
    }
    info!("driver {} {} -> {}", driver.driver_id(), from, BehaviorState::Driving);
}

fn random_crash_due<R: Rng + ?Sized>(
    driver: &Driver,
    ctx: &BehaviorContext<'_>,
    now_ms: u64,
    rng: &mut R,
) -> bool {
    if !ctx.random_accidents_enabled {
        return false;
    }
    if let Some(secs) = driver.secs_since_last_crash(now_ms) {
        if secs < ctx.crash.min_secs_between_crashes {
            return false;
        }
    }
    if driver.message_count < ctx.crash.min_messages_before_crash {
        return false;
    }
    rng.gen_bool(ctx.crash.probability_per_tick.clamp(0.0, 1.0))
}

/// Selects an accident type, freezes the crash snapshot and enters post-crash idle.
pub fn crash_driver<R: Rng + ?Sized>(
    driver: &mut Driver,
    catalog: &AccidentCatalog,
    now_ms: u64,
    rng: &mut R,
) -> CrashSnapshot {
    let stopped_at_control =
        driver.state() == BehaviorState::TrafficStop || driver.is_stopped_at_traffic_control();
    let accident = catalog.select(stopped_at_control, rng);
    let snapshot = driver.record_crash(accident, now_ms);
    warn!(
        "CRASH | driver {} | {} ({}) at {:.1} mph on {}",
        driver.driver_id(),
        accident,
        accident.display_name(),
        snapshot.speed_at_impact_mph,
        driver.kinematics.street
    );
    snapshot
}

/// Refuses a manual crash for a driver already in post-crash idle or still in cooldown.
pub fn check_manual_trigger(
    driver: &Driver,
    cooldown_secs: u64,
    now_ms: u64,
) -> Result<(), TriggerError> {
    if driver.state() == BehaviorState::PostCrashIdle {
        return Err(TriggerError::AlreadyCrashed(driver.driver_id()));
    }
    if let Some(secs) = driver.secs_since_last_crash(now_ms) {
        if secs < cooldown_secs {
            return Err(TriggerError::CooldownActive {
                driver_id: driver.driver_id(),
                remaining_secs: cooldown_secs - secs,
            });
        }
    }
    Ok(())
}

/// Weighted draw over `weights`. `None` when no weight is positive.
pub fn draw_state<R: Rng + ?Sized>(weights: &[StateWeight], rng: &mut R) -> Option<BehaviorState> {
    let index = WeightedIndex::new(weights.iter().map(|w| w.weight)).ok()?;
    Some(weights[index.sample(rng)].state)
}

pub fn behavior_system(
    tick: Res<CurrentTick>,
    clock: Res<SimulationClock>,
    behavior: Res<BehaviorConfig>,
    crash: Res<CrashConfig>,
    activity: Res<ActivityProfile>,
    catalog: Res<AccidentCatalog>,
    control: Res<ControlResource>,
    mut rng: ResMut<SimRng>,
    mut outcome: ResMut<TickOutcome>,
    mut drivers: Query<&mut Driver>,
) {
    let Ok(mut driver) = drivers.get_mut(tick.0) else {
        return;
    };
    let ctx = BehaviorContext {
        behavior: &behavior,
        crash: &crash,
        activity: &activity,
        catalog: &catalog,
        random_accidents_enabled: control.0.random_accidents_enabled(),
    };
    if let Some(snapshot) = step_behavior(&mut driver, &ctx, clock.now(), &mut rng.0) {
        outcome.crash = Some(snapshot.accident);
    }
}
