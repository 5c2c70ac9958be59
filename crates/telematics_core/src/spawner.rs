//! Driver spawner: turns driver configurations into `Driver` entities.
//!
//! Each driver gets its preferred route (or a random one), a random starting
//! waypoint scattered slightly to mimic GPS noise, and an initial behavior state
//! drawn from the configured weights. A configuration that cannot produce a
//! driver is logged and skipped; the rest of the fleet still spawns.

use std::collections::HashSet;

use bevy_ecs::prelude::{Mut, World};
use log::{error, info};
use rand::{Rng, RngCore};

use crate::config::{BehaviorConfig, DriverConfig, MovementConfig};
use crate::ecs::{BehaviorState, Driver, DriverIdentity};
use crate::error::SpawnError;
use crate::geo::{initial_bearing_deg, GeoPoint};
use crate::routing::{RouteSource, RouteSourceResource};
use crate::scenario::SimRng;
use crate::systems::behavior::{draw_state, enter_stop};

/// Drivers spawned and configurations skipped by [`spawn_drivers`].
#[derive(Debug, Default)]
pub struct SpawnReport {
    pub spawned: Vec<u32>,
    pub skipped: Vec<SpawnError>,
}

pub fn build_driver<R: RngCore>(
    config: &DriverConfig,
    routes: &dyn RouteSource,
    behavior: &BehaviorConfig,
    movement: &MovementConfig,
    now_ms: u64,
    rng: &mut R,
) -> Result<Driver, SpawnError> {
    let home = config.home();
    if !home.is_valid() {
        return Err(SpawnError::InvalidHome {
            driver_id: config.driver_id,
            latitude: home.lat,
            longitude: home.lon,
        });
    }
    let route = match config.preferred_route.as_deref() {
        Some(name) => routes.route_by_name(name, rng),
        None => routes.random_route(rng),
    }
    .map_err(|source| SpawnError::Route {
        driver_id: config.driver_id,
        source,
    })?;

    let start = rng.gen_range(0..route.len());
    let identity = DriverIdentity {
        driver_id: config.driver_id,
        policy_id: config.policy_id,
        vehicle_id: config.vehicle_id,
        vin: config.vin.clone(),
        name: config.driver_name.clone(),
        home,
        aggressive: config.aggressive,
    };
    let mut driver = Driver::new(identity, route, start, now_ms);

    let jitter = movement.start_jitter_deg;
    if jitter > 0.0 {
        let p = driver.kinematics.position;
        driver.kinematics.position = GeoPoint::new(
            p.lat + rng.gen_range(-jitter..=jitter),
            p.lon + rng.gen_range(-jitter..=jitter),
        );
    }
    if let Some(next) = driver.next_waypoint().map(|wp| wp.point()) {
        driver.kinematics.bearing_deg = initial_bearing_deg(driver.kinematics.position, next);
    }

    match draw_state(&behavior.initial_states, rng).unwrap_or(BehaviorState::Parked) {
        BehaviorState::Driving => {
            let (lo, hi) = (behavior.initial_min_speed_mph, behavior.initial_max_speed_mph);
            let speed = if hi > lo { rng.gen_range(lo..=hi) } else { lo };
            driver.set_state(BehaviorState::Driving, now_ms);
            driver.set_speed(speed);
        }
        BehaviorState::Parked | BehaviorState::PostCrashIdle => {}
        stop => enter_stop(&mut driver, stop, behavior, now_ms, rng),
    }
    Ok(driver)
}

/// Spawns one entity per configuration. Duplicate ids and configurations that
/// fail to build are skipped and reported.
pub fn spawn_drivers(world: &mut World, configs: &[DriverConfig], now_ms: u64) -> SpawnReport {
    let mut seen: HashSet<u32> = world
        .query::<&Driver>()
        .iter(world)
        .map(Driver::driver_id)
        .collect();

    let built: Vec<Result<Driver, SpawnError>> = world.resource_scope(|world, mut rng: Mut<SimRng>| {
        let routes = world.resource::<RouteSourceResource>();
        let behavior = world.resource::<BehaviorConfig>();
        let movement = world.resource::<MovementConfig>();
        configs
            .iter()
            .map(|config| {
                if !seen.insert(config.driver_id) {
                    return Err(SpawnError::Duplicate(config.driver_id));
                }
                build_driver(config, routes.0.as_ref(), behavior, movement, now_ms, &mut rng.0)
            })
            .collect()
    });

    let mut report = SpawnReport::default();
    for result in built {
        match result {
            Ok(driver) => {
                info!(
                    "spawned driver {}{} (vehicle {}) on {} at waypoint {}/{}, {}",
                    driver.driver_id(),
                    driver
                        .identity
                        .name
                        .as_deref()
                        .map(|name| format!(" \"{name}\""))
                        .unwrap_or_default(),
                    driver.identity.vehicle_id,
                    driver.route().name(),
                    driver.cursor(),
                    driver.route().last_index(),
                    driver.state()
                );
                report.spawned.push(driver.driver_id());
                world.spawn(driver);
            }
            Err(err) => {
                error!("skipping driver: {err}");
                report.skipped.push(err);
            }
        }
    }
    report
}
