//! Movement system: advances a driving vehicle along its route.
//!
//! Each step covers `speed * step_duration` metres toward the next waypoint.
//! Arriving within the threshold snaps onto the waypoint, advances the cursor
//! and recomputes the target speed. At the end of the route a new route is
//! assigned according to [`RouteMode`].

use bevy_ecs::prelude::{Query, Res, ResMut};
use log::{debug, info, warn};
use rand::RngCore;

use crate::clock::{CurrentTick, SimulationClock, ONE_SEC_MS};
use crate::config::{MovementConfig, RouteMode};
use crate::destination::DestinationRoutes;
use crate::ecs::{BehaviorState, Driver};
use crate::geo::{destination_point, distance_m, initial_bearing_deg, MPH_TO_MPS};
use crate::routing::{RouteSource, RouteSourceResource};
use crate::scenario::SimRng;
use crate::speed::SpeedModel;

pub struct MovementContext<'a> {
    pub config: &'a MovementConfig,
    pub speed: &'a SpeedModel,
    pub destinations: &'a DestinationRoutes,
    pub routes: &'a dyn RouteSource,
}

/// Seconds covered by this step: wall time since the last step, capped.
fn step_secs(driver: &Driver, config: &MovementConfig, now_ms: u64) -> f64 {
    match driver.last_moved_at_ms {
        None => config.default_step_secs,
        Some(last) => {
            let elapsed = now_ms.saturating_sub(last) as f64 / ONE_SEC_MS as f64;
            elapsed.min(config.max_step_secs)
        }
    }
}

/// Moves `driver` one step. No-op unless the driver is driving.
pub fn step_movement<R: RngCore>(
    driver: &mut Driver,
    ctx: &MovementContext<'_>,
    now_ms: u64,
    rng: &mut R,
) {
    if driver.state() != BehaviorState::Driving {
        return;
    }
    let secs = step_secs(driver, ctx.config, now_ms);
    driver.last_moved_at_ms = Some(now_ms);

    if driver.at_route_end() {
        reassign_route(driver, ctx, rng);
    }

    let target = driver.kinematics.target_speed_mph;
    let speed = if driver.speed_mph() <= 0.0 {
        ctx.speed.pull_away_mph(target, rng)
    } else {
        ctx.speed.drift_mph(driver.speed_mph(), target, rng)
    };
    driver.set_speed(speed);

    let Some(next) = driver.next_waypoint().map(|wp| wp.point()) else {
        return;
    };
    let position = driver.kinematics.position;
    let remaining_m = distance_m(position, next);
    let step_m = driver.speed_mph() * MPH_TO_MPS * secs;
    if step_m <= 0.0 {
        return;
    }

    if remaining_m <= ctx.config.arrival_threshold_m || step_m >= remaining_m {
        arrive(driver, ctx, rng);
    } else {
        let bearing = initial_bearing_deg(position, next);
        driver.kinematics.bearing_deg = bearing;
        driver.kinematics.position = destination_point(position, bearing, step_m);
    }
}

fn arrive<R: RngCore>(driver: &mut Driver, ctx: &MovementContext<'_>, rng: &mut R) {
    driver.advance_cursor();
    driver.kinematics.position = driver.current_waypoint().point();
    driver.adopt_waypoint_attributes();
    let target = ctx.speed.waypoint_target_mph(
        driver.current_waypoint(),
        driver.speed_mph(),
        driver.identity.aggressive,
        rng,
    );
    driver.kinematics.target_speed_mph = target;
    if let Some(next) = driver.next_waypoint().map(|wp| wp.point()) {
        driver.kinematics.bearing_deg = initial_bearing_deg(driver.kinematics.position, next);
    }
    debug!(
        "driver {} reached waypoint {}/{} on {} (target {:.1} mph)",
        driver.driver_id(),
        driver.cursor(),
        driver.route().last_index(),
        driver.kinematics.street,
        target
    );
}

fn reassign_route<R: RngCore>(driver: &mut Driver, ctx: &MovementContext<'_>, rng: &mut R) {
    if let Some(dest) = driver.destination.take() {
        info!("driver {} arrived at {} ({})", driver.driver_id(), dest.name, dest.kind);
    }
    match ctx.config.route_mode {
        RouteMode::Loop => restart_route(driver),
        RouteMode::Destination => {
            let home = driver.identity.home;
            let dest = ctx.destinations.random_destination(home, rng);
            match ctx
                .destinations
                .route_to(driver.kinematics.position, home, &dest, rng)
            {
                Ok(route) => {
                    info!(
                        "driver {} heading to {} ({:.1} mi, {} waypoints)",
                        driver.driver_id(),
                        dest.name,
                        dest.distance_miles,
                        route.len()
                    );
                    driver.assign_route(route, 0);
                    driver.destination = Some(dest);
                }
                Err(err) => {
                    warn!(
                        "driver {}: destination route failed ({err}), using a stored route",
                        driver.driver_id()
                    );
                    match ctx.routes.random_route(rng) {
                        Ok(route) => driver.assign_route(route, 0),
                        Err(_) => restart_route(driver),
                    }
                }
            }
        }
    }
}

fn restart_route(driver: &mut Driver) {
    let route = driver.route().clone();
    driver.assign_route(route, 0);
    debug!("driver {} restarting route {}", driver.driver_id(), driver.route().name());
}

pub fn movement_system(
    tick: Res<CurrentTick>,
    clock: Res<SimulationClock>,
    config: Res<MovementConfig>,
    speed: Res<SpeedModel>,
    destinations: Res<DestinationRoutes>,
    routes: Res<RouteSourceResource>,
    mut rng: ResMut<SimRng>,
    mut drivers: Query<&mut Driver>,
) {
    let Ok(mut driver) = drivers.get_mut(tick.0) else {
        return;
    };
    let ctx = MovementContext {
        config: &config,
        speed: &speed,
        destinations: &destinations,
        routes: routes.0.as_ref(),
    };
    step_movement(&mut driver, &ctx, clock.now(), &mut rng.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;
    use crate::routing::{FileRouteSource, Route, Waypoint};
    use crate::test_helpers::test_driver;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Fixture {
        config: MovementConfig,
        speed: SpeedModel,
        destinations: DestinationRoutes,
        routes: FileRouteSource,
    }

    impl Fixture {
        fn new(route_mode: RouteMode) -> Self {
            Self {
                config: MovementConfig {
                    route_mode,
                    ..MovementConfig::default()
                },
                speed: SpeedModel::default(),
                destinations: DestinationRoutes::default(),
                routes: FileRouteSource::demo(),
            }
        }

        fn ctx(&self) -> MovementContext<'_> {
            MovementContext {
                config: &self.config,
                speed: &self.speed,
                destinations: &self.destinations,
                routes: &self.routes,
            }
        }
    }

    fn two_point_route(meters_apart: f64) -> Route {
        let a = GeoPoint::new(40.7128, -74.0060);
        let b = destination_point(a, 0.0, meters_apart);
        Route::new(
            "pair",
            vec![
                Waypoint::new(a, "A St", 30),
                Waypoint::new(b, "B St", 40),
            ],
        )
        .expect("route")
    }

    #[test]
    fn non_driving_drivers_do_not_move() {
        let f = Fixture::new(RouteMode::Loop);
        let mut rng = StdRng::seed_from_u64(1);
        let mut d = test_driver(1);
        let before = d.kinematics.position;
        step_movement(&mut d, &f.ctx(), 1_000, &mut rng);
        assert_eq!(d.kinematics.position, before);
        assert!(d.last_moved_at_ms.is_none());
    }

    #[test]
    fn zero_step_duration_means_no_displacement() {
        let f = Fixture::new(RouteMode::Loop);
        let mut rng = StdRng::seed_from_u64(2);
        let mut d = test_driver(1);
        d.assign_route(two_point_route(2_000.0), 0);
        d.set_state(BehaviorState::Driving, 0);
        d.set_speed(30.0);
        d.last_moved_at_ms = Some(5_000);
        let before = d.kinematics.position;
        step_movement(&mut d, &f.ctx(), 5_000, &mut rng);
        assert_eq!(d.kinematics.position, before);
    }

    #[test]
    fn step_length_follows_speed_and_elapsed_time() {
        let f = Fixture::new(RouteMode::Loop);
        let mut rng = StdRng::seed_from_u64(3);
        let mut d = test_driver(1);
        d.assign_route(two_point_route(5_000.0), 0);
        d.set_state(BehaviorState::Driving, 0);
        d.set_speed(30.0);
        d.kinematics.target_speed_mph = 30.0;
        d.last_moved_at_ms = Some(0);
        let before = d.kinematics.position;
        step_movement(&mut d, &f.ctx(), 2_000, &mut rng);
        let moved = distance_m(before, d.kinematics.position);
        let expected = d.speed_mph() * MPH_TO_MPS * 2.0;
        assert!((moved - expected).abs() < 0.5, "moved {moved}, expected {expected}");
        assert_eq!(d.cursor(), 0);
    }

    #[test]
    fn elapsed_time_is_capped() {
        let f = Fixture::new(RouteMode::Loop);
        let mut rng = StdRng::seed_from_u64(4);
        let mut d = test_driver(1);
        d.assign_route(two_point_route(50_000.0), 0);
        d.set_state(BehaviorState::Driving, 0);
        d.set_speed(30.0);
        d.kinematics.target_speed_mph = 30.0;
        d.last_moved_at_ms = Some(0);
        let before = d.kinematics.position;
        step_movement(&mut d, &f.ctx(), 600_000, &mut rng);
        let moved = distance_m(before, d.kinematics.position);
        assert!(moved <= d.speed_mph() * MPH_TO_MPS * 5.0 + 0.5);
    }

    #[test]
    fn arrival_snaps_and_adopts_waypoint() {
        let f = Fixture::new(RouteMode::Loop);
        let mut rng = StdRng::seed_from_u64(5);
        let mut d = test_driver(1);
        d.assign_route(two_point_route(3.0), 0);
        d.set_state(BehaviorState::Driving, 0);
        d.set_speed(20.0);
        d.kinematics.target_speed_mph = 20.0;
        step_movement(&mut d, &f.ctx(), 1_000, &mut rng);
        assert_eq!(d.cursor(), 1);
        assert_eq!(d.kinematics.position, d.route().waypoint(1).point());
        assert_eq!(d.kinematics.street, "B St");
        assert_eq!(d.kinematics.speed_limit_mph, 40);
        assert_eq!(d.trip_progress_pct(), 100.0);
    }

    #[test]
    fn loop_mode_restarts_at_first_waypoint() {
        let f = Fixture::new(RouteMode::Loop);
        let mut rng = StdRng::seed_from_u64(6);
        let mut d = test_driver(1);
        d.assign_route(two_point_route(1_000.0), 1);
        d.set_state(BehaviorState::Driving, 0);
        step_movement(&mut d, &f.ctx(), 1_000, &mut rng);
        assert_eq!(d.route().name(), "pair");
        assert_eq!(d.cursor(), 0);
        assert!(d.destination.is_none());
    }

    #[test]
    fn destination_mode_generates_a_trip() {
        let f = Fixture::new(RouteMode::Destination);
        let mut rng = StdRng::seed_from_u64(7);
        let mut d = test_driver(1);
        d.assign_route(two_point_route(1_000.0), 1);
        d.set_state(BehaviorState::Driving, 0);
        step_movement(&mut d, &f.ctx(), 1_000, &mut rng);
        let dest = d.destination.clone().expect("destination");
        assert!(d.route().len() > f.destinations.config().min_waypoints);
        assert_eq!(d.route().waypoints().last().map(|w| w.point()), Some(dest.point));
        assert!(d.cursor() <= 1);
    }

    #[test]
    fn speed_stays_non_negative_over_many_steps() {
        let f = Fixture::new(RouteMode::Destination);
        let mut rng = StdRng::seed_from_u64(8);
        let mut d = test_driver(1);
        d.set_state(BehaviorState::Driving, 0);
        for i in 1..500u64 {
            step_movement(&mut d, &f.ctx(), i * 500, &mut rng);
            assert!(d.speed_mph() >= 0.0);
            assert!(d.cursor() <= d.route().last_index());
        }
    }
}
