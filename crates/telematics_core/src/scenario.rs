//! World setup: inserts every resource the tick systems read.
//!
//! Drivers are spawned separately (see [`crate::spawner`]) so that a failing
//! driver configuration never prevents the world from being built.

use std::sync::Arc;

use bevy_ecs::prelude::{Resource, World};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::accident::AccidentCatalog;
use crate::activity::ActivityProfile;
use crate::clock::SimulationClock;
use crate::config::SimulationConfig;
use crate::control::{ControlResource, SimulationControl};
use crate::destination::DestinationRoutes;
use crate::publish::{GatewayResource, PublishGateway};
use crate::routing::{RouteSource, RouteSourceResource};
use crate::speed::SpeedModel;
use crate::systems::TickOutcome;

/// Single random stream shared by all systems, seeded for reproducible runs.
#[derive(Resource)]
pub struct SimRng(pub StdRng);

impl SimRng {
    pub fn from_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self(StdRng::seed_from_u64(seed)),
            None => Self(StdRng::from_entropy()),
        }
    }
}

/// Populates `world` with configuration, catalogs, the route source, the
/// publish gateway and the shared control flags.
pub fn build_world(
    world: &mut World,
    config: &SimulationConfig,
    routes: Box<dyn RouteSource>,
    gateway: PublishGateway,
    control: Arc<SimulationControl>,
    now_ms: u64,
) {
    world.insert_resource(SimulationClock::starting_at(now_ms));
    world.insert_resource(SimRng::from_seed(config.seed));
    world.insert_resource(config.behavior.clone());
    world.insert_resource(config.crash.clone());
    world.insert_resource(config.movement.clone());
    world.insert_resource(AccidentCatalog::with_weights(&config.crash.accident_weights));
    world.insert_resource(ActivityProfile::from_config(&config.activity));
    world.insert_resource(SpeedModel::new(config.movement.speed.clone()));
    world.insert_resource(DestinationRoutes::new(config.destination.clone()));
    world.insert_resource(RouteSourceResource(routes));
    world.insert_resource(GatewayResource(gateway));
    world.insert_resource(ControlResource(control));
    world.insert_resource(TickOutcome::default());
}
