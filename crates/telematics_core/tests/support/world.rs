#![allow(dead_code)]

use std::sync::Arc;

use bevy_ecs::prelude::World;
use telematics_core::clock::ManualTimeSource;
use telematics_core::config::SimulationConfig;
use telematics_core::control::SimulationControl;
use telematics_core::publish::{BroadcastSink, PublishGateway};
use telematics_core::routing::FileRouteSource;
use telematics_core::runner::Simulation;
use telematics_core::scenario::build_world;
use telematics_core::test_helpers::{
    test_driver_config, test_route_source, RecordingBackoff, RecordingTransport,
};

/// 2024-03-01T14:30:00Z, outside the default peak and night hours.
pub const START_MS: u64 = 1_709_303_400_000;

/// Configuration with a fixed seed and every probability left at its default.
pub fn seeded_config(seed: u64) -> SimulationConfig {
    SimulationConfig {
        seed: Some(seed),
        ..SimulationConfig::default()
    }
}

/// A simulation plus the test doubles wired into it.
pub struct TestSim {
    pub sim: Simulation,
    pub time: ManualTimeSource,
    pub transport: RecordingTransport,
    pub backoff: RecordingBackoff,
    pub sleeper: RecordingBackoff,
}

impl TestSim {
    /// Advances the manual clock, then ticks the given driver.
    pub fn tick_after(&mut self, driver_id: u32, millis: u64) -> telematics_core::runner::TickReport {
        self.time.advance(std::time::Duration::from_millis(millis));
        self.sim.tick_driver(driver_id).expect("driver exists")
    }
}

/// Builds a [`Simulation`] with a manual clock, a recording transport and no
/// real sleeps.
pub struct TestSimBuilder {
    config: SimulationConfig,
    drivers: u32,
    routes: FileRouteSource,
    transport: RecordingTransport,
    broadcast: Option<Box<dyn BroadcastSink>>,
}

impl Default for TestSimBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestSimBuilder {
    pub fn new() -> Self {
        Self {
            config: seeded_config(42),
            drivers: 1,
            routes: test_route_source(),
            transport: RecordingTransport::default(),
            broadcast: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn with_drivers(mut self, drivers: u32) -> Self {
        self.drivers = drivers;
        self
    }

    pub fn with_config(mut self, f: impl FnOnce(&mut SimulationConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn with_routes(mut self, routes: FileRouteSource) -> Self {
        self.routes = routes;
        self
    }

    pub fn with_transport(mut self, transport: RecordingTransport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_broadcast(mut self, broadcast: Box<dyn BroadcastSink>) -> Self {
        self.broadcast = Some(broadcast);
        self
    }

    pub fn build(self) -> TestSim {
        let time = ManualTimeSource::new(START_MS);
        let backoff = RecordingBackoff::default();
        let sleeper = RecordingBackoff::default();
        let mut builder = Simulation::builder(self.config)
            .drivers((1..=self.drivers).map(test_driver_config).collect())
            .routes(Box::new(self.routes))
            .transport(Box::new(self.transport.clone()))
            .backoff(Box::new(backoff.clone()))
            .sleeper(Box::new(sleeper.clone()))
            .time_source(Box::new(time.clone()));
        if let Some(broadcast) = self.broadcast {
            builder = builder.broadcast(broadcast);
        }
        let sim = builder.build().expect("valid test configuration");
        TestSim {
            sim,
            time,
            transport: self.transport,
            backoff,
            sleeper,
        }
    }
}

/// Builds a bare ECS world with every tick resource, for driving systems directly.
#[derive(Debug, Default)]
pub struct TestWorldBuilder {
    config: Option<SimulationConfig>,
    random_accidents: bool,
}

impl TestWorldBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.get_or_insert_with(SimulationConfig::default).seed = Some(seed);
        self
    }

    pub fn with_config(mut self, f: impl FnOnce(&mut SimulationConfig)) -> Self {
        f(self.config.get_or_insert_with(SimulationConfig::default));
        self
    }

    pub fn with_random_accidents(mut self, enabled: bool) -> Self {
        self.random_accidents = enabled;
        self
    }

    pub fn build(self) -> World {
        let config = self.config.unwrap_or_else(|| seeded_config(42));
        let mut world = World::new();
        let gateway = PublishGateway::new(
            Box::new(RecordingTransport::default()),
            config.publish.clone(),
        )
        .with_backoff(Box::new(RecordingBackoff::default()));
        build_world(
            &mut world,
            &config,
            Box::new(test_route_source()),
            gateway,
            Arc::new(SimulationControl::new(config.interval_ms, self.random_accidents)),
            START_MS,
        );
        world
    }
}
