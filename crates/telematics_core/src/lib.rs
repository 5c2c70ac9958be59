pub mod accident;
pub mod activity;
pub mod clock;
pub mod config;
pub mod control;
pub mod destination;
pub mod ecs;
pub mod error;
pub mod geo;
pub mod metrics;
pub mod publish;
pub mod record;
pub mod routing;
pub mod runner;
pub mod scenario;
pub mod sensors;
pub mod spawner;
pub mod speed;
pub mod synthesizer;
pub mod systems;
pub mod telemetry;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
