pub mod behavior;
pub mod movement;
pub mod publish;
pub mod synthesize;

use bevy_ecs::prelude::Resource;

use crate::accident::AccidentType;
use crate::error::PublishError;
use crate::publish::PublishOutcome;
use crate::record::TelemetryRecord;
use crate::telemetry::DriverSnapshot;

/// Hand-off between the systems of one tick. Reset by the runner before each tick.
#[derive(Debug, Default, Resource)]
pub struct TickOutcome {
    /// Set when a crash fired on this tick; the synthesizer emits the crash event.
    pub crash: Option<AccidentType>,
    pub record: Option<TelemetryRecord>,
    pub snapshot: Option<DriverSnapshot>,
    pub publish: Option<Result<PublishOutcome, PublishError>>,
}
