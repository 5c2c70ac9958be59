use bevy_ecs::prelude::{Res, ResMut};

use crate::publish::GatewayResource;
use crate::systems::TickOutcome;

/// Hands the tick's record to the gateway. The outcome, including a routine
/// send failure, is left on [`TickOutcome`] for the runner to count and log.
pub fn publish_system(gateway: Res<GatewayResource>, mut outcome: ResMut<TickOutcome>) {
    let Some(record) = outcome.record.clone() else {
        return;
    };
    let Some(snapshot) = outcome.snapshot.as_ref() else {
        return;
    };
    let result = gateway.0.publish(record, snapshot);
    outcome.publish = Some(result);
}
