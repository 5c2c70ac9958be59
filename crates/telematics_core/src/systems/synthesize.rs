//! Builds the outgoing record from the driver's now-current state.

use bevy_ecs::prelude::{Query, Res, ResMut};

use crate::clock::{CurrentTick, SimulationClock};
use crate::config::CrashConfig;
use crate::ecs::Driver;
use crate::scenario::SimRng;
use crate::synthesizer::{generate_crash_event, generate_telemetry};
use crate::systems::TickOutcome;
use crate::telemetry::DriverSnapshot;

pub fn synthesize_system(
    tick: Res<CurrentTick>,
    clock: Res<SimulationClock>,
    crash: Res<CrashConfig>,
    mut rng: ResMut<SimRng>,
    mut outcome: ResMut<TickOutcome>,
    mut drivers: Query<&mut Driver>,
) {
    let Ok(mut driver) = drivers.get_mut(tick.0) else {
        return;
    };
    driver.message_count += 1;
    let now = clock.now();
    let record = match outcome.crash {
        Some(accident) => {
            generate_crash_event(&driver, accident, crash.min_crash_g_force, now, &mut rng.0)
        }
        None => generate_telemetry(&driver, now, &mut rng.0),
    };
    outcome.snapshot = Some(DriverSnapshot::from_driver(&driver));
    outcome.record = Some(record);
}
