#![allow(dead_code)]

use bevy_ecs::prelude::{Entity, World};
use bevy_ecs::schedule::Schedule;
use telematics_core::clock::{CurrentTick, SimulationClock};
use telematics_core::runner::tick_schedule;
use telematics_core::systems::TickOutcome;

/// Owns a reusable tick schedule so tests can step single drivers.
pub struct ScheduleRunner {
    schedule: Schedule,
}

impl Default for ScheduleRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleRunner {
    pub fn new() -> Self {
        Self {
            schedule: tick_schedule(),
        }
    }

    /// Sets the clock, runs one tick for `entity` and returns what it produced.
    pub fn tick_at(&mut self, world: &mut World, entity: Entity, now_ms: u64) -> TickOutcome {
        world.resource_mut::<SimulationClock>().set(now_ms);
        world.insert_resource(TickOutcome::default());
        world.insert_resource(CurrentTick(entity));
        self.schedule.run(world);
        std::mem::take(&mut *world.resource_mut::<TickOutcome>())
    }
}
