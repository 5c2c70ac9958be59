#![allow(dead_code)]

use bevy_ecs::prelude::{Entity, World};
use telematics_core::ecs::{BehaviorState, Driver};
use telematics_core::test_helpers::test_driver;

/// Spawns a fixture driver already driving at `speed_mph`.
pub fn spawn_driving(world: &mut World, driver_id: u32, speed_mph: f64, now_ms: u64) -> Entity {
    let mut driver = test_driver(driver_id);
    driver.set_state(BehaviorState::Driving, now_ms);
    driver.set_speed(speed_mph);
    driver.kinematics.target_speed_mph = speed_mph;
    world.spawn(driver).id()
}

pub fn spawn_in_state(world: &mut World, driver_id: u32, state: BehaviorState, now_ms: u64) -> Entity {
    let mut driver = test_driver(driver_id);
    driver.set_state(state, now_ms);
    world.spawn(driver).id()
}

pub fn driver(world: &World, entity: Entity) -> &Driver {
    world.get::<Driver>(entity).expect("driver entity")
}
