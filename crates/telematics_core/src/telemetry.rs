//! Dashboard snapshots: a copy-on-read view of the fleet for a reporting thread.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::accident::AccidentType;
use crate::ecs::{BehaviorState, Driver};
use crate::geo::cell_at;

/// Snapshot of one driver for visualization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverSnapshot {
    pub driver_id: u32,
    pub policy_id: u32,
    pub vehicle_id: u32,
    pub vin: String,
    pub driver_name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// H3 cell (resolution 9) of the position, for map bucketing.
    pub cell: Option<u64>,
    pub bearing: f64,
    pub speed_mph: f64,
    pub street: String,
    pub state: BehaviorState,
    pub route_name: String,
    pub trip_progress_pct: f64,
    pub destination: Option<String>,
    pub message_count: u64,
    pub accident_type: Option<AccidentType>,
}

impl DriverSnapshot {
    pub fn from_driver(driver: &Driver) -> Self {
        let id = &driver.identity;
        let kin = &driver.kinematics;
        Self {
            driver_id: id.driver_id,
            policy_id: id.policy_id,
            vehicle_id: id.vehicle_id,
            vin: id.vin.clone(),
            driver_name: id.name.clone(),
            latitude: kin.position.lat,
            longitude: kin.position.lon,
            cell: cell_at(kin.position).map(u64::from),
            bearing: kin.bearing_deg,
            speed_mph: kin.speed_mph,
            street: kin.street.clone(),
            state: driver.state(),
            route_name: driver.route().name().to_string(),
            trip_progress_pct: driver.trip_progress_pct(),
            destination: driver.destination.as_ref().map(|d| d.name.clone()),
            message_count: driver.message_count,
            accident_type: driver.crash().map(|c| c.accident),
        }
    }
}

/// Totals for one driver when the loop ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverFinalStats {
    pub driver_id: u32,
    pub driver_name: Option<String>,
    pub message_count: u64,
    pub state: BehaviorState,
    pub crashed: bool,
}

impl DriverFinalStats {
    pub fn from_driver(driver: &Driver) -> Self {
        Self {
            driver_id: driver.driver_id(),
            driver_name: driver.identity.name.clone(),
            message_count: driver.message_count,
            state: driver.state(),
            crashed: driver.last_crash_at_ms.is_some(),
        }
    }
}

/// Aggregated driver counts per behavior state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SimCounts {
    pub driving: usize,
    pub parked: usize,
    pub traffic_stop: usize,
    pub break_time: usize,
    pub post_crash_idle: usize,
}

impl SimCounts {
    pub fn add_driver(&mut self, state: BehaviorState) {
        match state {
            BehaviorState::Driving => self.driving += 1,
            BehaviorState::Parked => self.parked += 1,
            BehaviorState::TrafficStop => self.traffic_stop += 1,
            BehaviorState::BreakTime => self.break_time += 1,
            BehaviorState::PostCrashIdle => self.post_crash_idle += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.driving + self.parked + self.traffic_stop + self.break_time + self.post_crash_idle
    }
}

/// Fleet snapshot shared with readers on other threads. The simulation loop
/// replaces one entry per tick; readers clone the whole vector.
#[derive(Debug, Clone, Default)]
pub struct SharedSnapshots(Arc<RwLock<Vec<DriverSnapshot>>>);

impl SharedSnapshots {
    pub fn replace_all(&self, snapshots: Vec<DriverSnapshot>) {
        *self.0.write() = snapshots;
    }

    /// Replaces the entry for `snapshot.driver_id`, appending if it is new.
    pub fn upsert(&self, snapshot: DriverSnapshot) {
        let mut guard = self.0.write();
        match guard.iter_mut().find(|s| s.driver_id == snapshot.driver_id) {
            Some(slot) => *slot = snapshot,
            None => guard.push(snapshot),
        }
    }

    pub fn snapshot(&self) -> Vec<DriverSnapshot> {
        self.0.read().clone()
    }

    pub fn get(&self, driver_id: u32) -> Option<DriverSnapshot> {
        self.0.read().iter().find(|s| s.driver_id == driver_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    pub fn counts(&self) -> SimCounts {
        let mut counts = SimCounts::default();
        for s in self.0.read().iter() {
            counts.add_driver(s.state);
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::test_driver;

    #[test]
    fn snapshot_copies_driver_fields() {
        let mut driver = test_driver(9);
        driver.set_state(BehaviorState::Driving, 0);
        driver.set_speed(21.5);
        let snap = DriverSnapshot::from_driver(&driver);
        assert_eq!(snap.driver_id, 9);
        assert_eq!(snap.speed_mph, 21.5);
        assert_eq!(snap.state, BehaviorState::Driving);
        assert!(snap.cell.is_some());
        assert!(snap.accident_type.is_none());
    }

    #[test]
    fn upsert_replaces_in_place() {
        let shared = SharedSnapshots::default();
        let mut driver = test_driver(1);
        shared.replace_all(vec![
            DriverSnapshot::from_driver(&driver),
            DriverSnapshot::from_driver(&test_driver(2)),
        ]);
        driver.set_state(BehaviorState::BreakTime, 0);
        shared.upsert(DriverSnapshot::from_driver(&driver));
        assert_eq!(shared.len(), 2);
        assert_eq!(
            shared.get(1).map(|s| s.state),
            Some(BehaviorState::BreakTime)
        );
        let counts = shared.counts();
        assert_eq!(counts.break_time, 1);
        assert_eq!(counts.parked, 1);
        assert_eq!(counts.total(), 2);
    }

    #[test]
    fn readers_see_a_stable_copy() {
        let shared = SharedSnapshots::default();
        shared.upsert(DriverSnapshot::from_driver(&test_driver(1)));
        let copy = shared.snapshot();
        shared.upsert(DriverSnapshot::from_driver(&test_driver(2)));
        assert_eq!(copy.len(), 1);
        assert_eq!(shared.len(), 2);
    }
}
