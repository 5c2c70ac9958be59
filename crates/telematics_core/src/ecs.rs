use std::fmt;

use bevy_ecs::prelude::Component;
use serde::{Deserialize, Serialize};

use crate::accident::AccidentType;
use crate::geo::GeoPoint;
use crate::routing::{Route, Waypoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BehaviorState {
    Driving,
    Parked,
    TrafficStop,
    BreakTime,
    PostCrashIdle,
}

impl BehaviorState {
    pub const ALL: [BehaviorState; 5] = [
        BehaviorState::Driving,
        BehaviorState::Parked,
        BehaviorState::TrafficStop,
        BehaviorState::BreakTime,
        BehaviorState::PostCrashIdle,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BehaviorState::Driving => "DRIVING",
            BehaviorState::Parked => "PARKED",
            BehaviorState::TrafficStop => "TRAFFIC_STOP",
            BehaviorState::BreakTime => "BREAK_TIME",
            BehaviorState::PostCrashIdle => "POST_CRASH_IDLE",
        }
    }
}

impl fmt::Display for BehaviorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static identity of one simulated vehicle and its policy holder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverIdentity {
    pub driver_id: u32,
    pub policy_id: u32,
    pub vehicle_id: u32,
    pub vin: String,
    /// Display name, when the driver file gives one.
    pub name: Option<String>,
    pub home: GeoPoint,
    pub aggressive: bool,
}

/// Mutable kinematic snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Kinematics {
    pub position: GeoPoint,
    pub bearing_deg: f64,
    /// Never negative; see [`Driver::set_speed`].
    pub speed_mph: f64,
    pub target_speed_mph: f64,
    pub street: String,
    pub speed_limit_mph: u32,
}

/// Values frozen at the instant of impact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrashSnapshot {
    pub speed_at_impact_mph: f64,
    pub accident: AccidentType,
    pub crashed_at_ms: u64,
}

/// Active trip target produced by the destination generator.
#[derive(Debug, Clone, PartialEq)]
pub struct Destination {
    pub name: String,
    pub kind: String,
    pub point: GeoPoint,
    pub distance_miles: f64,
}

/// One simulated driver. All behavior, movement and synthesis reads and
/// mutates this component; the tick that selects the entity owns it.
#[derive(Debug, Clone, Component)]
pub struct Driver {
    pub identity: DriverIdentity,
    pub kinematics: Kinematics,
    state: BehaviorState,
    state_changed_at_ms: u64,
    /// How long the current traffic stop lasts, drawn on entry.
    pub traffic_stop_dwell_ms: u64,
    route: Route,
    cursor: usize,
    pub destination: Option<Destination>,
    trip_progress_pct: f64,
    pub message_count: u64,
    crash: Option<CrashSnapshot>,
    pub last_crash_at_ms: Option<u64>,
    /// Wall time of the previous movement step, `None` before the first.
    pub last_moved_at_ms: Option<u64>,
}

impl Driver {
    /// Creates a driver parked at `start_index` of `route`.
    pub fn new(identity: DriverIdentity, route: Route, start_index: usize, now_ms: u64) -> Self {
        let cursor = start_index.min(route.last_index());
        let wp = route.waypoint(cursor).clone();
        let mut driver = Self {
            identity,
            kinematics: Kinematics {
                position: wp.point(),
                bearing_deg: 0.0,
                speed_mph: 0.0,
                target_speed_mph: f64::from(wp.speed_limit),
                street: wp.street_name,
                speed_limit_mph: wp.speed_limit,
            },
            state: BehaviorState::Parked,
            state_changed_at_ms: now_ms,
            traffic_stop_dwell_ms: 0,
            route,
            cursor,
            destination: None,
            trip_progress_pct: 0.0,
            message_count: 0,
            crash: None,
            last_crash_at_ms: None,
            last_moved_at_ms: None,
        };
        driver.update_trip_progress();
        driver
    }

    pub fn driver_id(&self) -> u32 {
        self.identity.driver_id
    }

    pub fn state(&self) -> BehaviorState {
        self.state
    }

    pub fn state_changed_at_ms(&self) -> u64 {
        self.state_changed_at_ms
    }

    pub fn time_in_state_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.state_changed_at_ms)
    }

    /// Switches state and stamps the change time. Leaving post-crash idle
    /// releases the crash snapshot.
    pub fn set_state(&mut self, state: BehaviorState, now_ms: u64) {
        if self.state == BehaviorState::PostCrashIdle && state != BehaviorState::PostCrashIdle {
            self.crash = None;
        }
        self.state = state;
        self.state_changed_at_ms = now_ms;
    }

    pub fn speed_mph(&self) -> f64 {
        self.kinematics.speed_mph
    }

    /// Clamps negative and non-finite values to zero.
    pub fn set_speed(&mut self, mph: f64) {
        self.kinematics.speed_mph = if mph.is_finite() { mph.max(0.0) } else { 0.0 };
    }

    pub fn crash(&self) -> Option<&CrashSnapshot> {
        self.crash.as_ref()
    }

    /// Seconds since the last crash, `None` if the driver never crashed.
    pub fn secs_since_last_crash(&self, now_ms: u64) -> Option<u64> {
        self.last_crash_at_ms
            .map(|at| now_ms.saturating_sub(at) / 1_000)
    }

    /// Freezes speed-at-impact, zeroes speed and enters post-crash idle.
    pub fn record_crash(&mut self, accident: AccidentType, now_ms: u64) -> CrashSnapshot {
        let snapshot = CrashSnapshot {
            speed_at_impact_mph: self.kinematics.speed_mph,
            accident,
            crashed_at_ms: now_ms,
        };
        self.set_state(BehaviorState::PostCrashIdle, now_ms);
        self.crash = Some(snapshot);
        self.set_speed(0.0);
        self.kinematics.target_speed_mph = 0.0;
        self.last_crash_at_ms = Some(now_ms);
        snapshot
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current_waypoint(&self) -> &Waypoint {
        self.route.waypoint(self.cursor)
    }

    /// Next waypoint, `None` at the end of the route.
    pub fn next_waypoint(&self) -> Option<&Waypoint> {
        self.route.waypoints().get(self.cursor + 1)
    }

    pub fn at_route_end(&self) -> bool {
        self.cursor >= self.route.last_index()
    }

    /// Replaces the route and places the cursor at `start_index` (clamped).
    pub fn assign_route(&mut self, route: Route, start_index: usize) {
        self.cursor = start_index.min(route.last_index());
        self.route = route;
        self.update_trip_progress();
    }

    /// Moves the cursor forward by one, clamped to the last waypoint.
    pub fn advance_cursor(&mut self) {
        self.cursor = (self.cursor + 1).min(self.route.last_index());
        self.update_trip_progress();
    }

    pub fn trip_progress_pct(&self) -> f64 {
        self.trip_progress_pct
    }

    fn update_trip_progress(&mut self) {
        let last = self.route.last_index();
        self.trip_progress_pct = if last == 0 {
            100.0
        } else {
            (self.cursor as f64 / last as f64 * 100.0).min(100.0)
        };
    }

    /// Copies street and posted limit from the current waypoint.
    pub fn adopt_waypoint_attributes(&mut self) {
        let wp = self.route.waypoint(self.cursor);
        self.kinematics.street = wp.street_name.clone();
        self.kinematics.speed_limit_mph = wp.speed_limit;
    }

    /// Stopped at a waypoint carrying a traffic-control device.
    pub fn is_stopped_at_traffic_control(&self) -> bool {
        self.kinematics.speed_mph < 1.0 && self.current_waypoint().has_traffic_control
    }
}
