//! Simulation configuration.
//!
//! Every section deserializes with `#[serde(default)]` so a config file only
//! needs the values it overrides. Sections are inserted into the world as
//! resources by [`crate::scenario::build_world`].

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use bevy_ecs::prelude::Resource;
use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::accident::{default_weights, AccidentType};
use crate::ecs::BehaviorState;
use crate::error::ConfigError;
use crate::geo::GeoPoint;

/// Weighted target state for a random draw.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateWeight {
    pub state: BehaviorState,
    pub weight: f64,
}

/// Where a driving vehicle goes when it stops.
pub type StopTransition = StateWeight;

fn weights(entries: &[(BehaviorState, f64)]) -> Vec<StateWeight> {
    entries
        .iter()
        .map(|&(state, weight)| StateWeight { state, weight })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Resource, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Base PARKED → DRIVING probability per tick, before the activity factor.
    pub start_probability: f64,
    /// A parked driver stays put for at least this long.
    pub min_parked_secs: u64,
    /// Base DRIVING → stopped probability per tick, before the activity factor.
    pub stop_probability: f64,
    pub stop_transitions: Vec<StopTransition>,
    pub traffic_stop_min_secs: u64,
    pub traffic_stop_max_secs: u64,
    pub break_duration_minutes: u64,
    pub post_crash_idle_minutes: u64,
    /// State drawn for each driver at spawn.
    pub initial_states: Vec<StateWeight>,
    pub initial_min_speed_mph: f64,
    pub initial_max_speed_mph: f64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            start_probability: 0.3,
            min_parked_secs: 30,
            stop_probability: 0.05,
            stop_transitions: weights(&[
                (BehaviorState::TrafficStop, 0.4),
                (BehaviorState::Parked, 0.3),
                (BehaviorState::BreakTime, 0.3),
            ]),
            traffic_stop_min_secs: 30,
            traffic_stop_max_secs: 90,
            break_duration_minutes: 5,
            post_crash_idle_minutes: 10,
            initial_states: weights(&[
                (BehaviorState::Driving, 0.4),
                (BehaviorState::Parked, 0.3),
                (BehaviorState::TrafficStop, 0.15),
                (BehaviorState::BreakTime, 0.15),
            ]),
            initial_min_speed_mph: 20.0,
            initial_max_speed_mph: 45.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Resource, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashConfig {
    /// Initial value of the runtime toggle in [`crate::control::SimulationControl`].
    pub random_accidents_enabled: bool,
    pub probability_per_tick: f64,
    pub min_secs_between_crashes: u64,
    pub min_messages_before_crash: u64,
    pub manual_cooldown_secs: u64,
    pub min_crash_g_force: f64,
    pub accident_weights: BTreeMap<AccidentType, u32>,
}

impl Default for CrashConfig {
    fn default() -> Self {
        Self {
            random_accidents_enabled: false,
            probability_per_tick: 1e-4,
            min_secs_between_crashes: 1_800,
            min_messages_before_crash: 10,
            manual_cooldown_secs: 300,
            min_crash_g_force: 6.0,
            accident_weights: default_weights(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Resource, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub exchange: String,
    /// Crash records at or above this G-force use confirmed delivery.
    pub crash_g_threshold: f64,
    pub max_attempts: u32,
    /// Backoff before retry `n` is `backoff_base_ms * n`.
    pub backoff_base_ms: u64,
    pub confirm_timeout_ms: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            exchange: "telematics_exchange".to_string(),
            crash_g_threshold: 2.5,
            max_attempts: 3,
            backoff_base_ms: 100,
            confirm_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Resource, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    pub utc_offset_hours: i32,
    pub peak_hours: Vec<u8>,
    pub peak_multiplier: f64,
    pub night_hours: Vec<u8>,
    pub night_multiplier: f64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: 0,
            peak_hours: vec![7, 8, 9, 16, 17, 18],
            peak_multiplier: 1.5,
            night_hours: vec![22, 23, 0, 1, 2, 3, 4, 5],
            night_multiplier: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteMode {
    /// Generate a route to a fresh destination at the end of every trip.
    #[default]
    Destination,
    /// Restart the current route from its first waypoint.
    Loop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    pub pull_away_min_mph: f64,
    pub pull_away_max_mph: f64,
    pub max_change_per_tick_mph: f64,
    pub noise_mph: f64,
    pub limit_noise_mph: f64,
    pub speeding_probability: f64,
    pub aggressive_speeding_probability: f64,
    pub speeding_min_mph: f64,
    pub speeding_max_mph: f64,
    pub ceiling_over_limit_mph: f64,
    pub aggressive_ceiling_over_limit_mph: f64,
    pub min_cruise_mph: f64,
    /// Target at a traffic-control waypoint is `speed * control_braking_factor`.
    pub control_braking_factor: f64,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            pull_away_min_mph: 15.0,
            pull_away_max_mph: 45.0,
            max_change_per_tick_mph: 5.0,
            noise_mph: 1.0,
            limit_noise_mph: 5.0,
            speeding_probability: 0.1,
            aggressive_speeding_probability: 0.4,
            speeding_min_mph: 5.0,
            speeding_max_mph: 15.0,
            ceiling_over_limit_mph: 10.0,
            aggressive_ceiling_over_limit_mph: 20.0,
            min_cruise_mph: 10.0,
            control_braking_factor: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Resource, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    pub route_mode: RouteMode,
    pub arrival_threshold_m: f64,
    pub max_step_secs: f64,
    pub default_step_secs: f64,
    /// Spawn positions are scattered by up to this many degrees.
    pub start_jitter_deg: f64,
    pub speed: SpeedConfig,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            route_mode: RouteMode::Destination,
            arrival_threshold_m: 5.0,
            max_step_secs: 5.0,
            default_step_secs: 0.5,
            start_jitter_deg: 0.0005,
            speed: SpeedConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Resource, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationConfig {
    pub min_trip_miles: f64,
    pub max_trip_miles: f64,
    pub min_waypoints: usize,
    pub waypoints_per_mile: f64,
    pub bearing_jitter_deg: f64,
    pub urban_radius_miles: f64,
    pub suburban_radius_miles: f64,
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            min_trip_miles: 5.0,
            max_trip_miles: 80.0,
            min_waypoints: 10,
            waypoints_per_mile: 3.0,
            bearing_jitter_deg: 15.0,
            urban_radius_miles: 5.0,
            suburban_radius_miles: 15.0,
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub seed: Option<u64>,
    pub interval_ms: u64,
    pub jitter_ms: u64,
    pub min_sleep_ms: u64,
    pub pause_poll_ms: u64,
    /// 0 means no cap.
    pub max_drivers: usize,
    /// Log a fleet summary every this many messages; 0 disables it.
    pub summary_every: u64,
    pub behavior: BehaviorConfig,
    pub crash: CrashConfig,
    pub publish: PublishConfig,
    pub activity: ActivityConfig,
    pub movement: MovementConfig,
    pub destination: DestinationConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            interval_ms: 500,
            jitter_ms: 500,
            min_sleep_ms: 500,
            pause_poll_ms: 300,
            max_drivers: 0,
            summary_every: 50,
            behavior: BehaviorConfig::default(),
            crash: CrashConfig::default(),
            publish: PublishConfig::default(),
            activity: ActivityConfig::default(),
            movement: MovementConfig::default(),
            destination: DestinationConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = read_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.behavior;
        probability("behavior.start_probability", b.start_probability)?;
        probability("behavior.stop_probability", b.stop_probability)?;
        weighted("behavior.stop_transitions", &b.stop_transitions)?;
        weighted("behavior.initial_states", &b.initial_states)?;
        if b
            .stop_transitions
            .iter()
            .any(|t| matches!(t.state, BehaviorState::Driving | BehaviorState::PostCrashIdle))
        {
            return invalid("behavior.stop_transitions may only target stationary states");
        }
        if b
            .initial_states
            .iter()
            .any(|t| t.state == BehaviorState::PostCrashIdle)
        {
            return invalid("behavior.initial_states may not include POST_CRASH_IDLE");
        }
        ordered(
            "behavior.traffic_stop_*_secs",
            b.traffic_stop_min_secs as f64,
            b.traffic_stop_max_secs as f64,
        )?;
        ordered(
            "behavior.initial_*_speed_mph",
            b.initial_min_speed_mph,
            b.initial_max_speed_mph,
        )?;

        let c = &self.crash;
        probability("crash.probability_per_tick", c.probability_per_tick)?;
        if !(c.min_crash_g_force.is_finite() && c.min_crash_g_force >= 0.0) {
            return invalid("crash.min_crash_g_force must be a non-negative number");
        }

        let p = &self.publish;
        if p.max_attempts == 0 {
            return invalid("publish.max_attempts must be at least 1");
        }
        if p.confirm_timeout_ms == 0 {
            return invalid("publish.confirm_timeout_ms must be positive");
        }

        let a = &self.activity;
        if a.peak_hours.iter().chain(&a.night_hours).any(|h| *h > 23) {
            return invalid("activity hours must be in 0..=23");
        }
        if a.peak_multiplier <= 0.0 || a.night_multiplier <= 0.0 {
            return invalid("activity multipliers must be positive");
        }

        let m = &self.movement;
        if m.max_step_secs <= 0.0 || m.default_step_secs <= 0.0 {
            return invalid("movement step durations must be positive");
        }
        let s = &m.speed;
        probability("movement.speed.speeding_probability", s.speeding_probability)?;
        probability(
            "movement.speed.aggressive_speeding_probability",
            s.aggressive_speeding_probability,
        )?;
        ordered(
            "movement.speed.pull_away_*_mph",
            s.pull_away_min_mph,
            s.pull_away_max_mph,
        )?;
        ordered(
            "movement.speed.speeding_*_mph",
            s.speeding_min_mph,
            s.speeding_max_mph,
        )?;

        let d = &self.destination;
        ordered("destination.*_trip_miles", d.min_trip_miles, d.max_trip_miles)?;
        if d.min_trip_miles <= 0.0 {
            return invalid("destination.min_trip_miles must be positive");
        }
        if d.min_waypoints == 0 {
            return invalid("destination.min_waypoints must be at least 1");
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid(msg.into()))
}

fn probability(name: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        invalid(format!("{name} must be within [0, 1], got {value}"))
    }
}

fn ordered(name: &str, min: f64, max: f64) -> Result<(), ConfigError> {
    if min.is_finite() && max.is_finite() && min <= max {
        Ok(())
    } else {
        invalid(format!("{name}: empty range [{min}, {max}]"))
    }
}

fn weighted(name: &str, entries: &[StateWeight]) -> Result<(), ConfigError> {
    if entries.is_empty() || entries.iter().any(|e| e.weight.is_nan() || e.weight < 0.0) {
        return invalid(format!("{name} needs non-negative weights"));
    }
    if entries.iter().map(|e| e.weight).sum::<f64>() <= 0.0 {
        return invalid(format!("{name} weights sum to zero"));
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// One configured driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    pub driver_id: u32,
    pub policy_id: u32,
    pub vehicle_id: u32,
    pub vin: String,
    #[serde(alias = "base_latitude")]
    pub home_latitude: f64,
    #[serde(alias = "base_longitude")]
    pub home_longitude: f64,
    #[serde(default, alias = "route_name")]
    pub preferred_route: Option<String>,
    #[serde(default)]
    pub aggressive: bool,
    #[serde(default)]
    pub driver_name: Option<String>,
}

impl DriverConfig {
    pub fn home(&self) -> GeoPoint {
        GeoPoint::new(self.home_latitude, self.home_longitude)
    }
}

/// Reads driver configurations from either a bare JSON array or an object
/// with a `drivers` array. Entries that fail to deserialize are logged and
/// skipped; only an unreadable file or an unrecognized layout is an error.
pub fn load_driver_configs(path: impl AsRef<Path>) -> Result<Vec<DriverConfig>, ConfigError> {
    let path = path.as_ref();
    let entries = match read_json::<Value>(path)? {
        Value::Array(entries) => entries,
        Value::Object(mut root) => match root.remove("drivers") {
            Some(Value::Array(entries)) => entries,
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "{}: expected a `drivers` array",
                    path.display()
                )))
            }
        },
        _ => {
            return Err(ConfigError::Invalid(format!(
                "{}: expected an array of drivers",
                path.display()
            )))
        }
    };

    let total = entries.len();
    let drivers: Vec<DriverConfig> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value(entry) {
            Ok(driver) => Some(driver),
            Err(err) => {
                warn!("skipping driver entry {index} in {}: {err}", path.display());
                None
            }
        })
        .collect();
    if drivers.len() < total {
        warn!(
            "loaded {} of {total} driver entries from {}",
            drivers.len(),
            path.display()
        );
    }
    Ok(drivers)
}

/// Applies the `max_drivers` cap (0 keeps everything).
pub fn cap_drivers(mut drivers: Vec<DriverConfig>, max_drivers: usize) -> Vec<DriverConfig> {
    if max_drivers > 0 && drivers.len() > max_drivers {
        drivers.truncate(max_drivers);
    }
    drivers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        SimulationConfig::default().validate().expect("defaults are valid");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: SimulationConfig = serde_json::from_str(
            r#"{"interval_ms": 1000, "crash": {"random_accidents_enabled": true},
                "movement": {"route_mode": "loop"}}"#,
        )
        .expect("config");
        assert_eq!(config.interval_ms, 1_000);
        assert!(config.crash.random_accidents_enabled);
        assert_eq!(config.crash.min_crash_g_force, 6.0);
        assert_eq!(config.movement.route_mode, RouteMode::Loop);
        assert_eq!(config.movement.speed.max_change_per_tick_mph, 5.0);
        assert_eq!(config.behavior.post_crash_idle_minutes, 10);
    }

    #[test]
    fn rejects_out_of_range_probability() {
        let mut config = SimulationConfig::default();
        config.behavior.start_probability = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_zero_attempts_and_empty_ranges() {
        let mut config = SimulationConfig::default();
        config.publish.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::default();
        config.destination.min_trip_miles = 50.0;
        config.destination.max_trip_miles = 10.0;
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::default();
        config.behavior.stop_transitions.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_driving_as_stop_target() {
        let mut config = SimulationConfig::default();
        config.behavior.stop_transitions.push(StateWeight {
            state: BehaviorState::Driving,
            weight: 1.0,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn accident_weights_round_trip_through_json_keys() {
        let config: CrashConfig =
            serde_json::from_str(r#"{"accident_weights": {"HEAD_ON": 3, "T_BONE": 1}}"#)
                .expect("crash config");
        assert_eq!(config.accident_weights.len(), 2);
        assert_eq!(config.accident_weights[&AccidentType::HeadOn], 3);
    }

    #[test]
    fn driver_config_accepts_base_coordinate_aliases() {
        let drivers: Vec<DriverConfig> = serde_json::from_str(
            r#"[{"driver_id": 1, "policy_id": 200018, "vehicle_id": 300021,
                 "vin": "1HGBH41JXMN109186", "base_latitude": 33.75,
                 "base_longitude": -84.39, "route_name": "atlanta_loop"}]"#,
        )
        .expect("drivers");
        assert_eq!(drivers[0].home(), GeoPoint::new(33.75, -84.39));
        assert_eq!(drivers[0].preferred_route.as_deref(), Some("atlanta_loop"));
        assert!(!drivers[0].aggressive);
    }

    #[test]
    fn cap_truncates_only_when_set() {
        let d = DriverConfig {
            driver_id: 1,
            policy_id: 1,
            vehicle_id: 1,
            vin: "V".into(),
            home_latitude: 0.0,
            home_longitude: 0.0,
            preferred_route: None,
            aggressive: false,
            driver_name: None,
        };
        let list = vec![d.clone(), d.clone(), d];
        assert_eq!(cap_drivers(list.clone(), 0).len(), 3);
        assert_eq!(cap_drivers(list, 2).len(), 2);
    }
}
