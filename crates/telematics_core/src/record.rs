//! The flat telemetry message consumed by the downstream pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::accident::AccidentType;
use crate::sensors::{DeviceOrientation, Triple};

/// One synthesized message. Built fresh per tick and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    pub policy_id: u32,
    pub vehicle_id: u32,
    pub vin: String,
    pub driver_id: u32,
    pub event_time: DateTime<Utc>,
    pub speed_mph: f64,
    pub speed_limit_mph: u32,
    pub g_force: f64,
    pub current_street: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accident_type: Option<AccidentType>,

    pub gps_latitude: f64,
    pub gps_longitude: f64,
    pub gps_altitude: f64,
    /// Metres per second.
    pub gps_speed: f64,
    pub gps_bearing: f64,
    pub gps_accuracy: f64,
    pub gps_satellite_count: u8,
    pub gps_fix_time: u32,

    pub accelerometer_x: f64,
    pub accelerometer_y: f64,
    pub accelerometer_z: f64,

    pub gyroscope_x: f64,
    pub gyroscope_y: f64,
    pub gyroscope_z: f64,

    pub magnetometer_x: f64,
    pub magnetometer_y: f64,
    pub magnetometer_z: f64,
    pub magnetometer_heading: f64,

    pub barometric_pressure: f64,

    pub device_battery_level: u8,
    pub device_signal_strength: i16,
    pub device_orientation: DeviceOrientation,
    pub device_screen_on: bool,
    pub device_charging: bool,
}

impl TelemetryRecord {
    pub fn accelerometer(&self) -> Triple {
        Triple::new(self.accelerometer_x, self.accelerometer_y, self.accelerometer_z)
    }

    pub fn gyroscope(&self) -> Triple {
        Triple::new(self.gyroscope_x, self.gyroscope_y, self.gyroscope_z)
    }

    /// Crash records at or above `threshold_g` go through confirmed delivery.
    pub fn requires_confirmation(&self, threshold_g: f64) -> bool {
        self.accident_type.is_some() && self.g_force >= threshold_g
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
