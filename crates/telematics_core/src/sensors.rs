//! Declarative sensor ranges for every telemetry generation mode.
//!
//! Every `(min, max)` pair used by the synthesizer lives here so tests can
//! assert against the tables directly.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Closed numeric interval sampled uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorRange {
    pub min: f64,
    pub max: f64,
}

impl SensorRange {
    /// `min` must not exceed `max`.
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Range of width `2 * half_width` centred on zero.
    pub const fn symmetric(half_width: f64) -> Self {
        Self {
            min: -half_width,
            max: half_width,
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.max > self.min {
            rng.gen_range(self.min..=self.max)
        } else {
            self.min
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Inclusive integer interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntRange {
    pub min: i64,
    pub max: i64,
}

impl IntRange {
    pub const fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> i64 {
        if self.max > self.min {
            rng.gen_range(self.min..=self.max)
        } else {
            self.min
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Three-axis reading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Triple {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Triple {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn map(self, f: impl Fn(f64) -> f64) -> Self {
        Self::new(f(self.x), f(self.y), f(self.z))
    }
}

/// Ranges for one axis triple.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TripleRange {
    pub x: SensorRange,
    pub y: SensorRange,
    pub z: SensorRange,
}

impl TripleRange {
    pub const fn new(x: SensorRange, y: SensorRange, z: SensorRange) -> Self {
        Self { x, y, z }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Triple {
        Triple::new(self.x.sample(rng), self.y.sample(rng), self.z.sample(rng))
    }

    pub fn contains(&self, t: &Triple) -> bool {
        self.x.contains(t.x) && self.y.contains(t.y) && self.z.contains(t.z)
    }
}

/// Physical orientation of the phone inside the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceOrientation {
    Landscape,
    Portrait,
    FaceUp,
}

/// Ranges for one generation mode. Accelerometer and gyroscope ranges are
/// ignored for crash events, which draw from the accident's sensor profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorRanges {
    pub altitude_m: SensorRange,
    pub accelerometer: TripleRange,
    pub gyroscope: TripleRange,
    pub magnetometer: TripleRange,
    pub gps_accuracy_m: SensorRange,
    pub satellites: IntRange,
    pub fix_time_ms: IntRange,
    pub pressure_hpa: SensorRange,
    pub battery_pct: IntRange,
    pub signal_dbm: IntRange,
    pub charging_probability: f64,
}

const MAGNETOMETER: TripleRange = TripleRange::new(
    SensorRange::new(20.0, 30.0),
    SensorRange::new(-15.0, -5.0),
    SensorRange::new(40.0, 55.0),
);

const ALTITUDE: SensorRange = SensorRange::new(320.5, 370.5);

pub const DRIVING_RANGES: SensorRanges = SensorRanges {
    altitude_m: ALTITUDE,
    accelerometer: TripleRange::new(
        SensorRange::symmetric(0.5),
        SensorRange::symmetric(0.5),
        SensorRange::new(0.8, 1.2),
    ),
    // pitch, roll (lane changes), yaw (steering)
    gyroscope: TripleRange::new(
        SensorRange::symmetric(0.25),
        SensorRange::symmetric(0.4),
        SensorRange::symmetric(0.6),
    ),
    magnetometer: MAGNETOMETER,
    gps_accuracy_m: SensorRange::new(1.5, 3.5),
    satellites: IntRange::new(10, 12),
    fix_time_ms: IntRange::new(50, 149),
    pressure_hpa: SensorRange::new(1013.0, 1021.0),
    battery_pct: IntRange::new(80, 94),
    signal_dbm: IntRange::new(-84, -60),
    charging_probability: 0.5,
};

pub const STATIONARY_RANGES: SensorRanges = SensorRanges {
    altitude_m: ALTITUDE,
    accelerometer: TripleRange::new(
        SensorRange::symmetric(0.05),
        SensorRange::symmetric(0.05),
        SensorRange::new(0.98, 1.02),
    ),
    gyroscope: TripleRange::new(
        SensorRange::symmetric(0.025),
        SensorRange::symmetric(0.025),
        SensorRange::symmetric(0.025),
    ),
    magnetometer: MAGNETOMETER,
    gps_accuracy_m: SensorRange::new(0.8, 1.8),
    satellites: IntRange::new(11, 13),
    fix_time_ms: IntRange::new(30, 79),
    pressure_hpa: SensorRange::new(1013.2, 1018.2),
    battery_pct: IntRange::new(85, 94),
    signal_dbm: IntRange::new(-84, -65),
    charging_probability: 0.7,
};

pub const CRASH_RANGES: SensorRanges = SensorRanges {
    altitude_m: ALTITUDE,
    accelerometer: TripleRange::new(
        SensorRange::new(0.0, 0.0),
        SensorRange::new(0.0, 0.0),
        SensorRange::new(0.0, 0.0),
    ),
    gyroscope: TripleRange::new(
        SensorRange::new(0.0, 0.0),
        SensorRange::new(0.0, 0.0),
        SensorRange::new(0.0, 0.0),
    ),
    magnetometer: MAGNETOMETER,
    gps_accuracy_m: SensorRange::new(2.0, 5.0),
    satellites: IntRange::new(8, 11),
    fix_time_ms: IntRange::new(100, 299),
    pressure_hpa: SensorRange::new(1010.0, 1020.0),
    battery_pct: IntRange::new(75, 94),
    signal_dbm: IntRange::new(-99, -70),
    charging_probability: 0.5,
};

/// Fixed readings emitted while a vehicle sits in post-crash idle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrozenReadings {
    pub altitude_m: f64,
    pub accelerometer: Triple,
    pub gyroscope: Triple,
    pub magnetometer: Triple,
    pub gps_accuracy_m: f64,
    pub satellites: u8,
    pub fix_time_ms: u32,
    pub pressure_hpa: f64,
    pub battery_pct: u8,
    pub signal_dbm: i16,
    pub orientation: DeviceOrientation,
}

pub const POST_CRASH_READINGS: FrozenReadings = FrozenReadings {
    altitude_m: 320.5,
    accelerometer: Triple::new(0.0, 0.0, 1.0),
    gyroscope: Triple::new(0.0, 0.0, 0.0),
    magnetometer: Triple::new(25.0, -10.0, 47.5),
    gps_accuracy_m: 1.0,
    satellites: 12,
    fix_time_ms: 30,
    pressure_hpa: 1013.25,
    battery_pct: 85,
    signal_dbm: -75,
    orientation: DeviceOrientation::FaceUp,
};

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
