//! Accident catalog: accident types, their sensor signatures and selection weights.

use std::collections::BTreeMap;
use std::fmt;

use bevy_ecs::prelude::Resource;
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::sensors::{SensorRange, Triple, TripleRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccidentType {
    /// Struck from behind while stopped or slow.
    RearEnded,
    RearEndCollision,
    #[serde(rename = "T_BONE")]
    TBone,
    SideSwipe,
    HeadOn,
    Rollover,
    SingleVehicle,
    MultiVehiclePileup,
    HitAndRun,
}

impl AccidentType {
    pub const ALL: [AccidentType; 9] = [
        AccidentType::RearEnded,
        AccidentType::RearEndCollision,
        AccidentType::TBone,
        AccidentType::SideSwipe,
        AccidentType::HeadOn,
        AccidentType::Rollover,
        AccidentType::SingleVehicle,
        AccidentType::MultiVehiclePileup,
        AccidentType::HitAndRun,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AccidentType::RearEnded => "REAR_ENDED",
            AccidentType::RearEndCollision => "REAR_END_COLLISION",
            AccidentType::TBone => "T_BONE",
            AccidentType::SideSwipe => "SIDE_SWIPE",
            AccidentType::HeadOn => "HEAD_ON",
            AccidentType::Rollover => "ROLLOVER",
            AccidentType::SingleVehicle => "SINGLE_VEHICLE",
            AccidentType::MultiVehiclePileup => "MULTI_VEHICLE_PILEUP",
            AccidentType::HitAndRun => "HIT_AND_RUN",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            AccidentType::RearEnded => "Rear-ended",
            AccidentType::RearEndCollision => "Rear-end collision",
            AccidentType::TBone => "T-bone collision",
            AccidentType::SideSwipe => "Side-swipe",
            AccidentType::HeadOn => "Head-on collision",
            AccidentType::Rollover => "Rollover",
            AccidentType::SingleVehicle => "Single vehicle collision",
            AccidentType::MultiVehiclePileup => "Multi-vehicle pileup",
            AccidentType::HitAndRun => "Hit and run",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            AccidentType::RearEnded => "Vehicle was struck from behind",
            AccidentType::RearEndCollision => "Vehicle struck another from behind",
            AccidentType::TBone => "Vehicle struck on side by perpendicular vehicle",
            AccidentType::SideSwipe => "Glancing side impact while traveling",
            AccidentType::HeadOn => "Frontal collision with oncoming vehicle",
            AccidentType::Rollover => "Vehicle rolled over during accident",
            AccidentType::SingleVehicle => "Collision with pole, barrier, or fixed object",
            AccidentType::MultiVehiclePileup => "Involved in chain-reaction collision",
            AccidentType::HitAndRun => "Struck by vehicle that fled scene",
        }
    }

    /// Characteristic accelerometer (g) and gyroscope (rad/s) ranges.
    pub fn profile(self) -> SensorProfile {
        use AccidentType::*;
        let p = SensorProfile::from_bounds;
        match self {
            // strong +X forward jolt
            RearEnded => p([(2.0, 6.0), (-1.0, 2.0), (-1.0, 1.0)], [(-2.0, 2.0), (-1.0, 1.0), (-1.0, 1.0)]),
            // strong -X deceleration
            RearEndCollision => p([(-8.0, -4.0), (-1.0, 2.0), (-1.0, 1.0)], [(2.0, 4.0), (-1.0, 1.0), (-1.0, 1.0)]),
            // strong lateral Y, high roll and yaw
            TBone => p([(-1.0, 2.0), (2.0, 9.0), (-1.0, 1.0)], [(-1.0, 1.0), (3.0, 6.0), (2.0, 4.0)]),
            SideSwipe => p([(-1.0, 2.0), (2.0, 4.0), (-0.5, 0.5)], [(-0.5, 0.5), (1.0, 2.0), (1.0, 3.0)]),
            HeadOn => p([(-12.0, -8.0), (-2.0, 2.0), (-1.0, 2.0)], [(3.0, 6.0), (-2.0, 2.0), (-1.0, 1.0)]),
            // chaotic on every axis
            Rollover => p([(-2.0, 4.0), (-3.0, 6.0), (-8.0, 8.0)], [(4.0, 10.0), (6.0, 12.0), (3.0, 8.0)]),
            SingleVehicle => p([(-9.0, -5.0), (-2.0, 3.0), (-1.0, 2.0)], [(2.0, 5.0), (-1.0, 2.0), (-1.0, 2.0)]),
            MultiVehiclePileup => p([(-7.0, -4.0), (-3.0, 5.0), (-2.0, 2.0)], [(2.0, 4.0), (2.0, 4.0), (2.0, 4.0)]),
            HitAndRun => p([(-2.0, 5.0), (2.0, 6.0), (-1.0, 1.0)], [(-1.0, 2.0), (1.0, 3.0), (1.0, 3.0)]),
        }
    }
}

impl fmt::Display for AccidentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Six independent ranges sampled uniformly for a crash event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorProfile {
    pub accelerometer: TripleRange,
    /// Pitch, roll, yaw.
    pub gyroscope: TripleRange,
}

impl SensorProfile {
    fn from_bounds(accel: [(f64, f64); 3], gyro: [(f64, f64); 3]) -> Self {
        let triple = |b: [(f64, f64); 3]| {
            TripleRange::new(
                SensorRange::new(b[0].0, b[0].1),
                SensorRange::new(b[1].0, b[1].1),
                SensorRange::new(b[2].0, b[2].1),
            )
        };
        Self {
            accelerometer: triple(accel),
            gyroscope: triple(gyro),
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> (Triple, Triple) {
        (self.accelerometer.sample(rng), self.gyroscope.sample(rng))
    }
}

/// Default selection weights for crashes of a moving vehicle.
pub fn default_weights() -> BTreeMap<AccidentType, u32> {
    use AccidentType::*;
    BTreeMap::from([
        (RearEndCollision, 30),
        (SideSwipe, 20),
        (TBone, 20),
        (SingleVehicle, 10),
        (HeadOn, 5),
        (MultiVehiclePileup, 5),
        (Rollover, 5),
        (HitAndRun, 5),
        (RearEnded, 0),
    ])
}

/// Immutable process-wide accident table.
#[derive(Debug, Clone, Resource)]
pub struct AccidentCatalog {
    moving: Vec<AccidentType>,
    index: Option<WeightedIndex<u32>>,
}

impl Default for AccidentCatalog {
    fn default() -> Self {
        Self::with_weights(&default_weights())
    }
}

impl AccidentCatalog {
    /// Zero-weight entries are never drawn. When every weight is zero the
    /// catalog falls back to [`AccidentType::RearEndCollision`].
    pub fn with_weights(weights: &BTreeMap<AccidentType, u32>) -> Self {
        let entries: Vec<(AccidentType, u32)> = weights
            .iter()
            .filter(|(_, w)| **w > 0)
            .map(|(k, w)| (*k, *w))
            .collect();
        let index = WeightedIndex::new(entries.iter().map(|(_, w)| *w)).ok();
        Self {
            moving: entries.into_iter().map(|(k, _)| k).collect(),
            index,
        }
    }

    /// A vehicle stopped at a traffic control is always rear-ended; otherwise
    /// the type is drawn from the moving-vehicle weights.
    pub fn select<R: Rng + ?Sized>(&self, stopped_at_control: bool, rng: &mut R) -> AccidentType {
        if stopped_at_control {
            return AccidentType::RearEnded;
        }
        match &self.index {
            Some(index) => self.moving[index.sample(rng)],
            None => AccidentType::RearEndCollision,
        }
    }
}
