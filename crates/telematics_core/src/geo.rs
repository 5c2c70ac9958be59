//! Geographic helpers: great-circle distance, initial bearing, destination
//! projection and H3 bucketing.
//!
//! All functions treat the Earth as a sphere of radius [`EARTH_RADIUS_M`].
//! Angles are in degrees at the API boundary and radians internally.

use h3o::{CellIndex, LatLng, Resolution};
use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
pub const METERS_PER_MILE: f64 = 1_609.344;
/// Miles per hour to metres per second.
pub const MPH_TO_MPS: f64 = 0.44704;

/// Resolution used to bucket driver positions for the dashboard (~240m cells).
pub const SNAPSHOT_RESOLUTION: Resolution = Resolution::Nine;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// True when both components are finite and inside the WGS84 domain.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Haversine distance between two points, in metres.
pub fn distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lon.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lon.to_radians());
    let sin_dlat = ((lat2 - lat1) * 0.5).sin();
    let sin_dlon = ((lon2 - lon1) * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}

pub fn distance_miles(a: GeoPoint, b: GeoPoint) -> f64 {
    distance_m(a, b) / METERS_PER_MILE
}

/// Initial great-circle bearing from `from` towards `to`, normalized to `[0, 360)`.
pub fn initial_bearing_deg(from: GeoPoint, to: GeoPoint) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let dlon = (to.lon - from.lon).to_radians();
    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    normalize_bearing(y.atan2(x).to_degrees())
}

/// Point reached by travelling `distance_m` metres from `origin` on an initial
/// bearing of `bearing_deg`.
pub fn destination_point(origin: GeoPoint, bearing_deg: f64, distance_m: f64) -> GeoPoint {
    let angular = distance_m / EARTH_RADIUS_M;
    let bearing = bearing_deg.to_radians();
    let lat1 = origin.lat.to_radians();
    let lon1 = origin.lon.to_radians();

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
    let lon2 = lon1
        + (bearing.sin() * angular.sin() * lat1.cos()).atan2(angular.cos() - lat1.sin() * lat2.sin());

    GeoPoint {
        lat: lat2.to_degrees(),
        lon: normalize_longitude(lon2.to_degrees()),
    }
}

pub fn normalize_bearing(deg: f64) -> f64 {
    let b = deg.rem_euclid(360.0);
    // rem_euclid can return 360.0 for tiny negative inputs
    if b >= 360.0 {
        0.0
    } else {
        b
    }
}

fn normalize_longitude(deg: f64) -> f64 {
    (deg + 540.0).rem_euclid(360.0) - 180.0
}

/// H3 cell containing `point`, or `None` when the coordinates are invalid.
pub fn cell_at(point: GeoPoint) -> Option<CellIndex> {
    LatLng::new(point.lat, point.lon)
        .ok()
        .map(|ll| ll.to_cell(SNAPSHOT_RESOLUTION))
}
