//! Destination route generator.
//!
//! Picks a random destination around a driver's home anchor and lays out a
//! waypoint route from the driver's current position to it. Road attributes
//! (speed limits, traffic controls) depend on how far each waypoint is from
//! home: urban near the anchor, suburban further out, highway beyond.

use bevy_ecs::prelude::Resource;
use log::debug;
use rand::Rng;

use crate::config::DestinationConfig;
use crate::ecs::Destination;
use crate::error::RouteError;
use crate::geo::{destination_point, distance_miles, initial_bearing_deg, GeoPoint, METERS_PER_MILE};
use crate::routing::{Route, Waypoint, DESTINATION_CONTROL};

const DESTINATION_KINDS: &[&str] = &[
    "restaurant",
    "shopping",
    "work",
    "gas_station",
    "hospital",
    "school",
    "park",
    "airport",
    "hotel",
    "entertainment",
];

const DESTINATION_NAMES: &[&str] = &[
    "Riverside Mall",
    "Central Park",
    "State University",
    "Memorial Hospital",
    "International Airport",
    "Convention Center",
    "City Stadium",
    "Botanical Garden",
    "Art Museum",
    "Harbor Market",
    "Old Town Square",
    "Lakeside Plaza",
    "Tech Campus",
    "Union Station",
    "Northgate Shopping Center",
];

const STREET_NAMES: &[&str] = &[
    "Oak", "Pine", "Maple", "Elm", "Cedar", "Magnolia", "Highland", "Lincoln", "Washington",
    "Park", "Lake", "Hill", "River", "Spring", "Church", "Mill", "Market", "Center",
];

const STREET_SUFFIXES: &[&str] = &["St", "Ave", "Blvd", "Dr", "Rd", "Pkwy", "Way", "Ln"];

const URBAN_LIMITS: &[u32] = &[25, 30, 35];
const SUBURBAN_LIMITS: &[u32] = &[35, 45];
const HIGHWAY_LIMITS: &[u32] = &[55, 65, 70];

const CONTROL_TYPES: [(&str, f64); 4] = [
    ("traffic_light", 0.4),
    ("stop_sign", 0.3),
    ("yield", 0.2),
    ("none", 0.1),
];

const DESTINATION_SPEED_LIMIT: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoadBand {
    Urban,
    Suburban,
    Highway,
}

impl RoadBand {
    fn limits(self) -> &'static [u32] {
        match self {
            RoadBand::Urban => URBAN_LIMITS,
            RoadBand::Suburban => SUBURBAN_LIMITS,
            RoadBand::Highway => HIGHWAY_LIMITS,
        }
    }

    fn control_probability(self) -> f64 {
        match self {
            RoadBand::Urban => 0.4,
            RoadBand::Suburban => 0.2,
            RoadBand::Highway => 0.1,
        }
    }
}

/// Generates destinations and the routes to reach them.
#[derive(Debug, Clone, Default, Resource)]
pub struct DestinationRoutes {
    config: DestinationConfig,
}

impl DestinationRoutes {
    pub fn new(config: DestinationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DestinationConfig {
        &self.config
    }

    /// Random destination at a uniform distance in
    /// `[min_trip_miles, max_trip_miles]` and a random bearing from `home`.
    pub fn random_destination<R: Rng + ?Sized>(&self, home: GeoPoint, rng: &mut R) -> Destination {
        let c = &self.config;
        let miles = if c.max_trip_miles > c.min_trip_miles {
            rng.gen_range(c.min_trip_miles..=c.max_trip_miles)
        } else {
            c.min_trip_miles
        };
        let bearing = rng.gen_range(0.0..360.0);
        let point = destination_point(home, bearing, miles * METERS_PER_MILE);
        Destination {
            name: pick(DESTINATION_NAMES, rng).to_string(),
            kind: pick(DESTINATION_KINDS, rng).to_string(),
            point,
            distance_miles: miles,
        }
    }

    /// Route from `start` to `destination`.
    ///
    /// Has `max(min_waypoints, miles * waypoints_per_mile)` segments. The first
    /// waypoint is `start`, the last sits exactly on the destination and
    /// carries its name.
    pub fn route_to<R: Rng + ?Sized>(
        &self,
        start: GeoPoint,
        home: GeoPoint,
        destination: &Destination,
        rng: &mut R,
    ) -> Result<Route, RouteError> {
        let c = &self.config;
        let total_miles = distance_miles(start, destination.point);
        let main_bearing = initial_bearing_deg(start, destination.point);
        let segments = c
            .min_waypoints
            .max((total_miles * c.waypoints_per_mile) as usize)
            .max(1);

        let mut waypoints = Vec::with_capacity(segments + 1);
        for i in 0..segments {
            let point = if i == 0 {
                start
            } else {
                let progress = i as f64 / segments as f64;
                let jitter = if c.bearing_jitter_deg > 0.0 {
                    rng.gen_range(-c.bearing_jitter_deg..=c.bearing_jitter_deg)
                } else {
                    0.0
                };
                destination_point(
                    start,
                    main_bearing + jitter,
                    total_miles * progress * METERS_PER_MILE,
                )
            };
            let band = self.band(home, point);
            let limit = *pick(band.limits(), rng);
            let mut wp = Waypoint::new(point, street_name(rng), limit);
            if i > 0 && rng.gen_bool(band.control_probability()) {
                wp = wp.with_control(control_type(rng));
            }
            waypoints.push(wp);
        }
        waypoints.push(
            Waypoint::new(destination.point, destination.name.clone(), DESTINATION_SPEED_LIMIT)
                .with_control(DESTINATION_CONTROL),
        );

        debug!(
            "generated route to {} with {} waypoints over {:.1} miles",
            destination.name,
            waypoints.len(),
            total_miles
        );
        Route::new(format!("to {}", destination.name), waypoints)
    }

    fn band(&self, home: GeoPoint, point: GeoPoint) -> RoadBand {
        let miles = distance_miles(home, point);
        if miles < self.config.urban_radius_miles {
            RoadBand::Urban
        } else if miles < self.config.suburban_radius_miles {
            RoadBand::Suburban
        } else {
            RoadBand::Highway
        }
    }
}

fn pick<'a, T, R: Rng + ?Sized>(items: &'a [T], rng: &mut R) -> &'a T {
    &items[rng.gen_range(0..items.len())]
}

fn control_type<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    let roll: f64 = rng.gen();
    let mut cumulative = 0.0;
    for (kind, weight) in CONTROL_TYPES {
        cumulative += weight;
        if roll < cumulative {
            return kind;
        }
    }
    "none"
}

fn street_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{} {}", pick(STREET_NAMES, rng), pick(STREET_SUFFIXES, rng))
}
