//! Test fixtures shared by unit tests, integration tests and benchmarks.
//!
//! Exposed through the `test-helpers` feature.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::clock::Backoff;
use crate::config::DriverConfig;
use crate::ecs::{Driver, DriverIdentity};
use crate::error::TransportError;
use crate::geo::{destination_point, GeoPoint};
use crate::publish::Transport;
use crate::record::TelemetryRecord;
use crate::routing::{FileRouteSource, Route, Waypoint};

/// Lower Manhattan; every fixture route starts here.
pub const TEST_ORIGIN: GeoPoint = GeoPoint::new(40.7128, -74.0060);

/// A straight route heading north from [`TEST_ORIGIN`], one waypoint every
/// 200 m. The third waypoint carries a traffic light.
pub fn test_route(waypoints: usize) -> Route {
    let points = (0..waypoints.max(1))
        .map(|i| {
            let point = if i == 0 {
                TEST_ORIGIN
            } else {
                destination_point(TEST_ORIGIN, 0.0, i as f64 * 200.0)
            };
            let wp = Waypoint::new(point, format!("Test Street {i}"), 30);
            if i == 2 {
                wp.with_control("traffic_light")
            } else {
                wp
            }
        })
        .collect();
    match Route::new("test_route", points) {
        Ok(route) => route,
        Err(err) => panic!("fixture route: {err}"),
    }
}

pub fn test_route_source() -> FileRouteSource {
    FileRouteSource::new([test_route(8)])
}

pub fn test_driver_config(driver_id: u32) -> DriverConfig {
    DriverConfig {
        driver_id,
        policy_id: 1_000 + driver_id,
        vehicle_id: 2_000 + driver_id,
        vin: format!("1HGCM82633A{driver_id:06}"),
        home_latitude: TEST_ORIGIN.lat,
        home_longitude: TEST_ORIGIN.lon,
        preferred_route: None,
        aggressive: false,
        driver_name: None,
    }
}

/// Driver parked at [`TEST_ORIGIN`], cursor on the first waypoint of [`test_route`].
pub fn test_driver(driver_id: u32) -> Driver {
    let config = test_driver_config(driver_id);
    let identity = DriverIdentity {
        driver_id,
        policy_id: config.policy_id,
        vehicle_id: config.vehicle_id,
        vin: config.vin,
        name: config.driver_name,
        home: TEST_ORIGIN,
        aggressive: false,
    };
    Driver::new(identity, test_route(8), 0, 0)
}

#[derive(Debug, Default)]
struct TransportLog {
    sent: Vec<TelemetryRecord>,
    tokens: Vec<Uuid>,
    confirmations: VecDeque<bool>,
    fail_sends: bool,
}

/// Transport that records every message. Confirmed sends answer from a
/// scripted queue and acknowledge once the script runs out. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    log: Arc<Mutex<TransportLog>>,
}

impl RecordingTransport {
    pub fn with_confirmations(self, answers: impl IntoIterator<Item = bool>) -> Self {
        self.log.lock().confirmations.extend(answers);
        self
    }

    /// Every fire-and-forget send fails with [`TransportError::Unavailable`].
    pub fn failing_sends(self) -> Self {
        self.log.lock().fail_sends = true;
        self
    }

    pub fn sent(&self) -> Vec<TelemetryRecord> {
        self.log.lock().sent.clone()
    }

    pub fn tokens(&self) -> Vec<Uuid> {
        self.log.lock().tokens.clone()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, _exchange: &str, record: &TelemetryRecord) -> Result<(), TransportError> {
        let mut log = self.log.lock();
        if log.fail_sends {
            return Err(TransportError::Unavailable("broker offline".into()));
        }
        log.sent.push(record.clone());
        Ok(())
    }

    fn send_confirmed(
        &self,
        _exchange: &str,
        record: &TelemetryRecord,
        token: Uuid,
        _timeout: Duration,
    ) -> Result<bool, TransportError> {
        let mut log = self.log.lock();
        log.tokens.push(token);
        log.sent.push(record.clone());
        Ok(log.confirmations.pop_front().unwrap_or(true))
    }
}

/// Backoff that records requested delays instead of sleeping.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackoff {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingBackoff {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    pub fn total(&self) -> Duration {
        self.sleeps.lock().iter().sum()
    }
}

impl Backoff for RecordingBackoff {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
    }
}
