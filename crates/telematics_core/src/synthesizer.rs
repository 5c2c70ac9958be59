//! Telemetry synthesizer: turns a driver's current state into one record.
//!
//! Pure given an RNG and a timestamp. Speed and G-force are rounded to two
//! decimals and raw sensor axes to four; GPS latitude and longitude are the
//! driver's exact position.

use rand::Rng;

use crate::accident::AccidentType;
use crate::clock::datetime_from_ms;
use crate::ecs::{BehaviorState, Driver};
use crate::geo::MPH_TO_MPS;
use crate::record::TelemetryRecord;
use crate::sensors::{
    round2, round4, DeviceOrientation, FrozenReadings, SensorRanges, Triple, CRASH_RANGES,
    DRIVING_RANGES, POST_CRASH_READINGS, STATIONARY_RANGES,
};

/// Per-tick record for the driver's current state.
pub fn generate_telemetry<R: Rng + ?Sized>(driver: &Driver, now_ms: u64, rng: &mut R) -> TelemetryRecord {
    match driver.state() {
        BehaviorState::Driving => {
            let ranges = &DRIVING_RANGES;
            let accel = ranges.accelerometer.sample(rng).map(round4);
            let gyro = ranges.gyroscope.sample(rng).map(round4);
            sampled_record(
                driver,
                now_ms,
                driver.speed_mph(),
                accel,
                gyro,
                DeviceOrientation::Landscape,
                None,
                ranges,
                rng,
            )
        }
        BehaviorState::Parked | BehaviorState::TrafficStop | BehaviorState::BreakTime => {
            let ranges = &STATIONARY_RANGES;
            let accel = ranges.accelerometer.sample(rng).map(round4);
            let gyro = ranges.gyroscope.sample(rng).map(round4);
            let orientation = if rng.gen_bool(0.5) {
                DeviceOrientation::Portrait
            } else {
                DeviceOrientation::FaceUp
            };
            sampled_record(driver, now_ms, 0.0, accel, gyro, orientation, None, ranges, rng)
        }
        BehaviorState::PostCrashIdle => frozen_record(driver, now_ms, &POST_CRASH_READINGS),
    }
}

/// One-shot record emitted at the instant of impact.
///
/// Axes come from the accident's sensor profile. G-force is floored at
/// `min_g_force`, and the reported speed is the captured speed at impact.
pub fn generate_crash_event<R: Rng + ?Sized>(
    driver: &Driver,
    accident: AccidentType,
    min_g_force: f64,
    now_ms: u64,
    rng: &mut R,
) -> TelemetryRecord {
    let (accel, gyro) = accident.profile().sample(rng);
    let accel = accel.map(round4);
    let gyro = gyro.map(round4);
    let speed = driver
        .crash()
        .map(|c| c.speed_at_impact_mph)
        .unwrap_or_else(|| driver.speed_mph());
    let mut record = sampled_record(
        driver,
        now_ms,
        speed,
        accel,
        gyro,
        DeviceOrientation::Landscape,
        Some(accident),
        &CRASH_RANGES,
        rng,
    );
    record.g_force = record.g_force.max(min_g_force);
    record
}

#[allow(clippy::too_many_arguments)]
fn sampled_record<R: Rng + ?Sized>(
    driver: &Driver,
    now_ms: u64,
    speed_mph: f64,
    accel: Triple,
    gyro: Triple,
    orientation: DeviceOrientation,
    accident: Option<AccidentType>,
    ranges: &SensorRanges,
    rng: &mut R,
) -> TelemetryRecord {
    let id = &driver.identity;
    let kin = &driver.kinematics;
    let mag = ranges.magnetometer.sample(rng).map(round4);
    TelemetryRecord {
        policy_id: id.policy_id,
        vehicle_id: id.vehicle_id,
        vin: id.vin.clone(),
        driver_id: id.driver_id,
        event_time: datetime_from_ms(now_ms),
        speed_mph: round2(speed_mph),
        speed_limit_mph: kin.speed_limit_mph,
        g_force: round2(accel.norm()),
        current_street: street_name(driver),
        accident_type: accident,
        gps_latitude: kin.position.lat,
        gps_longitude: kin.position.lon,
        gps_altitude: round2(ranges.altitude_m.sample(rng)),
        gps_speed: round2(speed_mph * MPH_TO_MPS),
        gps_bearing: round2(kin.bearing_deg),
        gps_accuracy: round2(ranges.gps_accuracy_m.sample(rng)),
        gps_satellite_count: ranges.satellites.sample(rng) as u8,
        gps_fix_time: ranges.fix_time_ms.sample(rng) as u32,
        accelerometer_x: accel.x,
        accelerometer_y: accel.y,
        accelerometer_z: accel.z,
        gyroscope_x: gyro.x,
        gyroscope_y: gyro.y,
        gyroscope_z: gyro.z,
        magnetometer_x: mag.x,
        magnetometer_y: mag.y,
        magnetometer_z: mag.z,
        magnetometer_heading: round2(kin.bearing_deg),
        barometric_pressure: round2(ranges.pressure_hpa.sample(rng)),
        device_battery_level: ranges.battery_pct.sample(rng) as u8,
        device_signal_strength: ranges.signal_dbm.sample(rng) as i16,
        device_orientation: orientation,
        device_screen_on: rng.gen_bool(0.5),
        device_charging: rng.gen_bool(ranges.charging_probability),
    }
}

fn frozen_record(driver: &Driver, now_ms: u64, r: &FrozenReadings) -> TelemetryRecord {
    let id = &driver.identity;
    let kin = &driver.kinematics;
    TelemetryRecord {
        policy_id: id.policy_id,
        vehicle_id: id.vehicle_id,
        vin: id.vin.clone(),
        driver_id: id.driver_id,
        event_time: datetime_from_ms(now_ms),
        speed_mph: 0.0,
        speed_limit_mph: kin.speed_limit_mph,
        g_force: round2(r.accelerometer.norm()),
        current_street: street_name(driver),
        accident_type: driver.crash().map(|c| c.accident),
        gps_latitude: kin.position.lat,
        gps_longitude: kin.position.lon,
        gps_altitude: r.altitude_m,
        gps_speed: 0.0,
        gps_bearing: round2(kin.bearing_deg),
        gps_accuracy: r.gps_accuracy_m,
        gps_satellite_count: r.satellites,
        gps_fix_time: r.fix_time_ms,
        accelerometer_x: r.accelerometer.x,
        accelerometer_y: r.accelerometer.y,
        accelerometer_z: r.accelerometer.z,
        gyroscope_x: r.gyroscope.x,
        gyroscope_y: r.gyroscope.y,
        gyroscope_z: r.gyroscope.z,
        magnetometer_x: r.magnetometer.x,
        magnetometer_y: r.magnetometer.y,
        magnetometer_z: r.magnetometer.z,
        magnetometer_heading: round2(kin.bearing_deg),
        barometric_pressure: r.pressure_hpa,
        device_battery_level: r.battery_pct,
        device_signal_strength: r.signal_dbm,
        device_orientation: r.orientation,
        device_screen_on: false,
        device_charging: false,
    }
}

fn street_name(driver: &Driver) -> String {
    if driver.kinematics.street.is_empty() {
        "Unknown Street".to_string()
    } else {
        driver.kinematics.street.clone()
    }
}
