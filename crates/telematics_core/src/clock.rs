//! Wall-clock time for the simulation.
//!
//! The runner reads a [`TimeSource`] before every tick and stores the value in
//! [`SimulationClock`]; systems only ever read the resource. Tests drive time
//! with [`ManualTimeSource`] instead of sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bevy_ecs::prelude::{Entity, Resource};
use chrono::{DateTime, FixedOffset, TimeZone, Timelike, Utc};

pub const ONE_SEC_MS: u64 = 1_000;
pub const ONE_MIN_MS: u64 = 60 * ONE_SEC_MS;

/// Milliseconds since the Unix epoch as seen by the current tick.
#[derive(Debug, Default, Clone, Copy, Resource)]
pub struct SimulationClock {
    now: u64,
}

impl SimulationClock {
    pub fn starting_at(now_ms: u64) -> Self {
        Self { now: now_ms }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    /// Moves the clock to `now_ms`. Never moves backwards.
    pub fn set(&mut self, now_ms: u64) {
        self.now = self.now.max(now_ms);
    }

    pub fn advance(&mut self, delta_ms: u64) {
        self.now = self.now.saturating_add(delta_ms);
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        datetime_from_ms(self.now)
    }

    /// Local hour of day (0-23) at a fixed UTC offset.
    pub fn hour_of_day(&self, utc_offset_hours: i32) -> usize {
        hour_of_day(self.now, utc_offset_hours)
    }
}

pub fn datetime_from_ms(ms: u64) -> DateTime<Utc> {
    i64::try_from(ms)
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_default()
}

pub fn hour_of_day(now_ms: u64, utc_offset_hours: i32) -> usize {
    let utc = datetime_from_ms(now_ms);
    match FixedOffset::east_opt(utc_offset_hours.clamp(-23, 23) * 3_600) {
        Some(offset) => utc.with_timezone(&offset).hour() as usize,
        None => utc.hour() as usize,
    }
}

/// Driver selected for the current tick.
#[derive(Debug, Clone, Copy, Resource)]
pub struct CurrentTick(pub Entity);

/// Source of wall-clock time.
pub trait TimeSource: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> u64 {
        u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// Settable clock shared between a test and the simulation it drives.
#[derive(Debug, Default, Clone)]
pub struct ManualTimeSource {
    now: Arc<AtomicU64>,
}

impl ManualTimeSource {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta: Duration) {
        self.now
            .fetch_add(delta.as_millis() as u64, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Blocks the calling thread. Injected so retries and pacing never sleep in tests.
pub trait Backoff: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadBackoff;

impl Backoff for ThreadBackoff {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
