//! Time-of-day activity profile.
//!
//! Scales how eagerly parked drivers set off and how often driving drivers
//! stop. Factor 1.0 = baseline; above 1.0 = busier (peak hours), below 1.0 =
//! quieter (night).

use bevy_ecs::prelude::Resource;

use crate::clock::hour_of_day;
use crate::config::ActivityConfig;

#[derive(Clone, Debug, PartialEq, Resource)]
pub struct ActivityProfile {
    /// Multiplier for each local hour of the day (0–23).
    pub hourly_factors: [f64; 24],
    pub utc_offset_hours: i32,
}

impl Default for ActivityProfile {
    fn default() -> Self {
        Self::flat()
    }
}

impl ActivityProfile {
    /// All factors 1.0 (no time-of-day effect).
    pub fn flat() -> Self {
        Self {
            hourly_factors: [1.0; 24],
            utc_offset_hours: 0,
        }
    }

    pub fn from_config(config: &ActivityConfig) -> Self {
        let mut f = [1.0_f64; 24];
        for &h in &config.night_hours {
            if let Some(slot) = f.get_mut(h as usize) {
                *slot = config.night_multiplier;
            }
        }
        // peak wins where the two lists overlap
        for &h in &config.peak_hours {
            if let Some(slot) = f.get_mut(h as usize) {
                *slot = config.peak_multiplier;
            }
        }
        Self {
            hourly_factors: f,
            utc_offset_hours: config.utc_offset_hours,
        }
    }

    pub fn factor_at(&self, now_ms: u64) -> f64 {
        self.hourly_factors[hour_of_day(now_ms, self.utc_offset_hours)]
    }

    /// `base * factor`, clamped to [0, 1].
    pub fn start_probability(&self, base: f64, now_ms: u64) -> f64 {
        (base * self.factor_at(now_ms)).clamp(0.0, 1.0)
    }

    /// `base / factor`, clamped to [0, 1]. Quiet hours park more often.
    pub fn stop_probability(&self, base: f64, now_ms: u64) -> f64 {
        let factor = self.factor_at(now_ms);
        if factor <= 0.0 {
            return 1.0;
        }
        (base / factor).clamp(0.0, 1.0)
    }
}
