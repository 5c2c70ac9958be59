use bevy_ecs::prelude::Resource;
use rand::Rng;

use crate::config::SpeedConfig;
use crate::routing::Waypoint;

/// Target and actual speed decisions for driving vehicles.
#[derive(Debug, Clone, Default, Resource)]
pub struct SpeedModel {
    config: SpeedConfig,
}

impl SpeedModel {
    pub fn new(config: SpeedConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SpeedConfig {
        &self.config
    }

    /// Speed of a stopped vehicle as it sets off toward `target_mph`.
    pub fn pull_away_mph<R: Rng + ?Sized>(&self, target_mph: f64, rng: &mut R) -> f64 {
        let c = &self.config;
        let max = target_mph.min(c.pull_away_max_mph).max(c.pull_away_min_mph);
        if max > c.pull_away_min_mph {
            rng.gen_range(c.pull_away_min_mph..=max)
        } else {
            c.pull_away_min_mph
        }
    }

    /// One tick of drift toward the target, bounded per tick, with noise. Never negative.
    pub fn drift_mph<R: Rng + ?Sized>(&self, current_mph: f64, target_mph: f64, rng: &mut R) -> f64 {
        let c = &self.config;
        let step = (target_mph - current_mph).clamp(-c.max_change_per_tick_mph, c.max_change_per_tick_mph);
        let noise = if c.noise_mph > 0.0 {
            rng.gen_range(-c.noise_mph..=c.noise_mph)
        } else {
            0.0
        };
        (current_mph + step + noise).max(0.0)
    }

    /// Target speed chosen on arrival at `waypoint`.
    pub fn waypoint_target_mph<R: Rng + ?Sized>(
        &self,
        waypoint: &Waypoint,
        current_mph: f64,
        aggressive: bool,
        rng: &mut R,
    ) -> f64 {
        let c = &self.config;
        if waypoint.has_traffic_control {
            return (current_mph * c.control_braking_factor).max(c.min_cruise_mph);
        }
        let limit = f64::from(waypoint.speed_limit);
        let mut target = limit;
        if c.limit_noise_mph > 0.0 {
            target += rng.gen_range(-c.limit_noise_mph..=c.limit_noise_mph);
        }
        let (speeding_p, ceiling) = if aggressive {
            (c.aggressive_speeding_probability, c.aggressive_ceiling_over_limit_mph)
        } else {
            (c.speeding_probability, c.ceiling_over_limit_mph)
        };
        if rng.gen_bool(speeding_p.clamp(0.0, 1.0)) {
            target += if c.speeding_max_mph > c.speeding_min_mph {
                rng.gen_range(c.speeding_min_mph..=c.speeding_max_mph)
            } else {
                c.speeding_min_mph
            };
        }
        target.min(limit + ceiling).max(c.min_cruise_mph)
    }
}
