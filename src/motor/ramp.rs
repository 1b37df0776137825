// Forward ramp profile
// Linear interpolation of duty from floor to ceiling over a fixed duration.
// Integer-only so the duty sequence is identical on every platform.

use std::time::Duration;

use crate::config::DriveConfig;

/// Where a ramp is at a given elapsed time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampPoint {
    /// Still climbing, apply this duty to both sides
    Rising(u8),
    /// Duration reached, hold the ceiling
    Saturated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampProfile {
    pub floor: u8,
    pub ceiling: u8,
    pub duration: Duration,
}

impl RampProfile {
    pub fn new(floor: u8, ceiling: u8, duration: Duration) -> Self {
        Self {
            floor,
            ceiling,
            duration,
        }
    }

    pub fn from_config(config: &DriveConfig) -> Self {
        Self::new(
            config.ramp_floor,
            config.ramp_ceiling,
            Duration::from_millis(config.ramp_duration_ms),
        )
    }

    /// Evaluate the ramp `elapsed` after it started
    ///
    /// `duty = floor + (ceiling - floor) * elapsed_ms / duration_ms`, truncating.
    pub fn point_at(&self, elapsed: Duration) -> RampPoint {
        let duration_ms = self.duration.as_millis() as u64;
        let elapsed_ms = elapsed.as_millis() as u64;

        if elapsed_ms >= duration_ms {
            return RampPoint::Saturated;
        }

        let span = u64::from(self.ceiling.saturating_sub(self.floor));
        let duty = u64::from(self.floor) + span * elapsed_ms / duration_ms;

        // elapsed < duration keeps duty strictly below ceiling, so it fits in u8
        RampPoint::Rising(duty.min(u64::from(self.ceiling)) as u8)
    }
}

impl Default for RampProfile {
    fn default() -> Self {
        Self::from_config(&DriveConfig::default())
    }
}
