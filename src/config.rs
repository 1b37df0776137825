// Timing, duty levels, key expressions and the loadable drive configuration
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

// Control loop period
pub const TICK_PERIOD_MS: u64 = 10;

// Watchdog window: no accepted frame for this long stops the motors
pub const INACTIVITY_MS: u64 = 300;

// Forward ramp: floor duty -> ceiling duty over RAMP_DURATION_MS
pub const RAMP_FLOOR_DUTY: u8 = 100;
pub const RAMP_CEILING_DUTY: u8 = 255;
pub const RAMP_DURATION_MS: u64 = 2000;

// Fixed duty levels for the direct motion opcodes
pub const REVERSE_DUTY: u8 = 50;
pub const TURN_DUTY: u8 = 200;

// Manual opcode: parameter centre and the cruise duty both sides sit around
pub const MANUAL_CENTER: u8 = 50;
pub const MANUAL_CRUISE_DUTY: u8 = 180;

// Low-power observer: report idle after this long without activity while disconnected
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(15);
pub const IDLE_POLL_MS: u64 = 100;

// Zenoh key expressions (relative to the configured prefix)
pub const DEFAULT_PREFIX: &str = "zobo";
pub const KEY_PEER_PRESENCE: &str = "link/peer"; // liveliness tokens, one per client
pub const KEY_VEHICLE_PRESENCE: &str = "link/vehicle"; // held while discoverable
pub const KEY_RT_MOTOR: &str = "rt/motor"; // actuation
pub const KEY_HEALTH: &str = "state/health"; // health status

// Outbound status queue depth between the core and the zenoh writer
pub const OUTBOUND_QUEUE: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Drive tuning. Every field falls back to the constants above when omitted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub tick_period_ms: u64,
    pub inactivity_ms: u64,
    pub ramp_floor: u8,
    pub ramp_ceiling: u8,
    pub ramp_duration_ms: u64,
    pub reverse_duty: u8,
    pub turn_duty: u8,
    pub manual_center: u8,
    pub manual_cruise: u8,
    /// Reply "OK" after every accepted motion or indicator frame
    pub ack_commands: bool,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: TICK_PERIOD_MS,
            inactivity_ms: INACTIVITY_MS,
            ramp_floor: RAMP_FLOOR_DUTY,
            ramp_ceiling: RAMP_CEILING_DUTY,
            ramp_duration_ms: RAMP_DURATION_MS,
            reverse_duty: REVERSE_DUTY,
            turn_duty: TURN_DUTY,
            manual_center: MANUAL_CENTER,
            manual_cruise: MANUAL_CRUISE_DUTY,
            ack_commands: true,
        }
    }
}

impl DriveConfig {
    /// Load a JSON config file and validate it
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_period_ms == 0 {
            return Err(ConfigError::Invalid("tick_period_ms must be non-zero".into()));
        }
        if self.ramp_duration_ms == 0 {
            return Err(ConfigError::Invalid("ramp_duration_ms must be non-zero".into()));
        }
        if self.ramp_floor > self.ramp_ceiling {
            return Err(ConfigError::Invalid(format!(
                "ramp_floor {} exceeds ramp_ceiling {}",
                self.ramp_floor, self.ramp_ceiling
            )));
        }
        if self.inactivity_ms < self.tick_period_ms {
            return Err(ConfigError::Invalid(format!(
                "inactivity_ms {} is shorter than one tick ({} ms)",
                self.inactivity_ms, self.tick_period_ms
            )));
        }
        Ok(())
    }

    /// Watchdog countdown in ticks
    pub fn watchdog_ticks(&self) -> u32 {
        (self.inactivity_ms / self.tick_period_ms) as u32
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }
}
