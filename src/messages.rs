// Message types the runtime publishes

use serde::{Deserialize, Serialize};

use crate::motor::{Direction, MotionState, RampPhase};

// Actuation output from runtime -> motor bridge
// Has default values so a stopped vehicle serializes to all zeros
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct MotorActuation {
    pub left_duty: u8,
    pub right_duty: u8,
    pub left: Direction,
    pub right: Direction,
    /// Direction line levels as the H-bridge sees them
    pub left_dir_high: bool,
    pub right_dir_high: bool,
    pub ramp: RampPhase,
}

impl From<&MotionState> for MotorActuation {
    fn from(state: &MotionState) -> Self {
        Self {
            left_duty: state.left_duty,
            right_duty: state.right_duty,
            left: state.left,
            right: state.right,
            left_dir_high: state.left.line_level(),
            right_dir_high: state.right.line_level(),
            ramp: state.ramp_phase,
        }
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    /// Client connected and commanding
    Ok,
    /// Client connected but the watchdog has lapsed
    CmdStale,
    Disconnected,
    /// Disconnected and inactive long enough for the low-power observer
    Idle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_serializes_snake_case() {
        let json = serde_json::to_string(&RuntimeHealth::CmdStale).expect("serialize");
        assert_eq!(json, "\"cmd_stale\"");
        let back: RuntimeHealth = serde_json::from_str("\"idle\"").expect("deserialize");
        assert_eq!(back, RuntimeHealth::Idle);
    }

    #[test]
    fn test_actuation_from_reverse_state() {
        let state = MotionState {
            left_duty: 50,
            right_duty: 50,
            left: Direction::Reverse,
            right: Direction::Reverse,
            ..MotionState::default()
        };
        let actuation = MotorActuation::from(&state);
        assert!(actuation.left_dir_high && actuation.right_dir_high);

        let json = serde_json::to_value(actuation).expect("serialize");
        assert_eq!(json["left_duty"], 50);
        assert_eq!(json["left"], "reverse");
        assert_eq!(json["ramp"], "idle");
    }

    #[test]
    fn test_stopped_actuation_is_default() {
        assert_eq!(
            MotorActuation::from(&MotionState::default()),
            MotorActuation::default()
        );
    }
}
