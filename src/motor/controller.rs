// Motion controller for the differential drive
//
// Owns the duty and direction outputs plus the ramp/latch state machine.
// Every operation is total: there is no reachable state where a call fails.

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use super::ramp::{RampPoint, RampProfile};

/// Drive direction of one side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Neutral,
    Forward,
    Reverse,
}

impl Direction {
    /// Level of the H-bridge direction line: high drives the wheel backwards
    pub fn line_level(self) -> bool {
        matches!(self, Direction::Reverse)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RampPhase {
    #[default]
    Idle,
    Ramping,
    Latched,
}

/// Output state of both motors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionState {
    pub left_duty: u8,
    pub right_duty: u8,
    pub left: Direction,
    pub right: Direction,
    pub ramp_phase: RampPhase,
    /// Only meaningful while `ramp_phase == Ramping`
    pub ramp_started_at: Option<Instant>,
}

impl MotionState {
    /// Zero duty on both sides
    pub fn is_stopped(&self) -> bool {
        self.left_duty == 0 && self.right_duty == 0
    }
}

#[derive(Debug, Clone)]
pub struct MotionController {
    state: MotionState,
    ramp: RampProfile,
}

impl MotionController {
    /// Start stopped: duty 0, neutral, Idle
    pub fn new(ramp: RampProfile) -> Self {
        Self {
            state: MotionState::default(),
            ramp,
        }
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    /// Apply duties and directions directly, cancelling any ramp first
    pub fn set_manual(&mut self, left_duty: u8, right_duty: u8, left: Direction, right: Direction) {
        self.cancel_ramp();
        self.apply(left_duty, right_duty);
        self.state.left = left;
        self.state.right = right;
        debug!(
            "Manual output: left={} ({:?}), right={} ({:?})",
            left_duty, left, right_duty, right
        );
    }

    /// Begin the forward ramp. No-op while already ramping or latched.
    pub fn start_ramp(&mut self, now: Instant) {
        if self.state.ramp_phase != RampPhase::Idle {
            debug!("Forward ramp already {:?}, ignoring", self.state.ramp_phase);
            return;
        }

        self.state.ramp_phase = RampPhase::Ramping;
        self.state.ramp_started_at = Some(now);
        self.apply(self.ramp.floor, self.ramp.floor);
        self.state.left = Direction::Forward;
        self.state.right = Direction::Forward;
        info!("Starting forward ramp");
    }

    /// Leave the ramp state machine without touching the outputs
    pub fn cancel_ramp(&mut self) {
        self.state.ramp_phase = RampPhase::Idle;
        self.state.ramp_started_at = None;
    }

    pub fn stop(&mut self) {
        self.cancel_ramp();
        self.apply(0, 0);
        self.state.left = Direction::Neutral;
        self.state.right = Direction::Neutral;
    }

    /// Advance the ramp to `now`. Only acts while ramping.
    pub fn tick(&mut self, now: Instant) {
        if self.state.ramp_phase != RampPhase::Ramping {
            return;
        }
        let Some(started) = self.state.ramp_started_at else {
            return;
        };

        match self.ramp.point_at(now.saturating_duration_since(started)) {
            RampPoint::Rising(duty) => self.apply(duty, duty),
            RampPoint::Saturated => {
                self.apply(self.ramp.ceiling, self.ramp.ceiling);
                self.state.ramp_phase = RampPhase::Latched;
                self.state.ramp_started_at = None;
                info!("Ramp complete, latched at {}", self.ramp.ceiling);
            }
        }
    }

    fn apply(&mut self, left: u8, right: u8) {
        self.state.left_duty = left;
        self.state.right_duty = right;
    }
}

impl Default for MotionController {
    fn default() -> Self {
        Self::new(RampProfile::default())
    }
}
