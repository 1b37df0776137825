// Motor control module for the two-wheel differential drive
//
// Provides:
// - Duty/direction output state for the left and right motors
// - The timed forward ramp and its latch-at-ceiling terminal state

mod controller;
pub mod ramp;

pub use controller::{Direction, MotionController, MotionState, RampPhase};
pub use ramp::{RampPoint, RampProfile};
