// Opcode dispatcher
// Decodes frames into routing decisions and executes the motion ones.

use std::time::Instant;

use tracing::{debug, info, warn};

use super::frame::{Frame, Opcode, ProtocolError};
use super::STATUS_OK;
use crate::config::DriveConfig;
use crate::motor::{Direction, MotionController};
use crate::watchdog::Watchdog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionCommand {
    Reverse,
    Forward,
    Stop,
    TurnRight,
    TurnLeft,
    /// Steering parameter, centred on the manual centre value
    Manual(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorCommand {
    Green,
    Red,
    Blue,
    All,
    /// Main light off, issued alongside a stop
    MainOff,
}

/// A frame handed to an external collaborator untouched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegatedFrame {
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

/// Which handler a frame belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    Motion(MotionCommand),
    Indicator(IndicatorCommand),
    Network(DelegatedFrame),
    Update(DelegatedFrame),
    Keepalive,
    Rejected(ProtocolError),
}

impl RoutingDecision {
    /// Accepted frames feed the watchdog, rejected ones do not
    pub fn is_accepted(&self) -> bool {
        !matches!(self, RoutingDecision::Rejected(_))
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    reverse_duty: u8,
    turn_duty: u8,
    manual_center: u8,
    manual_cruise: u8,
    ack_commands: bool,
}

impl Dispatcher {
    pub fn from_config(config: &DriveConfig) -> Self {
        Self {
            reverse_duty: config.reverse_duty,
            turn_duty: config.turn_duty,
            manual_center: config.manual_center,
            manual_cruise: config.manual_cruise,
            ack_commands: config.ack_commands,
        }
    }

    /// Classify a frame without touching any state
    pub fn on_frame(bytes: &[u8]) -> RoutingDecision {
        let frame = match Frame::parse(bytes) {
            Ok(frame) => frame,
            Err(e) => return RoutingDecision::Rejected(e),
        };

        let delegated = || DelegatedFrame {
            opcode: frame.opcode,
            payload: frame.payload.to_vec(),
        };

        match frame.opcode {
            Opcode::Reverse => RoutingDecision::Motion(MotionCommand::Reverse),
            Opcode::Forward => RoutingDecision::Motion(MotionCommand::Forward),
            Opcode::Stop => RoutingDecision::Motion(MotionCommand::Stop),
            Opcode::TurnRight => RoutingDecision::Motion(MotionCommand::TurnRight),
            Opcode::TurnLeft => RoutingDecision::Motion(MotionCommand::TurnLeft),
            Opcode::ManualDuty => match frame.param {
                Some(param) => RoutingDecision::Motion(MotionCommand::Manual(param)),
                None => RoutingDecision::Rejected(ProtocolError::MissingParam(frame.opcode)),
            },
            Opcode::IndicatorGreen => RoutingDecision::Indicator(IndicatorCommand::Green),
            Opcode::IndicatorRed => RoutingDecision::Indicator(IndicatorCommand::Red),
            Opcode::IndicatorBlue => RoutingDecision::Indicator(IndicatorCommand::Blue),
            Opcode::IndicatorAll => RoutingDecision::Indicator(IndicatorCommand::All),
            Opcode::WifiSet
            | Opcode::WifiConnect
            | Opcode::WifiDisconnect
            | Opcode::WifiStatus
            | Opcode::WifiClear => RoutingDecision::Network(delegated()),
            Opcode::OtaUpdate | Opcode::OtaCheck | Opcode::GetVersion | Opcode::GetInfo => {
                RoutingDecision::Update(delegated())
            }
            Opcode::Keepalive => RoutingDecision::Keepalive,
        }
    }

    /// Route a frame and apply its effect on the watchdog and motors
    ///
    /// Returns the decision and the status reply the core owes the client, if any.
    /// Delegated categories are left to the caller.
    pub fn dispatch(
        &self,
        bytes: &[u8],
        motion: &mut MotionController,
        watchdog: &mut Watchdog,
        now: Instant,
    ) -> (RoutingDecision, Option<&'static str>) {
        let decision = Self::on_frame(bytes);

        if let RoutingDecision::Rejected(ref e) = decision {
            warn!("Rejected frame {:02X?}: {}", bytes, e);
            let status = e.status_text();
            return (decision, Some(status));
        }

        watchdog.reset();

        let reply = match decision {
            RoutingDecision::Motion(cmd) => {
                self.apply(cmd, motion, now);
                self.ack()
            }
            RoutingDecision::Indicator(cmd) => {
                debug!("Indicator: {:?}", cmd);
                self.ack()
            }
            // Keepalives stay silent; delegated replies belong to the collaborator
            _ => None,
        };

        (decision, reply)
    }

    /// Execute a motion command on the controller
    pub fn apply(&self, cmd: MotionCommand, motion: &mut MotionController, now: Instant) {
        match cmd {
            MotionCommand::Reverse => {
                motion.set_manual(
                    self.reverse_duty,
                    self.reverse_duty,
                    Direction::Reverse,
                    Direction::Reverse,
                );
                info!("Moving backward");
            }
            MotionCommand::Forward => motion.start_ramp(now),
            MotionCommand::Stop => {
                motion.stop();
                info!("Stopped");
            }
            MotionCommand::TurnRight => {
                let (left, right) = self.turn_split();
                motion.set_manual(left, right, Direction::Forward, Direction::Reverse);
                info!("Turning right");
            }
            MotionCommand::TurnLeft => {
                let (outer, inner) = self.turn_split();
                motion.set_manual(inner, outer, Direction::Reverse, Direction::Forward);
                info!("Turning left");
            }
            MotionCommand::Manual(param) => {
                let (left, right) = self.manual_duties(param);
                motion.set_manual(left, right, Direction::Forward, Direction::Forward);
                info!("Manual duty: param={} -> left={}, right={}", param, left, right);
            }
        }
    }

    /// (turn duty, 255 - turn duty)
    fn turn_split(&self) -> (u8, u8) {
        (self.turn_duty, u8::MAX - self.turn_duty)
    }

    /// Symmetric split around the cruise duty. Above centre biases the left side down.
    pub fn manual_duties(&self, param: u8) -> (u8, u8) {
        let offset = i16::from(param) - i16::from(self.manual_center);
        let cruise = i16::from(self.manual_cruise);
        let clamp = |duty: i16| duty.clamp(0, i16::from(u8::MAX)) as u8;
        (clamp(cruise - offset), clamp(cruise + offset))
    }

    fn ack(&self) -> Option<&'static str> {
        self.ack_commands.then_some(STATUS_OK)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::from_config(&DriveConfig::default())
    }
}
