// Command protocol for the vehicle link
//
// Inbound frame: [opcode, param?, payload...]
// Outbound status: short ASCII strings ("OK", "ERR:Unknown", ...)

mod dispatch;
pub mod frame;

pub use dispatch::{DelegatedFrame, Dispatcher, IndicatorCommand, MotionCommand, RoutingDecision};
pub use frame::{Category, Frame, Opcode, ProtocolError};

/// Acknowledgement sent after an accepted motion or indicator frame
pub const STATUS_OK: &str = "OK";
