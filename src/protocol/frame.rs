// Wire opcodes and frame decoding

/// Opcode table. Values are the wire contract with the remote client.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Motion
    Reverse = 0x00,
    Forward = 0x01,
    Stop = 0x02,
    TurnRight = 0x03,
    TurnLeft = 0x04,
    ManualDuty = 0x05, // param: steering offset around the manual centre

    // Indicator
    IndicatorGreen = 10,
    IndicatorRed = 20,
    IndicatorBlue = 30,
    IndicatorAll = 40,

    // Network configuration
    WifiSet = 0x50, // payload: SSID\0PASSWORD\0
    WifiConnect = 0x51,
    WifiDisconnect = 0x52,
    WifiStatus = 0x53,
    WifiClear = 0x54,

    // Update management
    OtaUpdate = 0x60, // payload: URL\0
    OtaCheck = 0x61,  // payload: VERSION_URL\0
    GetVersion = 0x62,
    GetInfo = 0x63,

    Keepalive = 0x70,
}

/// Handler family an opcode routes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Motion,
    Indicator,
    Network,
    Update,
    Keepalive,
}

impl Opcode {
    pub fn category(self) -> Category {
        use Opcode::*;
        match self {
            Reverse | Forward | Stop | TurnRight | TurnLeft | ManualDuty => Category::Motion,
            IndicatorGreen | IndicatorRed | IndicatorBlue | IndicatorAll => Category::Indicator,
            WifiSet | WifiConnect | WifiDisconnect | WifiStatus | WifiClear => Category::Network,
            OtaUpdate | OtaCheck | GetVersion | GetInfo => Category::Update,
            Keepalive => Category::Keepalive,
        }
    }

    /// Opcodes that cannot be executed without a parameter byte
    pub fn requires_param(self) -> bool {
        matches!(self, Opcode::ManualDuty)
    }
}

impl TryFrom<u8> for Opcode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use Opcode::*;
        let opcode = match value {
            0x00 => Reverse,
            0x01 => Forward,
            0x02 => Stop,
            0x03 => TurnRight,
            0x04 => TurnLeft,
            0x05 => ManualDuty,
            10 => IndicatorGreen,
            20 => IndicatorRed,
            30 => IndicatorBlue,
            40 => IndicatorAll,
            0x50 => WifiSet,
            0x51 => WifiConnect,
            0x52 => WifiDisconnect,
            0x53 => WifiStatus,
            0x54 => WifiClear,
            0x60 => OtaUpdate,
            0x61 => OtaCheck,
            0x62 => GetVersion,
            0x63 => GetInfo,
            0x70 => Keepalive,
            other => return Err(ProtocolError::UnknownOpcode(other)),
        };
        Ok(opcode)
    }
}

/// Error types for inbound frame decoding
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Empty frame")]
    Empty,

    #[error("Unknown opcode 0x{0:02X}")]
    UnknownOpcode(u8),

    #[error("Opcode {0:?} requires a parameter byte")]
    MissingParam(Opcode),
}

impl ProtocolError {
    /// Diagnostic string sent back to the client
    pub fn status_text(&self) -> &'static str {
        match self {
            ProtocolError::Empty => "ERR:Empty",
            ProtocolError::UnknownOpcode(_) => "ERR:Unknown",
            ProtocolError::MissingParam(_) => "ERR:Short",
        }
    }
}

/// A decoded inbound frame borrowing the raw bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub opcode: Opcode,
    /// Second byte, if present
    pub param: Option<u8>,
    /// Everything after the opcode (includes `param`)
    pub payload: &'a [u8],
}

impl<'a> Frame<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ProtocolError> {
        let (&first, payload) = bytes.split_first().ok_or(ProtocolError::Empty)?;
        let opcode = Opcode::try_from(first)?;
        let param = payload.first().copied();

        if opcode.requires_param() && param.is_none() {
            return Err(ProtocolError::MissingParam(opcode));
        }

        Ok(Self {
            opcode,
            param,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_opcode_value_decodes_to_itself() {
        for value in 0..=u8::MAX {
            if let Ok(opcode) = Opcode::try_from(value) {
                assert_eq!(opcode as u8, value);
            }
        }
    }

    #[test]
    fn test_categories() {
        assert_eq!(Opcode::Forward.category(), Category::Motion);
        assert_eq!(Opcode::IndicatorRed.category(), Category::Indicator);
        assert_eq!(Opcode::WifiClear.category(), Category::Network);
        assert_eq!(Opcode::GetInfo.category(), Category::Update);
        assert_eq!(Opcode::Keepalive.category(), Category::Keepalive);
    }

    #[test]
    fn test_gaps_are_unknown() {
        for value in [0x06u8, 0x09, 0x0B, 0x29, 0x4F, 0x55, 0x5F, 0x64, 0x71, 0x99, 0xFF] {
            assert_eq!(
                Opcode::try_from(value),
                Err(ProtocolError::UnknownOpcode(value))
            );
        }
    }

    #[test]
    fn test_parse_param_and_payload() {
        let frame = Frame::parse(&[0x05, 80]).expect("manual frame should parse");
        assert_eq!(frame.opcode, Opcode::ManualDuty);
        assert_eq!(frame.param, Some(80));

        let frame = Frame::parse(b"\x50home\0secret\0").expect("wifi frame should parse");
        assert_eq!(frame.opcode, Opcode::WifiSet);
        assert_eq!(frame.payload, b"home\0secret\0");
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Frame::parse(&[]), Err(ProtocolError::Empty));
        assert_eq!(
            Frame::parse(&[0x05]),
            Err(ProtocolError::MissingParam(Opcode::ManualDuty))
        );
        assert_eq!(
            Frame::parse(&[0x99, 1, 2]),
            Err(ProtocolError::UnknownOpcode(0x99))
        );
    }

    #[test]
    fn test_status_text_is_ascii() {
        for err in [
            ProtocolError::Empty,
            ProtocolError::UnknownOpcode(0x99),
            ProtocolError::MissingParam(Opcode::ManualDuty),
        ] {
            assert!(err.status_text().is_ascii());
            assert!(!err.status_text().contains('\0'));
        }
        assert_eq!(ProtocolError::UnknownOpcode(0x99).status_text(), "ERR:Unknown");
    }
}
