//! Messages about the robot as a whole.
//!
//! All of these travel on the reserved [`ENVIRONMENT`] device id, except
//! that a [`DeviceDescriptionPacket`] names another device inside its
//! payload.

use std::fmt;

use tclink_protocol::{
    DomainPacket, Packet, PacketKind, ProtocolError, ToPacket, MAX_STRING_LEN,
};

use crate::children_exact;
use crate::ids::{RobotLabel, ENVIRONMENT};

/// Separates caption and message inside a telemetry string.
pub const TELEMETRY_SEPARATOR: &str = "$$";

// ---------------------------------------------------------------------------
// VoltageDataPacket
// ---------------------------------------------------------------------------

/// Battery voltage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoltageDataPacket {
    pub voltage: f64,
}

impl VoltageDataPacket {
    pub fn new(voltage: f64) -> Self {
        Self { voltage }
    }
}

impl ToPacket for VoltageDataPacket {
    fn to_packet(&self) -> Result<Packet, ProtocolError> {
        Ok(Packet::double(ENVIRONMENT, self.voltage).with_label(Self::LABEL))
    }
}

impl DomainPacket for VoltageDataPacket {
    const KIND: PacketKind = PacketKind::Double;
    const LABEL: i8 = RobotLabel::VoltageData.as_i8();

    fn from_packet(packet: &Packet) -> Option<Self> {
        if !Self::accepts(packet) {
            return None;
        }
        packet.as_double().map(Self::new)
    }
}

// ---------------------------------------------------------------------------
// TelemetryDataPacket
// ---------------------------------------------------------------------------

/// One telemetry line, carried as `"<caption>$$<message>"`.
///
/// Neither part may contain `$$`, the caption may not end in `$`, and the
/// joined string must fit the 127-byte string limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryDataPacket {
    caption: String,
    message: String,
}

impl TelemetryDataPacket {
    /// # Errors
    /// - [`ProtocolError::InvalidMessage`] if either part contains `$$` or
    ///   the caption ends in `$`.
    /// - [`ProtocolError::StringTooLong`] if the joined form exceeds 127
    ///   bytes.
    pub fn new(
        caption: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<Self, ProtocolError> {
        let caption = caption.into();
        let message = message.into();
        for part in [&caption, &message] {
            if part.contains(TELEMETRY_SEPARATOR) {
                return Err(ProtocolError::InvalidMessage(format!(
                    "telemetry part {part:?} contains {TELEMETRY_SEPARATOR:?}"
                )));
            }
        }
        if caption.ends_with('$') {
            return Err(ProtocolError::InvalidMessage(format!(
                "telemetry caption {caption:?} ends in '$'"
            )));
        }
        let joined_len =
            caption.len() + TELEMETRY_SEPARATOR.len() + message.len();
        if joined_len > MAX_STRING_LEN {
            return Err(ProtocolError::StringTooLong(joined_len));
        }
        Ok(Self { caption, message })
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl ToPacket for TelemetryDataPacket {
    fn to_packet(&self) -> Result<Packet, ProtocolError> {
        let text = format!("{}{TELEMETRY_SEPARATOR}{}", self.caption, self.message);
        Ok(Packet::string(ENVIRONMENT, text)?.with_label(Self::LABEL))
    }
}

impl DomainPacket for TelemetryDataPacket {
    const KIND: PacketKind = PacketKind::String;
    const LABEL: i8 = RobotLabel::TelemetryData.as_i8();

    fn from_packet(packet: &Packet) -> Option<Self> {
        if !Self::accepts(packet) {
            return None;
        }
        let (caption, message) =
            packet.as_str()?.split_once(TELEMETRY_SEPARATOR)?;
        Self::new(caption, message).ok()
    }
}

// ---------------------------------------------------------------------------
// TelemetryClearPacket
// ---------------------------------------------------------------------------

/// Clears the telemetry display. Carried as `Byte(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TelemetryClearPacket;

impl ToPacket for TelemetryClearPacket {
    fn to_packet(&self) -> Result<Packet, ProtocolError> {
        Ok(Packet::byte(ENVIRONMENT, 0).with_label(Self::LABEL))
    }
}

impl DomainPacket for TelemetryClearPacket {
    const KIND: PacketKind = PacketKind::Byte;
    const LABEL: i8 = RobotLabel::TelemetryClear.as_i8();

    fn from_packet(packet: &Packet) -> Option<Self> {
        Self::accepts(packet).then_some(TelemetryClearPacket)
    }
}

// ---------------------------------------------------------------------------
// DeviceDescriptionPacket
// ---------------------------------------------------------------------------

/// Announces a device and its human-readable name.
///
/// Travels on [`ENVIRONMENT`]; the described id is the first child,
/// as `[Byte device_id, String name]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptionPacket {
    device_id: u8,
    name: String,
}

impl DeviceDescriptionPacket {
    /// # Errors
    /// [`ProtocolError::StringTooLong`] if `name` exceeds 127 bytes.
    pub fn new(device_id: u8, name: impl Into<String>) -> Result<Self, ProtocolError> {
        let name = name.into();
        if name.len() > MAX_STRING_LEN {
            return Err(ProtocolError::StringTooLong(name.len()));
        }
        Ok(Self { device_id, name })
    }

    /// The id of the described device (not the packet's own id).
    pub fn device_id(&self) -> u8 {
        self.device_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ToPacket for DeviceDescriptionPacket {
    fn to_packet(&self) -> Result<Packet, ProtocolError> {
        let children = vec![
            Packet::byte(ENVIRONMENT, self.device_id),
            Packet::string(ENVIRONMENT, self.name.as_str())?,
        ];
        Ok(Packet::combined(ENVIRONMENT, children)?.with_label(Self::LABEL))
    }
}

impl DomainPacket for DeviceDescriptionPacket {
    const KIND: PacketKind = PacketKind::Combined;
    const LABEL: i8 = RobotLabel::DeviceDescription.as_i8();

    fn from_packet(packet: &Packet) -> Option<Self> {
        if !Self::accepts(packet) {
            return None;
        }
        let [id, name] = children_exact(packet, 2)? else {
            return None;
        };
        Self::new(id.as_byte()?, name.as_str()?).ok()
    }
}

// ---------------------------------------------------------------------------
// OpModeInfoPacket
// ---------------------------------------------------------------------------

/// Lifecycle state of the running op mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpModeState {
    Init = 0,
    Start = 1,
    Stop = 2,
}

impl OpModeState {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(OpModeState::Init),
            1 => Some(OpModeState::Start),
            2 => Some(OpModeState::Stop),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for OpModeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpModeState::Init => write!(f, "INIT"),
            OpModeState::Start => write!(f, "START"),
            OpModeState::Stop => write!(f, "STOP"),
        }
    }
}

/// Name and state of the op mode, as `[String name, Byte state]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpModeInfoPacket {
    name: String,
    state: OpModeState,
}

impl OpModeInfoPacket {
    /// # Errors
    /// [`ProtocolError::StringTooLong`] if `name` exceeds 127 bytes.
    pub fn new(name: impl Into<String>, state: OpModeState) -> Result<Self, ProtocolError> {
        let name = name.into();
        if name.len() > MAX_STRING_LEN {
            return Err(ProtocolError::StringTooLong(name.len()));
        }
        Ok(Self { name, state })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> OpModeState {
        self.state
    }
}

impl ToPacket for OpModeInfoPacket {
    fn to_packet(&self) -> Result<Packet, ProtocolError> {
        let children = vec![
            Packet::string(ENVIRONMENT, self.name.as_str())?,
            Packet::byte(ENVIRONMENT, self.state.as_u8()),
        ];
        Ok(Packet::combined(ENVIRONMENT, children)?.with_label(Self::LABEL))
    }
}

impl DomainPacket for OpModeInfoPacket {
    const KIND: PacketKind = PacketKind::Combined;
    const LABEL: i8 = RobotLabel::OpModeInfo.as_i8();

    fn from_packet(packet: &Packet) -> Option<Self> {
        if !Self::accepts(packet) {
            return None;
        }
        let [name, state] = children_exact(packet, 2)? else {
            return None;
        };
        let state = OpModeState::from_u8(state.as_byte()?)?;
        Self::new(name.as_str()?, state).ok()
    }
}

// ---------------------------------------------------------------------------
// OperationPeriodPacket
// ---------------------------------------------------------------------------

/// Control loop period reported by the device bridge, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationPeriodPacket {
    pub period: i32,
}

impl OperationPeriodPacket {
    pub fn new(period: i32) -> Self {
        Self { period }
    }
}

impl ToPacket for OperationPeriodPacket {
    fn to_packet(&self) -> Result<Packet, ProtocolError> {
        Ok(Packet::int(ENVIRONMENT, self.period).with_label(Self::LABEL))
    }
}

impl DomainPacket for OperationPeriodPacket {
    const KIND: PacketKind = PacketKind::Int;
    const LABEL: i8 = RobotLabel::OperationPeriod.as_i8();

    fn from_packet(packet: &Packet) -> Option<Self> {
        if !Self::accepts(packet) {
            return None;
        }
        packet.as_int().map(Self::new)
    }
}
