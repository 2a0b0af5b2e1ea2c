//! Readings devices report back to the master.

use tclink_protocol::{DomainPacket, Packet, PacketKind, ProtocolError, ToPacket};

use crate::ids::RobotLabel;
use crate::{children_exact, double_group, doubles};

device_value_packet! {
    /// Touch sensor state.
    TouchSensorDataPacket { pressed: bool },
    kind: Boolean,
    label: TouchSensorData,
    build: boolean,
    read: as_bool,
}

/// Encoder position (ticks) and speed, as `[Int position, Double speed]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderDataPacket {
    pub device_id: u8,
    pub position: i32,
    pub speed: f64,
}

impl EncoderDataPacket {
    pub fn new(device_id: u8, position: i32, speed: f64) -> Self {
        Self {
            device_id,
            position,
            speed,
        }
    }
}

impl ToPacket for EncoderDataPacket {
    fn to_packet(&self) -> Result<Packet, ProtocolError> {
        let children = vec![
            Packet::int(self.device_id, self.position),
            Packet::double(self.device_id, self.speed),
        ];
        Ok(Packet::combined(self.device_id, children)?.with_label(Self::LABEL))
    }
}

impl DomainPacket for EncoderDataPacket {
    const KIND: PacketKind = PacketKind::Combined;
    const LABEL: i8 = RobotLabel::EncoderData.as_i8();

    fn from_packet(packet: &Packet) -> Option<Self> {
        if !Self::accepts(packet) {
            return None;
        }
        let [position, speed] = children_exact(packet, 2)? else {
            return None;
        };
        Some(Self::new(
            packet.device_id(),
            position.as_int()?,
            speed.as_double()?,
        ))
    }
}

/// Orientation in degrees, as `[pitch, yaw, roll]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GyroDataPacket {
    pub device_id: u8,
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

impl GyroDataPacket {
    pub fn new(device_id: u8, pitch: f64, yaw: f64, roll: f64) -> Self {
        Self {
            device_id,
            pitch,
            yaw,
            roll,
        }
    }
}

impl ToPacket for GyroDataPacket {
    fn to_packet(&self) -> Result<Packet, ProtocolError> {
        let values = [self.pitch, self.yaw, self.roll];
        Ok(double_group(self.device_id, &values)?.with_label(Self::LABEL))
    }
}

impl DomainPacket for GyroDataPacket {
    const KIND: PacketKind = PacketKind::Combined;
    const LABEL: i8 = RobotLabel::GyroData.as_i8();

    fn from_packet(packet: &Packet) -> Option<Self> {
        if !Self::accepts(packet) {
            return None;
        }
        let [pitch, yaw, roll] = doubles(packet)?;
        Some(Self::new(packet.device_id(), pitch, yaw, roll))
    }
}

/// Color sensor channels, as `[r, g, b, a]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorSensorDataPacket {
    pub device_id: u8,
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl ColorSensorDataPacket {
    pub fn new(device_id: u8, r: f64, g: f64, b: f64, a: f64) -> Self {
        Self {
            device_id,
            r,
            g,
            b,
            a,
        }
    }
}

impl ToPacket for ColorSensorDataPacket {
    fn to_packet(&self) -> Result<Packet, ProtocolError> {
        let values = [self.r, self.g, self.b, self.a];
        Ok(double_group(self.device_id, &values)?.with_label(Self::LABEL))
    }
}

impl DomainPacket for ColorSensorDataPacket {
    const KIND: PacketKind = PacketKind::Combined;
    const LABEL: i8 = RobotLabel::ColorSensorData.as_i8();

    fn from_packet(packet: &Packet) -> Option<Self> {
        if !Self::accepts(packet) {
            return None;
        }
        let [r, g, b, a] = doubles(packet)?;
        Some(Self::new(packet.device_id(), r, g, b, a))
    }
}
