//! Commands the master sends to devices.

use tclink_protocol::{DomainPacket, Packet, PacketKind, ProtocolError, ToPacket};

use crate::ids::RobotLabel;

device_value_packet! {
    /// Enables or disables PWM output on a servo controller.
    PwmEnablePacket { enable: bool },
    kind: Boolean,
    label: PwmEnable,
    build: boolean,
    read: as_bool,
}

device_value_packet! {
    /// Power for a continuous-rotation servo, `-1.0..=1.0`.
    ContinuousServoPowerPacket { power: f64 },
    kind: Double,
    label: ContinuousServoPower,
    build: double,
    read: as_double,
}

device_value_packet! {
    /// Motor power, `-1.0..=1.0`.
    MotorPowerPacket { power: f64 },
    kind: Double,
    label: MotorPower,
    build: double,
    read: as_double,
}

device_value_packet! {
    /// Target servo position in degrees.
    ServoPositionPacket { degree: f64 },
    kind: Double,
    label: ServoPosition,
    build: double,
    read: as_double,
}

device_value_packet! {
    /// Switches a color sensor's LED.
    ColorSensorLedPacket { enable: bool },
    kind: Boolean,
    label: ColorSensorLed,
    build: boolean,
    read: as_bool,
}

/// Resets a device (encoder position, motor mode). Carried as `Byte(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceResetPacket {
    pub device_id: u8,
}

impl DeviceResetPacket {
    pub fn new(device_id: u8) -> Self {
        Self { device_id }
    }
}

impl ToPacket for DeviceResetPacket {
    fn to_packet(&self) -> Result<Packet, ProtocolError> {
        Ok(Packet::byte(self.device_id, 0).with_label(Self::LABEL))
    }
}

impl DomainPacket for DeviceResetPacket {
    const KIND: PacketKind = PacketKind::Byte;
    const LABEL: i8 = RobotLabel::DeviceReset.as_i8();

    fn from_packet(packet: &Packet) -> Option<Self> {
        Self::accepts(packet).then(|| Self::new(packet.device_id()))
    }
}
