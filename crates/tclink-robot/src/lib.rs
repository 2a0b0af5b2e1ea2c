//! The robot packet family.
//!
//! Every message a master controller and a device bridge exchange is one
//! of the structs in this crate: actuator commands, sensor readings,
//! gamepad state and a handful of "environment" messages (telemetry,
//! op-mode lifecycle) addressed to the reserved [`ids::ENVIRONMENT`] id.
//!
//! Each struct implements [`DomainPacket`](tclink_protocol::DomainPacket)
//! and converts to and from a primitive [`Packet`]. [`build_registry`]
//! wires all of them into one
//! [`ConversionRegistry`](tclink_protocol::ConversionRegistry) producing
//! [`RobotPacket`] values.
//!
//! ```rust
//! use tclink_protocol::Packet;
//! use tclink_robot::{build_registry, MotorPowerPacket, RobotPacket};
//!
//! let registry = build_registry();
//! let wire = Packet::double(3, -0.2).with_label(3);
//!
//! assert_eq!(
//!     registry.wrap(&wire),
//!     Some(RobotPacket::MotorPower(MotorPowerPacket::new(3, -0.2))),
//! );
//! ```

use tclink_protocol::Packet;

/// Declares a packet carrying one primitive value for one device.
///
/// Expands to the struct, a `new` constructor and the `ToPacket` /
/// `DomainPacket` impls.
macro_rules! device_value_packet {
    (
        $(#[$meta:meta])*
        $name:ident { $field:ident: $ty:ty },
        kind: $kind:ident,
        label: $label:ident,
        build: $build:ident,
        read: $read:ident $(,)?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq)]
        pub struct $name {
            pub device_id: u8,
            pub $field: $ty,
        }

        impl $name {
            pub fn new(device_id: u8, $field: $ty) -> Self {
                Self { device_id, $field }
            }
        }

        impl tclink_protocol::ToPacket for $name {
            fn to_packet(
                &self,
            ) -> Result<tclink_protocol::Packet, tclink_protocol::ProtocolError> {
                Ok(tclink_protocol::Packet::$build(self.device_id, self.$field)
                    .with_label(<Self as tclink_protocol::DomainPacket>::LABEL))
            }
        }

        impl tclink_protocol::DomainPacket for $name {
            const KIND: tclink_protocol::PacketKind =
                tclink_protocol::PacketKind::$kind;
            const LABEL: i8 = $crate::ids::RobotLabel::$label.as_i8();

            fn from_packet(packet: &tclink_protocol::Packet) -> Option<Self> {
                if !<Self as tclink_protocol::DomainPacket>::accepts(packet) {
                    return None;
                }
                Some(Self::new(packet.device_id(), packet.$read()?))
            }
        }
    };
}

pub mod ids;

mod actuators;
mod environment;
mod family;
mod gamepad;
mod sensors;

pub use actuators::{
    ColorSensorLedPacket, ContinuousServoPowerPacket, DeviceResetPacket,
    MotorPowerPacket, PwmEnablePacket, ServoPositionPacket,
};
pub use environment::{
    DeviceDescriptionPacket, OpModeInfoPacket, OpModeState,
    OperationPeriodPacket, TelemetryClearPacket, TelemetryDataPacket,
    VoltageDataPacket, TELEMETRY_SEPARATOR,
};
pub use family::{build_registry, RobotPacket};
pub use gamepad::GamepadDataPacket;
pub use ids::RobotLabel;
pub use sensors::{
    ColorSensorDataPacket, EncoderDataPacket, GyroDataPacket,
    TouchSensorDataPacket,
};

// ---------------------------------------------------------------------------
// Shared decoding helpers
// ---------------------------------------------------------------------------

/// The children of `packet` if it is combined with exactly `n` of them.
pub(crate) fn children_exact(packet: &Packet, n: usize) -> Option<&[Packet]> {
    let children = packet.children();
    (packet.is_combined() && children.len() == n).then_some(children)
}

/// Reads `N` double children, in order.
pub(crate) fn doubles<const N: usize>(packet: &Packet) -> Option<[f64; N]> {
    let children = children_exact(packet, N)?;
    let mut values = [0.0; N];
    for (slot, child) in values.iter_mut().zip(children) {
        *slot = child.as_double()?;
    }
    Some(values)
}

/// Reads `N` boolean children, in order.
pub(crate) fn bools<const N: usize>(packet: &Packet) -> Option<[bool; N]> {
    let children = children_exact(packet, N)?;
    let mut values = [false; N];
    for (slot, child) in values.iter_mut().zip(children) {
        *slot = child.as_bool()?;
    }
    Some(values)
}

/// Builds a label-less combined packet of doubles on `device_id`.
pub(crate) fn double_group(
    device_id: u8,
    values: &[f64],
) -> Result<Packet, tclink_protocol::ProtocolError> {
    let children = values
        .iter()
        .map(|&value| Packet::double(device_id, value))
        .collect();
    Packet::combined(device_id, children)
}

/// Builds a label-less combined packet of booleans on `device_id`.
pub(crate) fn bool_group(
    device_id: u8,
    values: &[bool],
) -> Result<Packet, tclink_protocol::ProtocolError> {
    let children = values
        .iter()
        .map(|&value| Packet::boolean(device_id, value))
        .collect();
    Packet::combined(device_id, children)
}
