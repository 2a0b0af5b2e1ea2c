//! # tclink
//!
//! Compact binary control link between a robot master controller and its
//! device bridge.
//!
//! The link is layered:
//!
//! - [`protocol`]: packets, the ZigZag varint codec, conversion registries
//! - [`robot`]: the robot packet family (motors, servos, sensors, gamepads,
//!   telemetry)
//! - [`transport`]: LAN discovery plus WebSocket connections, or an
//!   in-process network
//! - [`session`]: listeners, connection state, request/reply
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tclink::prelude::*;
//!
//! let link = LinkBuilder::new("master").opposite("slave").build()?;
//! link.add_packet_listener(Arc::new(|packet: &RobotPacket| {
//!     println!("{} from device {}", packet.label(), packet.device_id());
//! }));
//! link.connect()?;
//! link.send(&MotorPowerPacket::new(3, -0.2))?;
//! link.close();
//! # Ok::<(), TclinkError>(())
//! ```

mod error;
mod link;

pub use error::TclinkError;
pub use link::{LinkBuilder, LocalRobotLink, RobotLink};

pub use tclink_protocol as protocol;
pub use tclink_robot as robot;
pub use tclink_session as session;
pub use tclink_transport as transport;

/// Everything a typical link user needs.
pub mod prelude {
    pub use crate::{LinkBuilder, LocalRobotLink, RobotLink, TclinkError};
    pub use tclink_protocol::{
        combine, BinaryCodec, Codec, ConversionRegistry, DomainPacket, Packet, PacketKind,
        Payload, ToPacket,
    };
    pub use tclink_robot::ids::{ENVIRONMENT, GAMEPAD_HELPER, GAMEPAD_MASTER};
    pub use tclink_robot::{
        build_registry, ColorSensorDataPacket, ColorSensorLedPacket, ContinuousServoPowerPacket,
        DeviceDescriptionPacket, DeviceResetPacket, EncoderDataPacket, GamepadDataPacket,
        GyroDataPacket, MotorPowerPacket, OpModeInfoPacket, OpModeState, OperationPeriodPacket,
        PwmEnablePacket, RobotLabel, RobotPacket, ServoPositionPacket, TelemetryClearPacket,
        TelemetryDataPacket, TouchSensorDataPacket, VoltageDataPacket,
    };
    pub use tclink_session::{
        ConnectionState, ListenerId, PacketListener, RawPacketListener, ReplyHandler, Session,
        SessionConfig,
    };
    pub use tclink_transport::{LanConfig, MemoryNetwork};
}
