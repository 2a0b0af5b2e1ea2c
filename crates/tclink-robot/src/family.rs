//! The [`RobotPacket`] sum type and its conversion registry.

use tclink_protocol::{ConversionRegistry, DomainPacket, Packet, ProtocolError, ToPacket};

use crate::ids::{RobotLabel, ENVIRONMENT};
use crate::{
    ColorSensorDataPacket, ColorSensorLedPacket, ContinuousServoPowerPacket,
    DeviceDescriptionPacket, DeviceResetPacket, EncoderDataPacket,
    GamepadDataPacket, GyroDataPacket, MotorPowerPacket, OpModeInfoPacket,
    OperationPeriodPacket, PwmEnablePacket, ServoPositionPacket,
    TelemetryClearPacket, TelemetryDataPacket, TouchSensorDataPacket,
    VoltageDataPacket,
};

/// Any packet of the robot family.
#[derive(Debug, Clone, PartialEq)]
pub enum RobotPacket {
    PwmEnable(PwmEnablePacket),
    ContinuousServoPower(ContinuousServoPowerPacket),
    EncoderData(EncoderDataPacket),
    MotorPower(MotorPowerPacket),
    ServoPosition(ServoPositionPacket),
    DeviceReset(DeviceResetPacket),
    GamepadData(GamepadDataPacket),
    VoltageData(VoltageDataPacket),
    TelemetryData(TelemetryDataPacket),
    DeviceDescription(DeviceDescriptionPacket),
    TelemetryClear(TelemetryClearPacket),
    OpModeInfo(OpModeInfoPacket),
    OperationPeriod(OperationPeriodPacket),
    TouchSensorData(TouchSensorDataPacket),
    GyroData(GyroDataPacket),
    ColorSensorData(ColorSensorDataPacket),
    ColorSensorLed(ColorSensorLedPacket),
}

/// Generates `From<Inner> for RobotPacket` for each variant.
macro_rules! robot_packet_from {
    ($($variant:ident($inner:ty)),* $(,)?) => {
        $(
            impl From<$inner> for RobotPacket {
                fn from(packet: $inner) -> Self {
                    RobotPacket::$variant(packet)
                }
            }
        )*
    };
}

robot_packet_from! {
    PwmEnable(PwmEnablePacket),
    ContinuousServoPower(ContinuousServoPowerPacket),
    EncoderData(EncoderDataPacket),
    MotorPower(MotorPowerPacket),
    ServoPosition(ServoPositionPacket),
    DeviceReset(DeviceResetPacket),
    GamepadData(GamepadDataPacket),
    VoltageData(VoltageDataPacket),
    TelemetryData(TelemetryDataPacket),
    DeviceDescription(DeviceDescriptionPacket),
    TelemetryClear(TelemetryClearPacket),
    OpModeInfo(OpModeInfoPacket),
    OperationPeriod(OperationPeriodPacket),
    TouchSensorData(TouchSensorDataPacket),
    GyroData(GyroDataPacket),
    ColorSensorData(ColorSensorDataPacket),
    ColorSensorLed(ColorSensorLedPacket),
}

impl RobotPacket {
    /// The label this packet travels with.
    pub fn label(&self) -> RobotLabel {
        match self {
            RobotPacket::PwmEnable(_) => RobotLabel::PwmEnable,
            RobotPacket::ContinuousServoPower(_) => RobotLabel::ContinuousServoPower,
            RobotPacket::EncoderData(_) => RobotLabel::EncoderData,
            RobotPacket::MotorPower(_) => RobotLabel::MotorPower,
            RobotPacket::ServoPosition(_) => RobotLabel::ServoPosition,
            RobotPacket::DeviceReset(_) => RobotLabel::DeviceReset,
            RobotPacket::GamepadData(_) => RobotLabel::GamepadData,
            RobotPacket::VoltageData(_) => RobotLabel::VoltageData,
            RobotPacket::TelemetryData(_) => RobotLabel::TelemetryData,
            RobotPacket::DeviceDescription(_) => RobotLabel::DeviceDescription,
            RobotPacket::TelemetryClear(_) => RobotLabel::TelemetryClear,
            RobotPacket::OpModeInfo(_) => RobotLabel::OpModeInfo,
            RobotPacket::OperationPeriod(_) => RobotLabel::OperationPeriod,
            RobotPacket::TouchSensorData(_) => RobotLabel::TouchSensorData,
            RobotPacket::GyroData(_) => RobotLabel::GyroData,
            RobotPacket::ColorSensorData(_) => RobotLabel::ColorSensorData,
            RobotPacket::ColorSensorLed(_) => RobotLabel::ColorSensorLed,
        }
    }

    /// The device id the packet is addressed to on the wire.
    ///
    /// Environment messages report [`ENVIRONMENT`], including
    /// [`DeviceDescriptionPacket`], whose described id lives in its
    /// payload.
    pub fn device_id(&self) -> u8 {
        match self {
            RobotPacket::PwmEnable(p) => p.device_id,
            RobotPacket::ContinuousServoPower(p) => p.device_id,
            RobotPacket::EncoderData(p) => p.device_id,
            RobotPacket::MotorPower(p) => p.device_id,
            RobotPacket::ServoPosition(p) => p.device_id,
            RobotPacket::DeviceReset(p) => p.device_id,
            RobotPacket::GamepadData(p) => p.device_id,
            RobotPacket::TouchSensorData(p) => p.device_id,
            RobotPacket::GyroData(p) => p.device_id,
            RobotPacket::ColorSensorData(p) => p.device_id,
            RobotPacket::ColorSensorLed(p) => p.device_id,
            RobotPacket::VoltageData(_)
            | RobotPacket::TelemetryData(_)
            | RobotPacket::DeviceDescription(_)
            | RobotPacket::TelemetryClear(_)
            | RobotPacket::OpModeInfo(_)
            | RobotPacket::OperationPeriod(_) => ENVIRONMENT,
        }
    }

    fn inner(&self) -> &dyn ToPacket {
        match self {
            RobotPacket::PwmEnable(p) => p,
            RobotPacket::ContinuousServoPower(p) => p,
            RobotPacket::EncoderData(p) => p,
            RobotPacket::MotorPower(p) => p,
            RobotPacket::ServoPosition(p) => p,
            RobotPacket::DeviceReset(p) => p,
            RobotPacket::GamepadData(p) => p,
            RobotPacket::VoltageData(p) => p,
            RobotPacket::TelemetryData(p) => p,
            RobotPacket::DeviceDescription(p) => p,
            RobotPacket::TelemetryClear(p) => p,
            RobotPacket::OpModeInfo(p) => p,
            RobotPacket::OperationPeriod(p) => p,
            RobotPacket::TouchSensorData(p) => p,
            RobotPacket::GyroData(p) => p,
            RobotPacket::ColorSensorData(p) => p,
            RobotPacket::ColorSensorLed(p) => p,
        }
    }
}

impl ToPacket for RobotPacket {
    fn to_packet(&self) -> Result<Packet, ProtocolError> {
        self.inner().to_packet()
    }
}

/// Registers `P`, lifting it into [`RobotPacket`] through its `From` impl.
fn register<P>(registry: ConversionRegistry<RobotPacket>) -> ConversionRegistry<RobotPacket>
where
    P: DomainPacket + Into<RobotPacket> + 'static,
{
    registry.with_packet(|packet: P| packet.into())
}

/// Builds the registry for every robot packet.
///
/// Pure: call it once and share the result (the session keeps it behind
/// an `Arc`).
pub fn build_registry() -> ConversionRegistry<RobotPacket> {
    let registry = ConversionRegistry::new();
    let registry = register::<PwmEnablePacket>(registry);
    let registry = register::<ContinuousServoPowerPacket>(registry);
    let registry = register::<EncoderDataPacket>(registry);
    let registry = register::<MotorPowerPacket>(registry);
    let registry = register::<ServoPositionPacket>(registry);
    let registry = register::<DeviceResetPacket>(registry);
    let registry = register::<GamepadDataPacket>(registry);
    let registry = register::<VoltageDataPacket>(registry);
    let registry = register::<TelemetryDataPacket>(registry);
    let registry = register::<DeviceDescriptionPacket>(registry);
    let registry = register::<TelemetryClearPacket>(registry);
    let registry = register::<OpModeInfoPacket>(registry);
    let registry = register::<OperationPeriodPacket>(registry);
    let registry = register::<TouchSensorDataPacket>(registry);
    let registry = register::<GyroDataPacket>(registry);
    let registry = register::<ColorSensorDataPacket>(registry);
    register::<ColorSensorLedPacket>(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tclink_protocol::PacketKind;

    #[test]
    fn test_build_registry_has_no_conflicts() {
        let registry = build_registry();
        assert!(registry.conflicts().is_empty());
        assert_eq!(registry.len(), RobotLabel::ALL.len());
        assert_eq!(registry.converter_count(PacketKind::Combined), 6);
        assert_eq!(registry.converter_count(PacketKind::Boolean), 3);
    }

    #[test]
    fn test_wrap_pwm_enable_boolean() {
        let packet = Packet::boolean(1, true).with_label(0);
        assert_eq!(
            build_registry().wrap(&packet),
            Some(RobotPacket::PwmEnable(PwmEnablePacket::new(1, true)))
        );
    }

    #[test]
    fn test_wrap_unlabelled_primitive_is_miss() {
        assert_eq!(build_registry().wrap(&Packet::boolean(1, true)), None);
        assert_eq!(build_registry().wrap(&Packet::long(1, 8331)), None);
    }

    #[test]
    fn test_to_packet_then_wrap_returns_same_variant() {
        let registry = build_registry();
        let packets: Vec<RobotPacket> = vec![
            MotorPowerPacket::new(3, -0.2).into(),
            DeviceDescriptionPacket::new(0, "foo").unwrap().into(),
            TelemetryClearPacket.into(),
            GamepadDataPacket::new(125).into(),
        ];
        for packet in packets {
            let wire = packet.to_packet().unwrap();
            assert_eq!(wire.label(), packet.label().as_i8());
            assert_eq!(wire.device_id(), packet.device_id());
            assert_eq!(registry.wrap(&wire), Some(packet));
        }
    }
}
