//! Reserved device ids and the label catalog.

use std::fmt;

/// Device id for messages about the robot as a whole (voltage, telemetry,
/// op-mode lifecycle).
pub const ENVIRONMENT: u8 = 126;
/// Device id of the master's primary gamepad.
pub const GAMEPAD_MASTER: u8 = 125;
/// Device id of the master's secondary gamepad.
pub const GAMEPAD_HELPER: u8 = 124;

/// Lowest id reserved for built-in roles. Ids `122..=126` are reserved.
pub const FIRST_RESERVED: u8 = 122;

/// Whether `device_id` falls into the reserved built-in range.
pub fn is_reserved(device_id: u8) -> bool {
    (FIRST_RESERVED..=ENVIRONMENT).contains(&device_id)
}

/// Labels of the robot packet family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum RobotLabel {
    PwmEnable = 0,
    ContinuousServoPower = 1,
    EncoderData = 2,
    MotorPower = 3,
    ServoPosition = 4,
    DeviceReset = 5,
    GamepadData = 6,
    VoltageData = 7,
    TelemetryData = 8,
    DeviceDescription = 9,
    TelemetryClear = 10,
    OpModeInfo = 11,
    OperationPeriod = 12,
    TouchSensorData = 13,
    GyroData = 14,
    ColorSensorData = 15,
    ColorSensorLed = 16,
}

impl RobotLabel {
    pub const ALL: [RobotLabel; 17] = [
        RobotLabel::PwmEnable,
        RobotLabel::ContinuousServoPower,
        RobotLabel::EncoderData,
        RobotLabel::MotorPower,
        RobotLabel::ServoPosition,
        RobotLabel::DeviceReset,
        RobotLabel::GamepadData,
        RobotLabel::VoltageData,
        RobotLabel::TelemetryData,
        RobotLabel::DeviceDescription,
        RobotLabel::TelemetryClear,
        RobotLabel::OpModeInfo,
        RobotLabel::OperationPeriod,
        RobotLabel::TouchSensorData,
        RobotLabel::GyroData,
        RobotLabel::ColorSensorData,
        RobotLabel::ColorSensorLed,
    ];

    pub const fn as_i8(self) -> i8 {
        self as i8
    }

    pub fn from_i8(label: i8) -> Option<Self> {
        usize::try_from(label)
            .ok()
            .and_then(|index| Self::ALL.get(index))
            .copied()
    }
}

impl fmt::Display for RobotLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
