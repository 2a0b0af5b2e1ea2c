//! Gamepad state.
//!
//! The master samples its gamepads every loop and sends the full state as
//! one combined packet of six groups:
//!
//! ```text
//! GamepadData (label 6)
//! ├── front bumpers  [right, left]
//! ├── buttons        [a, b, x, y]
//! ├── d-pad          [up, down, left, right]
//! ├── left stick     [x, y, button]
//! ├── right stick    [x, y, button]
//! └── triggers       [left, right]
//! ```
//!
//! The bumper group is encoded right bumper first, then left bumper.

use tclink_protocol::{DomainPacket, Packet, PacketKind, ProtocolError, ToPacket};

use crate::ids::RobotLabel;
use crate::{bool_group, bools, children_exact, doubles};

/// Complete state of one gamepad.
///
/// Sticks and triggers are `-1.0..=1.0` / `0.0..=1.0` analog values; all
/// other fields are pressed/released.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GamepadDataPacket {
    pub device_id: u8,
    pub left_bumper: bool,
    pub right_bumper: bool,
    pub a_button: bool,
    pub b_button: bool,
    pub x_button: bool,
    pub y_button: bool,
    pub dpad_up: bool,
    pub dpad_down: bool,
    pub dpad_left: bool,
    pub dpad_right: bool,
    pub left_stick_x: f64,
    pub left_stick_y: f64,
    pub left_stick_button: bool,
    pub right_stick_x: f64,
    pub right_stick_y: f64,
    pub right_stick_button: bool,
    pub left_trigger: f64,
    pub right_trigger: f64,
}

impl GamepadDataPacket {
    /// A gamepad at rest: nothing pressed, sticks centred.
    pub fn new(device_id: u8) -> Self {
        Self {
            device_id,
            ..Self::default()
        }
    }
}

/// Builds `[x, y, button]` for one stick.
fn stick_group(device_id: u8, x: f64, y: f64, button: bool) -> Result<Packet, ProtocolError> {
    Packet::combined(
        device_id,
        vec![
            Packet::double(device_id, x),
            Packet::double(device_id, y),
            Packet::boolean(device_id, button),
        ],
    )
}

/// Reads `[x, y, button]` for one stick.
fn read_stick(group: &Packet) -> Option<(f64, f64, bool)> {
    let [x, y, button] = children_exact(group, 3)? else {
        return None;
    };
    Some((x.as_double()?, y.as_double()?, button.as_bool()?))
}

impl ToPacket for GamepadDataPacket {
    fn to_packet(&self) -> Result<Packet, ProtocolError> {
        let id = self.device_id;
        let groups = vec![
            bool_group(id, &[self.right_bumper, self.left_bumper])?,
            bool_group(
                id,
                &[self.a_button, self.b_button, self.x_button, self.y_button],
            )?,
            bool_group(
                id,
                &[self.dpad_up, self.dpad_down, self.dpad_left, self.dpad_right],
            )?,
            stick_group(id, self.left_stick_x, self.left_stick_y, self.left_stick_button)?,
            stick_group(
                id,
                self.right_stick_x,
                self.right_stick_y,
                self.right_stick_button,
            )?,
            Packet::combined(
                id,
                vec![
                    Packet::double(id, self.left_trigger),
                    Packet::double(id, self.right_trigger),
                ],
            )?,
        ];
        Ok(Packet::combined(id, groups)?.with_label(Self::LABEL))
    }
}

impl DomainPacket for GamepadDataPacket {
    const KIND: PacketKind = PacketKind::Combined;
    const LABEL: i8 = RobotLabel::GamepadData.as_i8();

    fn from_packet(packet: &Packet) -> Option<Self> {
        if !Self::accepts(packet) {
            return None;
        }
        let [front, buttons, dpad, left_stick, right_stick, triggers] =
            children_exact(packet, 6)?
        else {
            return None;
        };

        let [right_bumper, left_bumper] = bools(front)?;
        let [a_button, b_button, x_button, y_button] = bools(buttons)?;
        let [dpad_up, dpad_down, dpad_left, dpad_right] = bools(dpad)?;
        let (left_stick_x, left_stick_y, left_stick_button) = read_stick(left_stick)?;
        let (right_stick_x, right_stick_y, right_stick_button) =
            read_stick(right_stick)?;
        let [left_trigger, right_trigger] = doubles(triggers)?;

        Some(Self {
            device_id: packet.device_id(),
            left_bumper,
            right_bumper,
            a_button,
            b_button,
            x_button,
            y_button,
            dpad_up,
            dpad_down,
            dpad_left,
            dpad_right,
            left_stick_x,
            left_stick_y,
            left_stick_button,
            right_stick_x,
            right_stick_y,
            right_stick_button,
            left_trigger,
            right_trigger,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::GAMEPAD_MASTER;

    fn sample() -> GamepadDataPacket {
        GamepadDataPacket {
            a_button: true,
            left_trigger: 0.1,
            right_trigger: 0.2,
            left_stick_y: -1.0,
            ..GamepadDataPacket::new(GAMEPAD_MASTER)
        }
    }

    #[test]
    fn test_to_packet_has_six_groups() {
        let packet = sample().to_packet().unwrap();
        assert_eq!(packet.label(), 6);
        assert_eq!(packet.children().len(), 6);
        assert_eq!(packet.depth(), 2);
        // 2 + 4 + 4 + 3 + 3 + 2 leaves
        assert_eq!(packet.flatten().len(), 18);
    }

    #[test]
    fn test_from_packet_reads_triggers_and_a_button() {
        let packet = sample().to_packet().unwrap();
        let decoded = GamepadDataPacket::from_packet(&packet).unwrap();
        assert_eq!(decoded.left_trigger, 0.1);
        assert_eq!(decoded.right_trigger, 0.2);
        assert!(decoded.a_button);
        assert!(!decoded.b_button);
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_front_group_lists_right_bumper_first() {
        let pad = GamepadDataPacket {
            right_bumper: true,
            ..GamepadDataPacket::new(1)
        };
        let packet = pad.to_packet().unwrap();
        let front = packet.child_at(0).unwrap();
        assert_eq!(front.child_at(0).and_then(Packet::as_bool), Some(true));
        assert_eq!(front.child_at(1).and_then(Packet::as_bool), Some(false));
        assert!(GamepadDataPacket::from_packet(&packet).unwrap().right_bumper);
    }

    #[test]
    fn test_from_packet_missing_group_is_none() {
        let full = sample().to_packet().unwrap();
        let five: Vec<Packet> = full.children()[..5].to_vec();
        let truncated = Packet::combined(GAMEPAD_MASTER, five)
            .unwrap()
            .with_label(6);
        assert_eq!(GamepadDataPacket::from_packet(&truncated), None);
    }
}
