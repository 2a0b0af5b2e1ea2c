//! The packet data model.
//!
//! A [`Packet`] is the unit that travels on the wire. Every packet has the
//! same three-byte header (`kind`, `device_id`, `label`) followed by a
//! payload whose shape depends on the kind:
//!
//! ```text
//! Packet := kind:u8 deviceId:u8 label:i8 payload
//! ```
//!
//! Seven kinds are primitive (a byte, a double, a string, ...). The eighth,
//! [`PacketKind::Combined`], holds an ordered list of child packets, which
//! makes the model recursive. Domain messages such as "motor power" or
//! "gamepad state" are all built from these eight shapes plus a `label`
//! that tells them apart.
//!
//! Packets are immutable values. The only way to build one is through the
//! constructors below, which refuse anything the wire format cannot carry
//! (strings over 127 bytes, more than 255 children, children with a
//! foreign device id).

use std::fmt;

use crate::ProtocolError;

/// Label value meaning "no domain sub-type".
pub const NO_LABEL: i8 = -1;

/// Reserved 2-byte frame announcing that the sender is closing.
///
/// No valid packet is two bytes long (the header alone is three) and
/// `0xFF` is not a valid kind, so the sentinel can never be mistaken for
/// a packet.
pub const SHUTDOWN_SENTINEL: [u8; 2] = [0xFF, 0xFF];

/// Longest string payload, in UTF-8 bytes.
pub const MAX_STRING_LEN: usize = 127;

/// Largest number of children a combined packet may hold.
pub const MAX_CHILDREN: usize = 255;

// ---------------------------------------------------------------------------
// PacketKind
// ---------------------------------------------------------------------------

/// The eight payload kinds, with their wire discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PacketKind {
    Byte = 0,
    Double = 1,
    Int = 2,
    Boolean = 3,
    String = 4,
    Long = 5,
    ByteArray = 6,
    Combined = 7,
}

impl PacketKind {
    /// Every kind, in discriminant order.
    pub const ALL: [PacketKind; 8] = [
        PacketKind::Byte,
        PacketKind::Double,
        PacketKind::Int,
        PacketKind::Boolean,
        PacketKind::String,
        PacketKind::Long,
        PacketKind::ByteArray,
        PacketKind::Combined,
    ];

    /// Parses a wire discriminant. Returns `None` for unknown values.
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }

    /// Returns the wire discriminant.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns the discriminant as an index, for per-kind tables.
    pub fn index(self) -> usize {
        usize::from(self.as_u8())
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketKind::Byte => "Byte",
            PacketKind::Double => "Double",
            PacketKind::Int => "Int",
            PacketKind::Boolean => "Boolean",
            PacketKind::String => "String",
            PacketKind::Long => "Long",
            PacketKind::ByteArray => "ByteArray",
            PacketKind::Combined => "Combined",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// The kind-dependent part of a packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Byte(u8),
    Double(f64),
    Int(i32),
    Boolean(bool),
    String(String),
    Long(i64),
    ByteArray(Vec<u8>),
    /// Ordered children, all sharing the parent's device id.
    Combined(Vec<Packet>),
}

impl Payload {
    /// Returns the kind this payload is encoded as.
    pub fn kind(&self) -> PacketKind {
        match self {
            Payload::Byte(_) => PacketKind::Byte,
            Payload::Double(_) => PacketKind::Double,
            Payload::Int(_) => PacketKind::Int,
            Payload::Boolean(_) => PacketKind::Boolean,
            Payload::String(_) => PacketKind::String,
            Payload::Long(_) => PacketKind::Long,
            Payload::ByteArray(_) => PacketKind::ByteArray,
            Payload::Combined(_) => PacketKind::Combined,
        }
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// A typed, labelled packet addressed to a device.
///
/// Fields are private so every packet in existence satisfies the wire
/// constraints. Build packets with the per-kind constructors and attach a
/// label with [`with_label`](Self::with_label):
///
/// ```rust
/// use tclink_protocol::{Packet, PacketKind};
///
/// let power = Packet::double(3, -0.2).with_label(3);
/// assert_eq!(power.kind(), PacketKind::Double);
/// assert_eq!(power.as_double(), Some(-0.2));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    device_id: u8,
    label: i8,
    payload: Payload,
}

impl Packet {
    /// Builds a packet from its parts, checking every wire constraint.
    pub fn new(
        device_id: u8,
        label: i8,
        payload: Payload,
    ) -> Result<Self, ProtocolError> {
        match &payload {
            Payload::String(value) => check_string(value)?,
            Payload::Combined(children) => {
                check_children(device_id, children)?
            }
            _ => {}
        }
        Ok(Self {
            device_id,
            label,
            payload,
        })
    }

    /// Infallible constructor for kinds with no size constraint.
    fn primitive(device_id: u8, payload: Payload) -> Self {
        Self {
            device_id,
            label: NO_LABEL,
            payload,
        }
    }

    pub fn byte(device_id: u8, value: u8) -> Self {
        Self::primitive(device_id, Payload::Byte(value))
    }

    pub fn double(device_id: u8, value: f64) -> Self {
        Self::primitive(device_id, Payload::Double(value))
    }

    pub fn int(device_id: u8, value: i32) -> Self {
        Self::primitive(device_id, Payload::Int(value))
    }

    pub fn boolean(device_id: u8, value: bool) -> Self {
        Self::primitive(device_id, Payload::Boolean(value))
    }

    pub fn long(device_id: u8, value: i64) -> Self {
        Self::primitive(device_id, Payload::Long(value))
    }

    pub fn byte_array(device_id: u8, value: impl Into<Vec<u8>>) -> Self {
        Self::primitive(device_id, Payload::ByteArray(value.into()))
    }

    /// Builds a string packet.
    ///
    /// # Errors
    /// [`ProtocolError::StringTooLong`] if `value` is over 127 UTF-8 bytes.
    pub fn string(
        device_id: u8,
        value: impl Into<String>,
    ) -> Result<Self, ProtocolError> {
        Self::new(device_id, NO_LABEL, Payload::String(value.into()))
    }

    /// Builds a combined packet from ordered children.
    ///
    /// # Errors
    /// - [`ProtocolError::TooManyChildren`] for more than 255 children.
    /// - [`ProtocolError::DeviceMismatch`] if a child's device id differs
    ///   from `device_id`.
    pub fn combined(
        device_id: u8,
        children: Vec<Packet>,
    ) -> Result<Self, ProtocolError> {
        Self::new(device_id, NO_LABEL, Payload::Combined(children))
    }

    /// Returns the same packet carrying `label`.
    #[must_use]
    pub fn with_label(mut self, label: i8) -> Self {
        self.label = label;
        self
    }

    pub fn kind(&self) -> PacketKind {
        self.payload.kind()
    }

    pub fn device_id(&self) -> u8 {
        self.device_id
    }

    pub fn label(&self) -> i8 {
        self.label
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    pub fn is_combined(&self) -> bool {
        matches!(self.payload, Payload::Combined(_))
    }

    // -- typed accessors -------------------------------------------------

    pub fn as_byte(&self) -> Option<u8> {
        match self.payload {
            Payload::Byte(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self.payload {
            Payload::Double(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self.payload {
            Payload::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.payload {
            Payload::Boolean(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.payload {
            Payload::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self.payload {
            Payload::Long(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::ByteArray(v) => Some(v),
            _ => None,
        }
    }

    /// Direct children of a combined packet; empty for primitives.
    pub fn children(&self) -> &[Packet] {
        match &self.payload {
            Payload::Combined(children) => children,
            _ => &[],
        }
    }

    /// The child at `index`, if this is a combined packet that has one.
    ///
    /// Replaces positional destructuring when decoding domain packets:
    ///
    /// ```rust
    /// use tclink_protocol::Packet;
    ///
    /// let pair = Packet::combined(1, vec![
    ///     Packet::int(1, 42),
    ///     Packet::double(1, 0.5),
    /// ]).unwrap();
    /// assert_eq!(pair.child_at(0).and_then(Packet::as_int), Some(42));
    /// assert!(pair.child_at(2).is_none());
    /// ```
    pub fn child_at(&self, index: usize) -> Option<&Packet> {
        self.children().get(index)
    }

    /// Every non-combined leaf, depth-first, in encoding order.
    pub fn flatten(&self) -> Vec<&Packet> {
        let mut leaves = Vec::new();
        collect_leaves(self, &mut leaves);
        leaves
    }

    /// Number of combined levels: 0 for a primitive, 1 for a combined
    /// packet of primitives, and so on.
    pub fn depth(&self) -> usize {
        match &self.payload {
            Payload::Combined(children) => {
                1 + children.iter().map(Packet::depth).max().unwrap_or(0)
            }
            _ => 0,
        }
    }
}

/// Joins two packets into one combined packet.
///
/// - If `a` is combined, `b` is appended to its children (`a`'s label kept).
/// - Else if `b` is combined, `a` is appended to its children (`b`'s label
///   kept).
/// - Otherwise a new combined packet `[a, b]` is built on `a`'s device id,
///   carrying `a`'s label.
///
/// # Errors
/// Same as [`Packet::combined`]: a device id mismatch or a child count
/// over 255.
pub fn combine(a: Packet, b: Packet) -> Result<Packet, ProtocolError> {
    match (a.payload, b.payload) {
        (Payload::Combined(mut children), other) => {
            children.push(Packet {
                device_id: b.device_id,
                label: b.label,
                payload: other,
            });
            Packet::new(a.device_id, a.label, Payload::Combined(children))
        }
        (first, Payload::Combined(mut children)) => {
            children.push(Packet {
                device_id: a.device_id,
                label: a.label,
                payload: first,
            });
            Packet::new(b.device_id, b.label, Payload::Combined(children))
        }
        (first, second) => {
            let children = vec![
                Packet {
                    device_id: a.device_id,
                    label: a.label,
                    payload: first,
                },
                Packet {
                    device_id: b.device_id,
                    label: b.label,
                    payload: second,
                },
            ];
            Packet::new(a.device_id, a.label, Payload::Combined(children))
        }
    }
}

fn collect_leaves<'a>(packet: &'a Packet, out: &mut Vec<&'a Packet>) {
    match &packet.payload {
        Payload::Combined(children) => {
            for child in children {
                collect_leaves(child, out);
            }
        }
        _ => out.push(packet),
    }
}

pub(crate) fn check_string(value: &str) -> Result<(), ProtocolError> {
    if value.len() > MAX_STRING_LEN {
        return Err(ProtocolError::StringTooLong(value.len()));
    }
    Ok(())
}

pub(crate) fn check_children(
    device_id: u8,
    children: &[Packet],
) -> Result<(), ProtocolError> {
    if children.len() > MAX_CHILDREN {
        return Err(ProtocolError::TooManyChildren(children.len()));
    }
    if let Some(child) = children.iter().find(|c| c.device_id != device_id) {
        return Err(ProtocolError::DeviceMismatch {
            parent: device_id,
            child: child.device_id,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[id: {}, label: {}, data: ",
            self.kind(),
            self.device_id,
            self.label
        )?;
        match &self.payload {
            Payload::Byte(v) => write!(f, "{v}")?,
            Payload::Double(v) => write!(f, "{v}")?,
            Payload::Int(v) => write!(f, "{v}")?,
            Payload::Boolean(v) => write!(f, "{v}")?,
            Payload::String(v) => write!(f, "{v:?}")?,
            Payload::Long(v) => write!(f, "{v}")?,
            Payload::ByteArray(v) => write!(f, "{v:?}")?,
            Payload::Combined(children) => {
                f.write_str("[")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str("]")?;
            }
        }
        f.write_str("]")
    }
}
