//! Codec trait and the binary wire codec.
//!
//! A "codec" (coder/decoder) converts between [`Packet`]s and raw bytes.
//! The session layer only talks to the [`Codec`] trait, so a different
//! framing can be swapped in without touching dispatch code.
//!
//! [`BinaryCodec`] is the wire format every peer speaks. Its one knob is
//! the maximum nesting depth of combined packets, which bounds the
//! recursion (and stack use) when decoding untrusted input.

use crate::packet::{check_children, check_string, Packet, PacketKind, Payload};
use crate::zigzag::{read_varint, write_varint, zigzag_decode, zigzag_encode};
use crate::ProtocolError;

/// Default ceiling on combined-packet nesting.
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Converts packets to bytes and back.
///
/// `Send + Sync + 'static` because the session shares one codec between
/// all of its worker tasks.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a packet into a frame.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] if the packet cannot be represented,
    /// e.g. a child encodes to more than 255 bytes.
    fn encode(&self, packet: &Packet) -> Result<Vec<u8>, ProtocolError>;

    /// Parses a complete frame.
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] format error for anything that is not
    /// exactly one valid packet.
    fn decode(&self, data: &[u8]) -> Result<Packet, ProtocolError>;
}

// ---------------------------------------------------------------------------
// BinaryCodec
// ---------------------------------------------------------------------------

/// The compact binary [`Codec`].
///
/// ```rust
/// use tclink_protocol::{BinaryCodec, Codec, Packet};
///
/// let codec = BinaryCodec::default();
/// let packet = Packet::long(1, 8331);
///
/// let bytes = codec.encode(&packet).unwrap();
/// assert_eq!(codec.decode(&bytes).unwrap(), packet);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryCodec {
    max_depth: usize,
}

impl Default for BinaryCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl BinaryCodec {
    /// Creates a codec accepting at most `max_depth` nested combined levels.
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn encode_into(
        &self,
        packet: &Packet,
        out: &mut Vec<u8>,
        depth: usize,
    ) -> Result<(), ProtocolError> {
        out.push(packet.kind().as_u8());
        out.push(packet.device_id());
        out.push(packet.label() as u8);

        match packet.payload() {
            Payload::Byte(value) => out.push(*value),
            Payload::Boolean(value) => out.push(u8::from(*value)),
            Payload::String(value) => {
                check_string(value)?;
                out.push(value.len() as u8);
                out.extend_from_slice(value.as_bytes());
            }
            Payload::Int(value) => {
                write_varint(out, zigzag_encode(i64::from(*value)))
            }
            Payload::Long(value) => write_varint(out, zigzag_encode(*value)),
            Payload::Double(value) => {
                write_varint(out, zigzag_encode(value.to_bits() as i64))
            }
            Payload::ByteArray(value) => out.extend_from_slice(value),
            Payload::Combined(children) => {
                if depth >= self.max_depth {
                    return Err(ProtocolError::DepthExceeded(self.max_depth));
                }
                check_children(packet.device_id(), children)?;

                // Children are encoded first so their lengths are known
                // before the length table is written.
                let mut bodies = Vec::with_capacity(children.len());
                for (index, child) in children.iter().enumerate() {
                    let mut body = Vec::new();
                    self.encode_into(child, &mut body, depth + 1)?;
                    if body.len() > usize::from(u8::MAX) {
                        return Err(ProtocolError::ChildTooLarge {
                            index,
                            len: body.len(),
                        });
                    }
                    bodies.push(body);
                }

                out.push(children.len() as u8);
                out.extend(bodies.iter().map(|body| body.len() as u8));
                for body in &bodies {
                    out.extend_from_slice(body);
                }
            }
        }
        Ok(())
    }

    fn decode_unit(
        &self,
        data: &[u8],
        depth: usize,
    ) -> Result<Packet, ProtocolError> {
        let mut reader = Reader::new(data);

        let kind_byte = reader.u8()?;
        let kind = PacketKind::from_u8(kind_byte)
            .ok_or(ProtocolError::UnknownKind(kind_byte))?;
        let device_id = reader.u8()?;
        let label = reader.u8()? as i8;

        let payload = match kind {
            PacketKind::Byte => Payload::Byte(reader.u8()?),
            PacketKind::Boolean => Payload::Boolean(reader.u8()? != 0),
            PacketKind::String => {
                let len = reader.u8()?;
                if len & 0x80 != 0 {
                    return Err(ProtocolError::InvalidStringLength(len));
                }
                let bytes = reader.take(usize::from(len))?;
                let value = std::str::from_utf8(bytes)
                    .map_err(|_| ProtocolError::InvalidUtf8)?;
                Payload::String(value.to_owned())
            }
            PacketKind::Int => {
                let value = zigzag_decode(reader.varint()?);
                let value = i32::try_from(value)
                    .map_err(|_| ProtocolError::IntOutOfRange(value))?;
                Payload::Int(value)
            }
            PacketKind::Long => Payload::Long(zigzag_decode(reader.varint()?)),
            PacketKind::Double => {
                let bits = zigzag_decode(reader.varint()?) as u64;
                Payload::Double(f64::from_bits(bits))
            }
            PacketKind::ByteArray => Payload::ByteArray(reader.rest().to_vec()),
            PacketKind::Combined => {
                if depth >= self.max_depth {
                    return Err(ProtocolError::DepthExceeded(self.max_depth));
                }
                let count = usize::from(reader.u8()?);
                let lengths = reader.take(count)?;
                let mut children = Vec::with_capacity(count);
                for &len in lengths {
                    let slice = reader.take(usize::from(len))?;
                    let child = self.decode_unit(slice, depth + 1)?;
                    if child.device_id() != device_id {
                        return Err(ProtocolError::DeviceMismatch {
                            parent: device_id,
                            child: child.device_id(),
                        });
                    }
                    children.push(child);
                }
                Payload::Combined(children)
            }
        };

        reader.finish()?;
        Packet::new(device_id, label, payload)
    }
}

impl Codec for BinaryCodec {
    fn encode(&self, packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
        let mut out = Vec::new();
        self.encode_into(packet, &mut out, 0)?;
        Ok(out)
    }

    fn decode(&self, data: &[u8]) -> Result<Packet, ProtocolError> {
        self.decode_unit(data, 0)
    }
}

/// Encodes with the default [`BinaryCodec`].
pub fn encode(packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
    BinaryCodec::default().encode(packet)
}

/// Decodes with the default [`BinaryCodec`].
pub fn decode(data: &[u8]) -> Result<Packet, ProtocolError> {
    BinaryCodec::default().decode(data)
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Bounds-checked cursor over one decode unit.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if n > self.remaining() {
            return Err(ProtocolError::Truncated {
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn varint(&mut self) -> Result<u64, ProtocolError> {
        let (value, used) = read_varint(&self.data[self.pos..])?;
        self.pos += used;
        Ok(value)
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }

    fn finish(&self) -> Result<(), ProtocolError> {
        match self.remaining() {
            0 => Ok(()),
            extra => Err(ProtocolError::TrailingBytes(extra)),
        }
    }
}
