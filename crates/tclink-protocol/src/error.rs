//! Error types for the protocol layer.
//!
//! Every failure in here is either a *construction* error (a packet that
//! would violate the wire format is refused before it exists) or a
//! *format* error (a received buffer is not a valid packet). Conversion
//! misses are not errors at all; see [`ConversionRegistry::wrap`].
//!
//! [`ConversionRegistry::wrap`]: crate::ConversionRegistry::wrap

/// Errors that can occur while building, encoding or decoding packets.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    /// The kind byte does not name one of the eight payload kinds.
    #[error("unknown packet kind {0}")]
    UnknownKind(u8),

    /// The buffer ended before a complete field could be read.
    #[error("truncated packet: needed {needed} byte(s), {available} available")]
    Truncated { needed: usize, available: usize },

    /// A string payload exceeds the 127-byte wire limit.
    #[error("string of {0} bytes exceeds the 127-byte limit")]
    StringTooLong(usize),

    /// A received string length byte has its top bit set.
    #[error("invalid string length byte {0:#04x}")]
    InvalidStringLength(u8),

    /// A received string payload is not valid UTF-8.
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,

    /// A combined packet holds more than 255 children.
    #[error("combined packet has {0} children, at most 255 allowed")]
    TooManyChildren(usize),

    /// A child of a combined packet encodes to more than 255 bytes.
    #[error("child {index} encodes to {len} bytes, at most 255 allowed")]
    ChildTooLarge { index: usize, len: usize },

    /// A child's device id differs from its combined parent's.
    #[error("child device id {child} does not match parent device id {parent}")]
    DeviceMismatch { parent: u8, child: u8 },

    /// Combined packets are nested deeper than the codec allows.
    #[error("combined nesting exceeds the maximum depth of {0}")]
    DepthExceeded(usize),

    /// A varint is longer than 10 bytes or overflows 64 bits.
    #[error("varint overflows 64 bits")]
    VarintOverflow,

    /// A decoded `Int` payload does not fit into 32 bits.
    #[error("int payload {0} is out of the 32-bit range")]
    IntOutOfRange(i64),

    /// Bytes remain after a complete packet was decoded.
    #[error("{0} trailing byte(s) after packet")]
    TrailingBytes(usize),

    /// The packet is well-formed but violates a domain rule.
    ///
    /// Used by protocol families for logical errors, e.g. a telemetry
    /// caption containing the reserved `$$` separator.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
