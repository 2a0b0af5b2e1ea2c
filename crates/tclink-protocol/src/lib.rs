//! Wire protocol for tclink.
//!
//! This crate defines the "language" a master controller and a device
//! bridge speak:
//!
//! - **Packets** ([`Packet`], [`PacketKind`], [`Payload`]): the eight
//!   payload kinds, including the recursive combined kind.
//! - **Codec** ([`Codec`] trait, [`BinaryCodec`]): the compact binary
//!   framing with ZigZag varints.
//! - **Conversion** ([`ConversionRegistry`], [`DomainPacket`]): how a
//!   protocol family maps `(kind, label)` pairs onto its own types.
//! - **Errors** ([`ProtocolError`]): construction and format errors.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and session
//! (dispatch to listeners). It knows nothing about sockets or peers.
//!
//! ```text
//! Transport (bytes) → Protocol (Packet → domain) → Session (listeners)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod conversion;
mod error;
mod packet;
pub mod zigzag;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{decode, encode, BinaryCodec, Codec, DEFAULT_MAX_DEPTH};
pub use conversion::{ConversionRegistry, DomainPacket, ToPacket};
pub use error::ProtocolError;
pub use packet::{
    combine, Packet, PacketKind, Payload, MAX_CHILDREN, MAX_STRING_LEN,
    NO_LABEL, SHUTDOWN_SENTINEL,
};
