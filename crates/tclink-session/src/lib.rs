//! Session layer for tclink.
//!
//! A [`Session`] binds together everything one peer needs:
//!
//! 1. **Discovery**: broadcast packets in and out, presence announcements
//! 2. **Connection**: a request/reply channel to the opposite peer, with
//!    the [`ConnectionState`] machine tracking it
//! 3. **Dispatch**: decoded packets go through the conversion registry to
//!    packet listeners; unrecognized primitives go to raw-packet listeners
//!
//! # How it fits in the stack
//!
//! ```text
//! Application (above)  ← registers listeners, calls send / broadcast
//!     ↕
//! Session Layer (this crate)  ← worker pool, state machine, dispatch
//!     ↕
//! Protocol Layer / Transport Layer (below)  ← codec, registry, sockets
//! ```

mod config;
mod error;
mod listeners;
mod pipeline;
mod session;
mod state;

pub use config::SessionConfig;
pub use error::SessionError;
pub use listeners::{ListenerId, PacketListener, RawPacketListener, ReplyHandler};
pub use session::Session;
pub use state::ConnectionState;
