//! Transport abstraction layer for tclink.
//!
//! A session talks to its peers through two channels:
//!
//! - a **discovery channel**: connectionless datagrams anyone on the
//!   network receives (broadcast packets, presence announcements, "where
//!   are you?" questions);
//! - a **connection channel**: an ordered, reliable stream to one named
//!   peer, used for request/reply exchanges.
//!
//! [`Transport`] and [`Connection`] abstract over both, so the session
//! layer is the same whether peers live on a LAN ([`LanTransport`]) or in
//! the same process ([`MemoryNetwork`]).
//!
//! # Feature Flags
//!
//! - `lan` (default): UDP discovery plus WebSocket connections via
//!   `tokio-tungstenite`

mod error;
#[cfg(feature = "lan")]
mod lan;
mod memory;

pub use error::TransportError;
#[cfg(feature = "lan")]
pub use lan::{LanConfig, LanConnection, LanTransport, DEFAULT_DISCOVERY_PORT};
pub use memory::{MemoryConnection, MemoryNetwork, MemoryTransport};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }

    /// Allocates a process-unique id.
    pub(crate) fn next() -> Self {
        static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A payload received on the discovery channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Name of the sending peer.
    pub sender: String,
    /// The raw frame, usually an encoded packet.
    pub payload: Vec<u8>,
}

/// A named endpoint on a network of peers.
///
/// Every method takes `&self`: the session runs its discovery and accept
/// loops concurrently on one shared transport. The returned futures are
/// `Send` so they can run on any worker thread.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;

    /// This endpoint's name, as peers see it.
    fn name(&self) -> &str;

    /// Sends `payload` to every peer on the discovery channel.
    fn broadcast(
        &self,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Waits for the next broadcast payload from another peer.
    ///
    /// Discovery traffic (announcements, questions) is handled internally
    /// and never surfaces here; neither do this endpoint's own broadcasts.
    fn recv_broadcast(
        &self,
    ) -> impl Future<Output = Result<Datagram, TransportError>> + Send;

    /// Tells every peer how to reach this endpoint.
    fn announce(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Asks `peer` to announce itself.
    fn ask(
        &self,
        peer: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Whether `peer`'s connection address is known.
    fn knows(&self, peer: &str) -> bool;

    /// Opens a connection to a known peer.
    fn connect(
        &self,
        peer: &str,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;

    /// Waits for and accepts the next inbound connection.
    fn accept(
        &self,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;

    /// Stops the transport. Pending and later calls fail with
    /// [`TransportError::Shutdown`].
    fn shutdown(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// A single connection that can send and receive frames.
pub trait Connection: Send + Sync + 'static {
    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Name of the peer on the other end.
    fn peer(&self) -> &str;

    /// Sends one frame to the remote peer.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId::new(7).to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_next_is_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b.into_inner() > a.into_inner());
    }
}
