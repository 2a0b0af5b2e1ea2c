//! Connection state toward the opposite peer.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Where a session stands with its opposite peer.
///
/// ```text
///   Disconnected ──(connect)──→ Connecting ──(address found)──→ Connected
///        ↑                           │                              │
///        └────(timeout / cancel)─────┘                              │
///        └───────(I/O error, peer shutdown, close, disconnect)──────┘
/// ```
///
/// Reconnecting is always an explicit `connect()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// No connection channel to the opposite peer.
    Disconnected = 0,
    /// Discovery is looking for the opposite peer.
    Connecting = 1,
    /// A connection channel is open; `send` works.
    Connected = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// A [`ConnectionState`] readable from every worker without locking.
#[derive(Debug)]
pub(crate) struct AtomicConnectionState(AtomicU8);

impl AtomicConnectionState {
    pub(crate) fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Stores `state` and returns the previous one.
    pub(crate) fn swap(&self, state: ConnectionState) -> ConnectionState {
        ConnectionState::from_u8(self.0.swap(state as u8, Ordering::AcqRel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_lowercase() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
    }

    #[test]
    fn test_swap_returns_previous() {
        let state = AtomicConnectionState::new(ConnectionState::Disconnected);
        assert_eq!(
            state.swap(ConnectionState::Connecting),
            ConnectionState::Disconnected
        );
        assert_eq!(state.load(), ConnectionState::Connecting);
    }
}
