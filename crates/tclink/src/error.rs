//! Unified error type for tclink.

use tclink_protocol::ProtocolError;
use tclink_session::SessionError;
use tclink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attributes let `?` convert sub-crate errors, so code
/// built on the `tclink` meta-crate handles one error type.
#[derive(Debug, thiserror::Error)]
pub enum TclinkError {
    /// Packet construction or wire format.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Sockets, discovery, connections.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Session state, timeouts, configuration.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl TclinkError {
    /// Whether the error means the session is gone for good.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            TclinkError::Session(SessionError::Closed)
                | TclinkError::Transport(TransportError::Shutdown)
        )
    }
}
