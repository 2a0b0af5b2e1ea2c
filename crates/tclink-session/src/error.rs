//! Error types for the session layer.

use std::time::Duration;

use tclink_protocol::ProtocolError;
use tclink_transport::TransportError;

/// Errors that can occur while driving a session.
///
/// Format errors on *received* frames never surface here: the receive
/// pipeline logs them and moves on to the next frame.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session was closed; no further operations are possible.
    #[error("session is closed")]
    Closed,

    /// `send` needs a live connection to the opposite peer.
    #[error("not connected to the opposite peer")]
    NotConnected,

    /// `connect` needs an opposite peer name.
    #[error("no opposite peer configured")]
    NoOpposite,

    /// The opposite peer could not be reached in time.
    #[error("timed out after {0:?} connecting to the opposite peer")]
    ConnectTimeout(Duration),

    /// `close` was called while `connect` was still waiting.
    #[error("connect cancelled by close")]
    Cancelled,

    /// The opposite peer did not reply in time. The connection is dropped.
    #[error("no reply within {0:?}")]
    ReplyTimeout(Duration),

    /// A [`SessionConfig`](crate::SessionConfig) value is unusable.
    #[error("invalid session config: {0}")]
    InvalidConfig(String),

    /// The worker runtime could not be started.
    #[error("failed to start session runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// An outbound packet could not be built or encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
