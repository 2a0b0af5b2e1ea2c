/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding a discovery socket or connection listener failed.
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    /// Sending data (datagram or connection frame) failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Accepting an inbound connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Opening a connection to a known peer failed.
    #[error("connect to {peer} failed: {source}")]
    ConnectFailed {
        peer: String,
        #[source]
        source: std::io::Error,
    },

    /// The peer's address has not been discovered yet.
    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    /// The remote side did not open the connection the expected way.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The name is already taken on this network.
    #[error("name already in use: {0}")]
    NameInUse(String),

    /// Peer names travel in a length byte and must fit 255 bytes.
    #[error("peer name of {0} bytes exceeds 255")]
    NameTooLong(usize),

    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}
