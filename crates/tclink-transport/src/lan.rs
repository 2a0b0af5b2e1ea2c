//! LAN transport: UDP discovery plus WebSocket connections.
//!
//! ## Discovery datagrams
//!
//! Every datagram on the discovery socket has the same envelope:
//!
//! ```text
//! magic:u8(0x54) tag:u8 nameLen:u8 name[nameLen] body
//!
//! tag 0  packet    body = encoded packet
//! tag 1  announce  body = connection port, u16 big-endian
//! tag 2  ask       body = name of the peer that should announce
//! ```
//!
//! Announcements fill a `name → address` table, which is what
//! [`LanTransport::connect`] dials. Asks let a peer that joined late
//! request an announcement instead of waiting for one.
//!
//! ## Connections
//!
//! Connections are WebSocket streams over TCP; each binary message is one
//! frame. The dialing side sends its name as a single text message right
//! after the handshake so the accepting side knows who it is talking to.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::{Connection, ConnectionId, Datagram, Transport, TransportError};

/// Port the discovery socket binds to by default.
pub const DEFAULT_DISCOVERY_PORT: u16 = 30108;

const MAGIC: u8 = b'T';
const TAG_PACKET: u8 = 0;
const TAG_ANNOUNCE: u8 = 1;
const TAG_ASK: u8 = 2;

/// Largest datagram accepted on the discovery socket.
const MAX_DATAGRAM: usize = 64 * 1024;

type WsStream = WebSocketStream<TcpStream>;

// ---------------------------------------------------------------------------
// LanConfig
// ---------------------------------------------------------------------------

/// Socket addresses used by a [`LanTransport`].
///
/// All fields have defaults, so a partial config file is enough:
///
/// ```rust
/// use tclink_transport::LanConfig;
///
/// let config: LanConfig =
///     serde_json::from_str(r#"{ "connection_bind": "0.0.0.0:4000" }"#).unwrap();
/// assert_eq!(config.connection_bind.port(), 4000);
/// assert_eq!(config.discovery_bind.port(), 30108);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanConfig {
    /// Where the discovery socket listens.
    pub discovery_bind: SocketAddr,
    /// Where broadcast, announce and ask datagrams are sent.
    pub broadcast_targets: Vec<SocketAddr>,
    /// Where the connection listener binds. Port 0 picks a free port.
    pub connection_bind: SocketAddr,
    /// How long an accepted socket has to finish the WebSocket handshake
    /// and send its name.
    pub handshake_timeout_ms: u64,
}

impl LanConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Default for LanConfig {
    fn default() -> Self {
        Self {
            discovery_bind: SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::UNSPECIFIED,
                DEFAULT_DISCOVERY_PORT,
            )),
            broadcast_targets: vec![SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::BROADCAST,
                DEFAULT_DISCOVERY_PORT,
            ))],
            connection_bind: SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::UNSPECIFIED,
                0,
            )),
            handshake_timeout_ms: 5_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Discovery envelope
// ---------------------------------------------------------------------------

/// A parsed discovery datagram.
#[derive(Debug, PartialEq, Eq)]
enum Discovery<'a> {
    Packet { sender: &'a str, body: &'a [u8] },
    Announce { sender: &'a str, port: u16 },
    Ask { sender: &'a str, target: &'a str },
}

fn envelope(tag: u8, name: &str, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(3 + name.len() + body.len());
    out.extend_from_slice(&[MAGIC, tag, name.len() as u8]);
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(body);
    out
}

/// Parses a discovery datagram. `None` for anything foreign or malformed.
fn parse_discovery(data: &[u8]) -> Option<Discovery<'_>> {
    let (&[magic, tag, name_len], rest) = data.split_first_chunk::<3>()?;
    if magic != MAGIC {
        return None;
    }
    let (name, body) = rest.split_at_checked(usize::from(name_len))?;
    let sender = std::str::from_utf8(name).ok()?;
    match tag {
        TAG_PACKET => Some(Discovery::Packet { sender, body }),
        TAG_ANNOUNCE => {
            let port = u16::from_be_bytes(body.try_into().ok()?);
            Some(Discovery::Announce { sender, port })
        }
        TAG_ASK => {
            let target = std::str::from_utf8(body).ok()?;
            Some(Discovery::Ask { sender, target })
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// LanTransport
// ---------------------------------------------------------------------------

/// A [`Transport`] over UDP discovery and WebSocket connections.
pub struct LanTransport {
    name: String,
    config: LanConfig,
    socket: UdpSocket,
    listener: TcpListener,
    connection_port: u16,
    peers: RwLock<HashMap<String, SocketAddr>>,
    closed: AtomicBool,
}

impl LanTransport {
    /// Binds the discovery socket and the connection listener.
    ///
    /// # Errors
    /// - [`TransportError::NameTooLong`] if `name` exceeds 255 bytes.
    /// - [`TransportError::Bind`] if either socket cannot be bound.
    pub async fn bind(
        name: impl Into<String>,
        config: LanConfig,
    ) -> Result<Self, TransportError> {
        let name = name.into();
        if name.len() > usize::from(u8::MAX) {
            return Err(TransportError::NameTooLong(name.len()));
        }

        let socket = UdpSocket::bind(config.discovery_bind)
            .await
            .map_err(TransportError::Bind)?;
        socket.set_broadcast(true).map_err(TransportError::Bind)?;
        let listener = TcpListener::bind(config.connection_bind)
            .await
            .map_err(TransportError::Bind)?;
        let connection_port =
            listener.local_addr().map_err(TransportError::Bind)?.port();

        tracing::info!(
            %name,
            discovery = %config.discovery_bind,
            connection_port,
            "LAN transport listening"
        );

        Ok(Self {
            name,
            config,
            socket,
            listener,
            connection_port,
            peers: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// The address the discovery socket is bound to.
    pub fn discovery_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::Bind)
    }

    /// The port peers dial to open a connection.
    pub fn connection_port(&self) -> u16 {
        self.connection_port
    }

    pub fn config(&self) -> &LanConfig {
        &self.config
    }

    /// Connection address of `peer`, if it has announced itself.
    pub fn peer_addr(&self, peer: &str) -> Option<SocketAddr> {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(peer)
            .copied()
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Shutdown);
        }
        Ok(())
    }

    async fn send_to_targets(&self, datagram: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;
        let mut last_error = None;
        let mut delivered = false;
        for target in &self.config.broadcast_targets {
            match self.socket.send_to(datagram, *target).await {
                Ok(_) => delivered = true,
                Err(e) => {
                    tracing::debug!(%target, error = %e, "discovery send failed");
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) if !delivered => Err(TransportError::SendFailed(e)),
            _ => Ok(()),
        }
    }

    fn remember(&self, peer: &str, addr: SocketAddr) {
        let previous = self
            .peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(peer.to_owned(), addr);
        if previous != Some(addr) {
            tracing::debug!(%peer, %addr, "peer discovered");
        }
    }
}

impl Transport for LanTransport {
    type Connection = LanConnection;

    fn name(&self) -> &str {
        &self.name
    }

    async fn broadcast(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.send_to_targets(&envelope(TAG_PACKET, &self.name, payload))
            .await
    }

    async fn recv_broadcast(&self) -> Result<Datagram, TransportError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            self.ensure_open()?;
            let (len, source) = self
                .socket
                .recv_from(&mut buf)
                .await
                .map_err(TransportError::ReceiveFailed)?;

            let Some(discovery) = parse_discovery(&buf[..len]) else {
                tracing::trace!(%source, len, "ignoring foreign datagram");
                continue;
            };
            match discovery {
                Discovery::Packet { sender, .. }
                | Discovery::Announce { sender, .. }
                | Discovery::Ask { sender, .. }
                    if sender == self.name =>
                {
                    continue;
                }
                Discovery::Packet { sender, body } => {
                    return Ok(Datagram {
                        sender: sender.to_owned(),
                        payload: body.to_vec(),
                    });
                }
                Discovery::Announce { sender, port } => {
                    self.remember(sender, SocketAddr::new(source.ip(), port));
                }
                Discovery::Ask { sender, target } => {
                    if target == self.name {
                        tracing::trace!(%sender, "answering ask");
                        if let Err(e) = self.announce().await {
                            tracing::debug!(error = %e, "announce failed");
                        }
                    }
                }
            }
        }
    }

    async fn announce(&self) -> Result<(), TransportError> {
        let port = self.connection_port.to_be_bytes();
        self.send_to_targets(&envelope(TAG_ANNOUNCE, &self.name, &port))
            .await
    }

    async fn ask(&self, peer: &str) -> Result<(), TransportError> {
        self.send_to_targets(&envelope(TAG_ASK, &self.name, peer.as_bytes()))
            .await
    }

    fn knows(&self, peer: &str) -> bool {
        self.peer_addr(peer).is_some()
    }

    async fn connect(&self, peer: &str) -> Result<LanConnection, TransportError> {
        self.ensure_open()?;
        let addr = self
            .peer_addr(peer)
            .ok_or_else(|| TransportError::UnknownPeer(peer.to_owned()))?;
        let connect_failed = |source| TransportError::ConnectFailed {
            peer: peer.to_owned(),
            source,
        };

        let stream = TcpStream::connect(addr).await.map_err(connect_failed)?;
        let (mut ws, _) = tokio_tungstenite::client_async(format!("ws://{addr}/"), stream)
            .await
            .map_err(|e| connect_failed(ws_io_error(std::io::ErrorKind::ConnectionRefused, e)))?;
        ws.send(Message::text(self.name.clone()))
            .await
            .map_err(|e| connect_failed(ws_io_error(std::io::ErrorKind::BrokenPipe, e)))?;

        let connection = LanConnection::new(peer.to_owned(), ws);
        tracing::debug!(id = %connection.id, %peer, %addr, "connection opened");
        Ok(connection)
    }

    async fn accept(&self) -> Result<LanConnection, TransportError> {
        self.ensure_open()?;
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let timeout = self.config.handshake_timeout();
        let (peer, ws) = tokio::time::timeout(timeout, handshake(stream, addr))
            .await
            .map_err(|_| {
                TransportError::Handshake(format!(
                    "no handshake from {addr} within {timeout:?}"
                ))
            })??;

        let connection = LanConnection::new(peer, ws);
        tracing::debug!(id = %connection.id, peer = %connection.peer, %addr, "accepted connection");
        Ok(connection)
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!(name = %self.name, "LAN transport shut down");
        }
        Ok(())
    }
}

/// Upgrades an accepted socket and reads the dialing peer's name.
async fn handshake(
    stream: TcpStream,
    addr: SocketAddr,
) -> Result<(String, WsStream), TransportError> {
    let mut ws = tokio_tungstenite::accept_async(stream).await.map_err(|e| {
        TransportError::AcceptFailed(ws_io_error(
            std::io::ErrorKind::ConnectionRefused,
            e,
        ))
    })?;

    match ws.next().await {
        Some(Ok(Message::Text(name))) => Ok((name.as_str().to_owned(), ws)),
        other => Err(TransportError::Handshake(format!(
            "expected peer name from {addr}, got {other:?}"
        ))),
    }
}

fn ws_io_error(
    kind: std::io::ErrorKind,
    error: tokio_tungstenite::tungstenite::Error,
) -> std::io::Error {
    std::io::Error::new(kind, error)
}

// ---------------------------------------------------------------------------
// LanConnection
// ---------------------------------------------------------------------------

/// One WebSocket connection to a named peer.
///
/// The stream is split so a pending `recv` never blocks a `send`.
pub struct LanConnection {
    id: ConnectionId,
    peer: String,
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
}

impl LanConnection {
    fn new(peer: String, ws: WsStream) -> Self {
        let (sink, stream) = ws.split();
        Self {
            id: ConnectionId::next(),
            peer,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }
}

impl Connection for LanConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer(&self) -> &str {
        &self.peer
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let msg = Message::Binary(data.to_vec().into());
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(ws_io_error(std::io::ErrorKind::BrokenPipe, e))
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.to_vec())),
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(ws_io_error(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.sink.lock().await.close().await.map_err(|e| {
            TransportError::SendFailed(ws_io_error(std::io::ErrorKind::BrokenPipe, e))
        })
    }
}
