//! In-process transport.
//!
//! A [`MemoryNetwork`] is a shared registry of named members. Joining it
//! yields a [`MemoryTransport`]; broadcasts reach every other member and
//! connections are pairs of unbounded channels. Nothing touches the OS,
//! which makes it the transport of choice for tests and for running a
//! master and a device bridge inside one process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::{Connection, ConnectionId, Datagram, Transport, TransportError};

struct Member {
    broadcasts: UnboundedSender<Datagram>,
    incoming: UnboundedSender<MemoryConnection>,
    announced: bool,
}

/// A shared in-process network. Cloning yields a handle to the same
/// network.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    members: Arc<Mutex<HashMap<String, Member>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a member called `name`.
    ///
    /// # Errors
    /// [`TransportError::NameInUse`] if another live member has the name.
    pub fn join(&self, name: impl Into<String>) -> Result<MemoryTransport, TransportError> {
        let name = name.into();
        let mut members = self.lock();
        if members.contains_key(&name) {
            return Err(TransportError::NameInUse(name));
        }

        let (broadcast_tx, broadcast_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        members.insert(
            name.clone(),
            Member {
                broadcasts: broadcast_tx,
                incoming: incoming_tx,
                announced: false,
            },
        );
        tracing::debug!(%name, "joined memory network");

        Ok(MemoryTransport {
            name,
            network: self.clone(),
            broadcasts: tokio::sync::Mutex::new(broadcast_rx),
            incoming: tokio::sync::Mutex::new(incoming_rx),
            closed: AtomicBool::new(false),
        })
    }

    /// Names of the current members, sorted.
    pub fn members(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Member>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn leave(&self, name: &str) {
        if self.lock().remove(name).is_some() {
            tracing::debug!(%name, "left memory network");
        }
    }
}

/// One member of a [`MemoryNetwork`].
pub struct MemoryTransport {
    name: String,
    network: MemoryNetwork,
    broadcasts: tokio::sync::Mutex<UnboundedReceiver<Datagram>>,
    incoming: tokio::sync::Mutex<UnboundedReceiver<MemoryConnection>>,
    closed: AtomicBool,
}

impl MemoryTransport {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Shutdown);
        }
        Ok(())
    }
}

impl Transport for MemoryTransport {
    type Connection = MemoryConnection;

    fn name(&self) -> &str {
        &self.name
    }

    async fn broadcast(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;
        let members = self.network.lock();
        for (name, member) in members.iter().filter(|(n, _)| **n != self.name) {
            let datagram = Datagram {
                sender: self.name.clone(),
                payload: payload.to_vec(),
            };
            if member.broadcasts.send(datagram).is_err() {
                tracing::trace!(%name, "member stopped receiving broadcasts");
            }
        }
        Ok(())
    }

    async fn recv_broadcast(&self) -> Result<Datagram, TransportError> {
        self.ensure_open()?;
        self.broadcasts
            .lock()
            .await
            .recv()
            .await
            .ok_or(TransportError::Shutdown)
    }

    async fn announce(&self) -> Result<(), TransportError> {
        self.ensure_open()?;
        if let Some(member) = self.network.lock().get_mut(&self.name) {
            member.announced = true;
        }
        Ok(())
    }

    async fn ask(&self, _peer: &str) -> Result<(), TransportError> {
        // Members are visible as soon as they announce; nothing to ask.
        self.ensure_open()
    }

    fn knows(&self, peer: &str) -> bool {
        self.network
            .lock()
            .get(peer)
            .is_some_and(|member| member.announced)
    }

    async fn connect(&self, peer: &str) -> Result<MemoryConnection, TransportError> {
        self.ensure_open()?;
        let members = self.network.lock();
        let member = members
            .get(peer)
            .filter(|member| member.announced)
            .ok_or_else(|| TransportError::UnknownPeer(peer.to_owned()))?;

        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();
        let server_side = MemoryConnection::new(&self.name, to_client, from_client);
        let client_side = MemoryConnection::new(peer, to_server, from_server);

        member.incoming.send(server_side).map_err(|_| {
            TransportError::ConnectionClosed(format!("{peer} is not accepting"))
        })?;
        tracing::debug!(id = %client_side.id, %peer, "memory connection opened");
        Ok(client_side)
    }

    async fn accept(&self) -> Result<MemoryConnection, TransportError> {
        self.ensure_open()?;
        self.incoming
            .lock()
            .await
            .recv()
            .await
            .ok_or(TransportError::Shutdown)
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.network.leave(&self.name);
        }
        Ok(())
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        if !*self.closed.get_mut() {
            self.network.leave(&self.name);
        }
    }
}

/// One end of an in-process connection.
pub struct MemoryConnection {
    id: ConnectionId,
    peer: String,
    tx: Mutex<Option<UnboundedSender<Vec<u8>>>>,
    rx: tokio::sync::Mutex<UnboundedReceiver<Vec<u8>>>,
}

impl MemoryConnection {
    fn new(
        peer: &str,
        tx: UnboundedSender<Vec<u8>>,
        rx: UnboundedReceiver<Vec<u8>>,
    ) -> Self {
        Self {
            id: ConnectionId::next(),
            peer: peer.to_owned(),
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
        }
    }
}

impl Connection for MemoryConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer(&self) -> &str {
        &self.peer
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let closed = || TransportError::ConnectionClosed(self.peer.clone());
        tx.as_ref()
            .ok_or_else(closed)?
            .send(data.to_vec())
            .map_err(|_| closed())
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.rx.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_duplicate_name_fails() {
        let network = MemoryNetwork::new();
        let _a = network.join("a").unwrap();
        assert!(matches!(network.join("a"), Err(TransportError::NameInUse(_))));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_others_not_self() {
        let network = MemoryNetwork::new();
        let a = network.join("a").unwrap();
        let b = network.join("b").unwrap();

        a.broadcast(b"ping").await.unwrap();
        let datagram = b.recv_broadcast().await.unwrap();
        assert_eq!(datagram.sender, "a");
        assert_eq!(datagram.payload, b"ping");

        let own = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            a.recv_broadcast(),
        )
        .await;
        assert!(own.is_err(), "sender must not hear itself");
    }

    #[tokio::test]
    async fn test_connect_requires_announce() {
        let network = MemoryNetwork::new();
        let a = network.join("a").unwrap();
        let b = network.join("b").unwrap();

        assert!(!a.knows("b"));
        assert!(matches!(a.connect("b").await, Err(TransportError::UnknownPeer(_))));

        b.announce().await.unwrap();
        assert!(a.knows("b"));
        assert!(a.connect("b").await.is_ok());
    }

    #[tokio::test]
    async fn test_connection_exchanges_frames_both_ways() {
        let network = MemoryNetwork::new();
        let a = network.join("a").unwrap();
        let b = network.join("b").unwrap();
        b.announce().await.unwrap();

        let client = a.connect("b").await.unwrap();
        let server = b.accept().await.unwrap();
        assert_eq!(client.peer(), "b");
        assert_eq!(server.peer(), "a");

        client.send(b"request").await.unwrap();
        assert_eq!(server.recv().await.unwrap(), Some(b"request".to_vec()));
        server.send(b"reply").await.unwrap();
        assert_eq!(client.recv().await.unwrap(), Some(b"reply".to_vec()));
    }

    #[tokio::test]
    async fn test_close_ends_peer_recv() {
        let network = MemoryNetwork::new();
        let a = network.join("a").unwrap();
        let b = network.join("b").unwrap();
        b.announce().await.unwrap();

        let client = a.connect("b").await.unwrap();
        let server = b.accept().await.unwrap();
        client.close().await.unwrap();

        assert_eq!(server.recv().await.unwrap(), None);
        assert!(client.send(b"late").await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_leaves_network() {
        let network = MemoryNetwork::new();
        let a = network.join("a").unwrap();
        a.shutdown().await.unwrap();

        assert!(network.members().is_empty());
        assert!(matches!(a.recv_broadcast().await, Err(TransportError::Shutdown)));
        assert!(network.join("a").is_ok());
    }
}
