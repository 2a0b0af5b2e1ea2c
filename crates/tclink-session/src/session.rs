//! The transport session.
//!
//! A [`Session`] is one peer's end of a master/device link. It owns:
//!
//! - a transport (discovery + connection channels),
//! - a small worker pool (a multi-threaded Tokio runtime) running the
//!   discovery and accept loops,
//! - two listener registries and an optional reply handler,
//! - the connection state toward the "opposite" peer.
//!
//! The public API is synchronous: `broadcast`, `send`, `connect` and
//! `close` hand their work to the worker pool and block until it is done,
//! so they can be called from plain threads, from async code, and from
//! inside listener callbacks.
//!
//! ```text
//!   caller thread              worker pool
//!   ─────────────              ───────────
//!   send(packet) ──spawn──→ exchange ──→ Connection::send / recv
//!        ▲                      │
//!        └────── reply ─────────┘
//!
//!                           discovery loop ──→ pipeline ──→ listeners
//!                           accept loop ──→ serve_connection ──→ reply handler
//! ```

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use rand::Rng;
use tclink_protocol::{
    BinaryCodec, Codec, ConversionRegistry, Packet, ToPacket, SHUTDOWN_SENTINEL,
};
use tclink_transport::{Connection, Datagram, Transport, TransportError};
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use tokio::sync::watch;

use crate::listeners::{
    ListenerId, ListenerSet, PacketListener, RawPacketListener, ReplyHandler,
};
use crate::pipeline::{self, DispatchContext};
use crate::state::{AtomicConnectionState, ConnectionState};
use crate::{SessionConfig, SessionError};

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One peer of a link, producing domain packets of type `D`.
///
/// ## Lifecycle
///
/// ```text
/// open() ──→ [listening] ──connect()──→ [connected] ──close()──→ [closed]
///                 ▲                          │
///                 └── error / peer shutdown ─┘
/// ```
///
/// Dropping a session closes it.
pub struct Session<T: Transport, D: 'static> {
    inner: Arc<Inner<T, D>>,
    handle: Handle,
    runtime: Mutex<Option<Runtime>>,
}

struct Inner<T: Transport, D: 'static> {
    config: SessionConfig,
    transport: T,
    codec: BinaryCodec,
    registry: RwLock<Arc<ConversionRegistry<D>>>,
    packet_listeners: ListenerSet<PacketListener<D>>,
    raw_listeners: ListenerSet<RawPacketListener>,
    reply_handler: RwLock<Option<Arc<ReplyHandler>>>,
    opposite: RwLock<Option<String>>,
    state: AtomicConnectionState,
    /// Outbound connection to the opposite peer. Locked only to read or
    /// swap the slot, never across a reply wait.
    connection: tokio::sync::Mutex<Option<Arc<T::Connection>>>,
    /// Held for one request/reply round trip; replies pair with requests
    /// in order.
    exchange_turn: tokio::sync::Mutex<()>,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl<T: Transport, D: 'static> Session<T, D> {
    /// Starts a session on the transport produced by `transport`.
    ///
    /// The future runs on the session's own worker pool, so transports that
    /// need a Tokio reactor to bind (such as the LAN transport) can be
    /// created here without the caller running a runtime:
    ///
    /// ```rust,no_run
    /// use tclink_session::{Session, SessionConfig};
    /// use tclink_transport::{LanConfig, LanTransport};
    ///
    /// let session = Session::open(
    ///     SessionConfig::default().with_opposite("slave"),
    ///     tclink_robot::build_registry(),
    ///     LanTransport::bind("master", LanConfig::default()),
    /// )?;
    /// session.connect()?;
    /// # Ok::<(), tclink_session::SessionError>(())
    /// ```
    ///
    /// # Errors
    /// - [`SessionError::InvalidConfig`] if `config` does not validate.
    /// - [`SessionError::Runtime`] if the worker pool cannot start.
    /// - [`SessionError::Transport`] if the transport cannot be created.
    pub fn open<F>(
        config: SessionConfig,
        registry: ConversionRegistry<D>,
        transport: F,
    ) -> Result<Self, SessionError>
    where
        F: Future<Output = Result<T, TransportError>> + Send + 'static,
    {
        config.validate()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads())
            .thread_name("tclink-worker")
            .enable_all()
            .build()
            .map_err(SessionError::Runtime)?;
        let handle = runtime.handle().clone();

        let transport = block_on(&handle, transport)
            .and_then(|result| result.map_err(SessionError::from));
        let transport = match transport {
            Ok(transport) => transport,
            Err(e) => {
                runtime.shutdown_background();
                return Err(e);
            }
        };

        let (shutdown, _) = watch::channel(false);
        let inner = Arc::new(Inner {
            codec: BinaryCodec::new(config.max_depth),
            opposite: RwLock::new(config.opposite.clone()),
            config,
            transport,
            registry: RwLock::new(Arc::new(registry)),
            packet_listeners: ListenerSet::default(),
            raw_listeners: ListenerSet::default(),
            reply_handler: RwLock::new(None),
            state: AtomicConnectionState::new(ConnectionState::Disconnected),
            connection: tokio::sync::Mutex::new(None),
            exchange_turn: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
            shutdown,
        });

        for _ in 0..inner.config.discovery_workers {
            handle.spawn(discovery_loop(Arc::clone(&inner), inner.shutdown.subscribe()));
        }
        for _ in 0..inner.config.connection_workers {
            handle.spawn(accept_loop(Arc::clone(&inner), inner.shutdown.subscribe()));
        }

        let session = Self {
            inner,
            handle,
            runtime: Mutex::new(Some(runtime)),
        };

        // Peers that are already connecting learn our address right away.
        let announced = session
            .run(|inner| async move { inner.transport.announce().await })
            .and_then(|result| result.map_err(SessionError::from));
        if let Err(e) = announced {
            tracing::warn!(error = %e, "initial announce failed");
        }

        tracing::info!(
            name = %session.name(),
            opposite = ?session.opposite(),
            workers = session.inner.config.worker_threads(),
            "session opened"
        );
        Ok(session)
    }

    /// This peer's name on the network.
    pub fn name(&self) -> &str {
        self.inner.transport.name()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.load()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// The peer this session connects to, if any.
    pub fn opposite(&self) -> Option<String> {
        self.inner.opposite()
    }

    /// Changes the opposite peer. A live connection to the previous
    /// opposite is dropped.
    ///
    /// # Errors
    /// [`SessionError::Closed`] after [`close`](Self::close).
    pub fn set_opposite(&self, opposite: Option<String>) -> Result<(), SessionError> {
        self.ensure_open()?;
        let changed = {
            let mut current = self
                .inner
                .opposite
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let changed = *current != opposite;
            *current = opposite;
            changed
        };
        if changed {
            self.run(|inner| async move { inner.drop_connection("opposite changed").await })?;
        }
        Ok(())
    }

    // -- connection ------------------------------------------------------

    /// Connects to the opposite peer, waiting at most
    /// [`SessionConfig::connect_timeout`].
    ///
    /// # Errors
    /// See [`connect_within`](Self::connect_within).
    pub fn connect(&self) -> Result<(), SessionError> {
        self.connect_within(self.inner.config.connect_timeout())
    }

    /// Announces this peer, waits for the opposite's address and opens the
    /// connection channel.
    ///
    /// Discovery is retried with exponential backoff plus jitter until
    /// `timeout` elapses. Already being connected is a success.
    ///
    /// # Errors
    /// - [`SessionError::NoOpposite`] if no opposite is configured.
    /// - [`SessionError::ConnectTimeout`] if the peer was not reached.
    /// - [`SessionError::Cancelled`] if the session closed meanwhile.
    /// - [`SessionError::Transport`] if discovery traffic cannot be sent.
    pub fn connect_within(&self, timeout: Duration) -> Result<(), SessionError> {
        self.ensure_open()?;
        let opposite = self.opposite().ok_or(SessionError::NoOpposite)?;
        self.run(move |inner| inner.connect(opposite, timeout))?
    }

    /// Drops the connection to the opposite peer, keeping the session open.
    ///
    /// # Errors
    /// [`SessionError::Closed`] after [`close`](Self::close).
    pub fn disconnect(&self) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.run(|inner| async move { inner.drop_connection("disconnect requested").await })
    }

    // -- outbound traffic ------------------------------------------------

    /// Sends `packet` to the opposite peer over the connection channel and
    /// waits for its reply.
    ///
    /// Returns `Ok(None)` when the peer answered without a payload. A
    /// failed exchange drops the connection (state becomes
    /// [`ConnectionState::Disconnected`]).
    ///
    /// # Errors
    /// - [`SessionError::Closed`] after [`close`](Self::close).
    /// - [`SessionError::NotConnected`] unless connected.
    /// - [`SessionError::Protocol`] if the packet cannot be encoded.
    /// - [`SessionError::ReplyTimeout`] or [`SessionError::Transport`] if
    ///   the exchange fails.
    pub fn send(&self, packet: &impl ToPacket) -> Result<Option<Vec<u8>>, SessionError> {
        self.ensure_open()?;
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        let frame = self.inner.codec.encode(&packet.to_packet()?)?;
        self.run(move |inner| async move { inner.exchange(frame).await })?
    }

    /// Sends `packet` to every peer on the discovery channel.
    ///
    /// # Errors
    /// - [`SessionError::Closed`] after [`close`](Self::close).
    /// - [`SessionError::Protocol`] if the packet cannot be encoded.
    /// - [`SessionError::Transport`] if no datagram could be sent.
    pub fn broadcast(&self, packet: &impl ToPacket) -> Result<(), SessionError> {
        self.ensure_open()?;
        let frame = self.inner.codec.encode(&packet.to_packet()?)?;
        self.run(move |inner| async move { inner.transport.broadcast(&frame).await })??;
        Ok(())
    }

    // -- listeners -------------------------------------------------------

    /// Registers a listener for recognized domain packets.
    ///
    /// Registering the same `Arc` twice returns its existing id.
    pub fn add_packet_listener(&self, listener: Arc<PacketListener<D>>) -> ListenerId {
        self.inner.packet_listeners.add(listener)
    }

    pub fn remove_packet_listener(&self, id: ListenerId) -> bool {
        self.inner.packet_listeners.remove(id)
    }

    /// Registers a listener for primitive packets no converter recognized.
    pub fn add_raw_packet_listener(&self, listener: Arc<RawPacketListener>) -> ListenerId {
        self.inner.raw_listeners.add(listener)
    }

    pub fn remove_raw_packet_listener(&self, id: ListenerId) -> bool {
        self.inner.raw_listeners.remove(id)
    }

    /// Installs the handler answering packets received over inbound
    /// connections. Without one, every request gets an empty reply.
    pub fn set_reply_handler(&self, handler: Arc<ReplyHandler>) {
        *self
            .inner
            .reply_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    pub fn clear_reply_handler(&self) {
        self.inner
            .reply_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Replaces the conversion registry. Frames already being dispatched
    /// finish with the previous one.
    pub fn set_conversion_registry(&self, registry: ConversionRegistry<D>) {
        *self
            .inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(registry);
    }

    pub fn conversion_registry(&self) -> Arc<ConversionRegistry<D>> {
        self.inner.registry()
    }

    // -- shutdown --------------------------------------------------------

    /// Closes the session.
    ///
    /// If connected, the shutdown sentinel is sent to the opposite peer
    /// first. Then the loops stop, the transport shuts down and every
    /// listener is dropped. Calling `close` again does nothing.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let runtime = self
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(runtime) = runtime else {
            return;
        };

        let inner = Arc::clone(&self.inner);
        if let Err(e) = block_on(&self.handle, async move { inner.teardown().await }) {
            tracing::debug!(error = %e, "teardown did not complete");
        }
        runtime.shutdown_background();

        self.inner.packet_listeners.clear();
        self.inner.raw_listeners.clear();
        self.clear_reply_handler();
        tracing::info!(name = %self.name(), "session closed");
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        Ok(())
    }

    /// Runs `task` on the worker pool and waits for its output.
    fn run<F, Fut>(&self, task: F) -> Result<Fut::Output, SessionError>
    where
        F: FnOnce(Arc<Inner<T, D>>) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        self.ensure_open()?;
        block_on(&self.handle, task(Arc::clone(&self.inner)))
    }
}

impl<T: Transport, D: 'static> Drop for Session<T, D> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Spawns `future` on `handle` and blocks the calling thread until it
/// completes.
///
/// Inside a multi-threaded runtime (including the session's own, e.g. from
/// a listener) the wait goes through `block_in_place` so the worker's
/// other tasks keep running.
fn block_on<F>(handle: &Handle, future: F) -> Result<F::Output, SessionError>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let (tx, rx) = std::sync::mpsc::sync_channel(1);
    handle.spawn(async move {
        // The receiver is gone only if the caller stopped waiting.
        let _ = tx.send(future.await);
    });
    let wait = move || rx.recv().map_err(|_| SessionError::Closed);
    match Handle::try_current() {
        Ok(current) if current.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(wait)
        }
        _ => wait(),
    }
}

/// Random extra delay of up to half of `backoff`.
fn jitter(backoff: Duration) -> Duration {
    let cap = u64::try_from(backoff.as_millis() / 2).unwrap_or(u64::MAX);
    Duration::from_millis(rand::rng().random_range(0..=cap))
}

// ---------------------------------------------------------------------------
// Inner: the state shared with the worker tasks
// ---------------------------------------------------------------------------

impl<T: Transport, D: 'static> Inner<T, D> {
    fn name(&self) -> &str {
        self.transport.name()
    }

    fn opposite(&self) -> Option<String> {
        self.opposite
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn registry(&self) -> Arc<ConversionRegistry<D>> {
        Arc::clone(&self.registry.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Whether traffic from `sender` should be processed.
    fn accepts_sender(&self, sender: &str) -> bool {
        match &*self.opposite.read().unwrap_or_else(PoisonError::into_inner) {
            Some(opposite) => opposite == sender,
            None => true,
        }
    }

    /// Decodes and dispatches one frame; malformed frames are logged and
    /// dropped.
    fn handle_frame(&self, sender: &str, frame: &[u8]) -> Option<Packet> {
        let registry = self.registry();
        let ctx = DispatchContext {
            codec: &self.codec,
            registry: &registry,
            packet_listeners: &self.packet_listeners,
            raw_listeners: &self.raw_listeners,
        };
        match pipeline::handle_frame(&ctx, sender, frame) {
            Ok(packet) => Some(packet),
            Err(e) => {
                tracing::warn!(%sender, len = frame.len(), error = %e, "dropping malformed frame");
                None
            }
        }
    }

    async fn handle_broadcast(&self, datagram: Datagram) {
        if !self.accepts_sender(&datagram.sender) {
            tracing::trace!(sender = %datagram.sender, "ignoring broadcast from non-opposite peer");
            return;
        }
        if datagram.payload == SHUTDOWN_SENTINEL {
            self.peer_closed(&datagram.sender).await;
            return;
        }
        self.handle_frame(&datagram.sender, &datagram.payload);
    }

    /// Dispatches a request frame and builds the reply frame.
    fn reply_to(&self, sender: &str, frame: &[u8]) -> Vec<u8> {
        let Some(packet) = self.handle_frame(sender, frame) else {
            return Vec::new();
        };
        let handler = self
            .reply_handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(handler) = handler else {
            return Vec::new();
        };
        match catch_unwind(AssertUnwindSafe(|| handler(&packet))) {
            Ok(reply) => reply.unwrap_or_default(),
            Err(_) => {
                tracing::warn!(%sender, "reply handler panicked; replying empty");
                Vec::new()
            }
        }
    }

    async fn peer_closed(&self, peer: &str) {
        if self.opposite().as_deref() != Some(peer) {
            return;
        }
        tracing::info!(%peer, "opposite peer shut down");
        self.drop_connection("peer shut down").await;
    }

    async fn drop_connection(&self, reason: &str) {
        let connection = self.connection.lock().await.take();
        if let Some(connection) = connection {
            if let Err(e) = connection.close().await {
                tracing::debug!(id = %connection.id(), error = %e, "close failed");
            }
        }
        if self.state.swap(ConnectionState::Disconnected) != ConnectionState::Disconnected {
            tracing::info!(name = %self.name(), reason, "disconnected");
        }
    }

    async fn connect(
        self: Arc<Self>,
        opposite: String,
        timeout: Duration,
    ) -> Result<(), SessionError> {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return Err(SessionError::Cancelled);
        }
        if let Some(existing) = self.connection.lock().await.as_ref() {
            if existing.peer() == opposite {
                return Ok(());
            }
        }

        self.state.swap(ConnectionState::Connecting);
        tracing::info!(name = %self.name(), %opposite, ?timeout, "connecting");

        let outcome = tokio::select! {
            _ = shutdown.changed() => Err(SessionError::Cancelled),
            attempt = tokio::time::timeout(timeout, self.discover(&opposite)) => {
                attempt.unwrap_or(Err(SessionError::ConnectTimeout(timeout)))
            }
        };

        match outcome {
            Ok(connection) => {
                let id = connection.id();
                let previous = self.connection.lock().await.replace(Arc::new(connection));
                if let Some(previous) = previous {
                    // Best effort; the old channel is being replaced.
                    let _ = previous.close().await;
                }
                self.state.swap(ConnectionState::Connected);
                tracing::info!(name = %self.name(), %opposite, %id, "connected");
                Ok(())
            }
            Err(e) => {
                if self.connection.lock().await.is_none() {
                    self.state.swap(ConnectionState::Disconnected);
                }
                tracing::debug!(%opposite, error = %e, "connect failed");
                Err(e)
            }
        }
    }

    /// Announce, ask, dial; repeat with backoff until a connection opens.
    async fn discover(&self, opposite: &str) -> Result<T::Connection, SessionError> {
        let mut backoff = self.config.initial_backoff();
        loop {
            self.transport.announce().await?;
            if self.transport.knows(opposite) {
                match self.transport.connect(opposite).await {
                    Ok(connection) => return Ok(connection),
                    Err(e) => tracing::debug!(%opposite, error = %e, "connect attempt failed"),
                }
            } else {
                self.transport.ask(opposite).await?;
            }
            tokio::time::sleep(backoff + jitter(backoff)).await;
            backoff = (backoff * 2).min(self.config.max_backoff());
        }
    }

    async fn exchange(&self, frame: Vec<u8>) -> Result<Option<Vec<u8>>, SessionError> {
        let mut shutdown = self.shutdown.subscribe();
        let _turn = self.exchange_turn.lock().await;
        let connection = self
            .connection
            .lock()
            .await
            .clone()
            .ok_or(SessionError::NotConnected)?;

        let result = tokio::select! {
            _ = shutdown.changed() => Err(SessionError::Closed),
            result = request(&*connection, &frame, self.config.reply_timeout()) => result,
        };

        if let Err(e) = &result {
            if !matches!(e, SessionError::Closed) {
                tracing::warn!(
                    peer = %connection.peer(),
                    error = %e,
                    "exchange failed; dropping connection"
                );
                self.forget(&connection).await;
            }
        }
        result
    }

    /// Drops `connection` if it is still the current one. A connection
    /// opened since then is left alone.
    async fn forget(&self, connection: &Arc<T::Connection>) {
        let current = {
            let mut slot = self.connection.lock().await;
            if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, connection)) {
                slot.take()
            } else {
                None
            }
        };
        if let Some(current) = current {
            let _ = current.close().await;
            self.state.swap(ConnectionState::Disconnected);
        }
    }

    async fn teardown(&self) {
        self.shutdown.send_replace(true);

        let connection = self.connection.lock().await.take();
        if let Some(connection) = connection {
            if let Err(e) = connection.send(&SHUTDOWN_SENTINEL).await {
                tracing::debug!(error = %e, "could not send shutdown sentinel");
            }
            let _ = connection.close().await;
        }
        self.state.swap(ConnectionState::Disconnected);

        if let Err(e) = self.transport.shutdown().await {
            tracing::debug!(error = %e, "transport shutdown failed");
        }
    }
}

/// One request/reply round trip. An empty reply frame means "no reply".
async fn request<C: Connection>(
    connection: &C,
    frame: &[u8],
    reply_timeout: Duration,
) -> Result<Option<Vec<u8>>, SessionError> {
    connection.send(frame).await?;
    match tokio::time::timeout(reply_timeout, connection.recv()).await {
        Ok(Ok(Some(reply))) => Ok((!reply.is_empty()).then_some(reply)),
        Ok(Ok(None)) => Err(TransportError::ConnectionClosed(connection.peer().to_owned()).into()),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(SessionError::ReplyTimeout(reply_timeout)),
    }
}

// ---------------------------------------------------------------------------
// Worker loops
// ---------------------------------------------------------------------------

async fn discovery_loop<T: Transport, D: 'static>(
    inner: Arc<Inner<T, D>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = shutdown.changed() => break,
            received = inner.transport.recv_broadcast() => match received {
                Ok(datagram) => inner.handle_broadcast(datagram).await,
                Err(TransportError::Shutdown) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "broadcast receive failed");
                    tokio::time::sleep(inner.config.initial_backoff()).await;
                }
            },
        }
    }
    tracing::debug!(name = %inner.name(), "discovery loop stopped");
}

async fn accept_loop<T: Transport, D: 'static>(
    inner: Arc<Inner<T, D>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = inner.transport.accept() => match accepted {
                Ok(connection) if !inner.accepts_sender(connection.peer()) => {
                    tracing::debug!(
                        peer = %connection.peer(),
                        "refusing connection from non-opposite peer"
                    );
                    let _ = connection.close().await;
                }
                Ok(connection) => {
                    let serving = serve_connection(Arc::clone(&inner), connection, shutdown.clone());
                    tokio::spawn(serving);
                }
                Err(TransportError::Shutdown) => break,
                Err(e) => tracing::warn!(error = %e, "accept failed"),
            },
        }
    }
    tracing::debug!(name = %inner.name(), "accept loop stopped");
}

/// Answers requests on one inbound connection until it ends.
async fn serve_connection<T: Transport, D: 'static>(
    inner: Arc<Inner<T, D>>,
    connection: T::Connection,
    mut shutdown: watch::Receiver<bool>,
) {
    let id = connection.id();
    let peer = connection.peer().to_owned();
    tracing::debug!(%id, %peer, "serving connection");

    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => break,
            frame = connection.recv() => frame,
        };
        match frame {
            Ok(Some(frame)) if frame == SHUTDOWN_SENTINEL => {
                inner.peer_closed(&peer).await;
                break;
            }
            Ok(Some(frame)) => {
                let reply = inner.reply_to(&peer, &frame);
                if let Err(e) = connection.send(&reply).await {
                    tracing::debug!(%id, error = %e, "reply failed");
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(%id, error = %e, "connection failed");
                break;
            }
        }
    }

    let _ = connection.close().await;
    tracing::debug!(%id, %peer, "connection finished");
}
