//! Server role -- accepts inbound connections into an address-keyed
//! registry and runs a receive plus keep-alive loop per peer.
//!
//! The accept loop never stops for a single peer's failure. The server
//! does not reconnect to a lost client; the client is expected to
//! reconnect to the server instead.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;

use strand_protocol::{JsonCodec, MessageCodec, ProtocolError};

use crate::config::ServerConfig;
use crate::endpoint::Connection;
use crate::error::NetError;
use crate::events::{EventBus, ServerEvent};
use crate::registry::Registry;

/// A typed-message server over many TCP connections.
pub struct Server<M> {
    shared: Arc<Shared<M>>,
}

struct Shared<M> {
    bind_addr: SocketAddr,
    config: ServerConfig,
    codec: Arc<dyn MessageCodec<M>>,
    registry: Registry,
    events: EventBus<ServerEvent<M>>,
    local_addr: RwLock<Option<SocketAddr>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: broadcast::Sender<()>,
    // Flipped under the tasks lock; gates late registrations racing stop.
    running: AtomicBool,
}

impl<M> Server<M>
where
    M: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Server with the default JSON codec. Call [`start`](Self::start) to
    /// bind and begin accepting.
    pub fn new(bind_addr: SocketAddr, config: ServerConfig) -> Self {
        Self::with_codec(bind_addr, config, Arc::new(JsonCodec))
    }
}

impl<M> Server<M>
where
    M: Clone + Send + Sync + 'static,
{
    /// Server with an explicit message codec.
    pub fn with_codec(
        bind_addr: SocketAddr,
        config: ServerConfig,
        codec: Arc<dyn MessageCodec<M>>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shared: Arc::new(Shared {
                bind_addr,
                config,
                codec,
                registry: Registry::new(),
                events: EventBus::default(),
                local_addr: RwLock::new(None),
                tasks: Mutex::new(Vec::new()),
                shutdown_tx,
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Actual bound address once started (resolves an `addr:0` bind).
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.shared.local_addr.read().await
    }

    pub async fn peer_count(&self) -> usize {
        self.shared.registry.len().await
    }

    pub async fn peer_addrs(&self) -> Vec<SocketAddr> {
        self.shared.registry.addrs().await
    }

    /// Subscribe to lifecycle and message events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent<M>> {
        self.shared.events.subscribe()
    }

    /// Bind the configured address and start the accept loop.
    pub async fn start(&self) -> Result<(), NetError> {
        let shared = &self.shared;
        {
            let mut local = shared.local_addr.write().await;
            if local.is_some() {
                return Err(NetError::Bind {
                    addr: shared.bind_addr,
                    source: std::io::Error::new(
                        std::io::ErrorKind::AddrInUse,
                        "server already started",
                    ),
                });
            }

            let listener = shared.bind(shared.bind_addr)?;
            let bound = listener.local_addr().map_err(|source| NetError::Bind {
                addr: shared.bind_addr,
                source,
            })?;
            *local = Some(bound);

            let mut tasks = shared.tasks.lock().await;
            shared.running.store(true, Ordering::SeqCst);
            tasks.push(tokio::spawn(Shared::accept_loop(shared.clone(), listener)));
            tracing::info!(%bound, "server listening");
        }
        Ok(())
    }

    /// Serialize and send one message to a registered peer.
    pub async fn send(&self, message: &M, to: SocketAddr) -> Result<(), NetError> {
        let shared = &self.shared;
        let conn = shared
            .registry
            .get(&to)
            .await
            .ok_or(NetError::PeerNotFound(to))?;

        let payload = shared.codec.encode(message)?;
        match conn.send_frame(&payload).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let err = NetError::from(e);
                if err.is_transport_fault() {
                    shared.drop_peer(&conn, "send failed").await;
                }
                Err(err)
            }
        }
    }

    /// Send one message to every registered peer concurrently.
    ///
    /// Completes once every individual send has finished; one peer's
    /// failure does not cancel the others (the failing peer is dropped
    /// from the registry). Returns how many peers accepted the frame.
    pub async fn broadcast(&self, message: &M) -> Result<usize, NetError> {
        let shared = &self.shared;
        let payload = Bytes::from(shared.codec.encode(message)?);
        let peers = shared.registry.peers().await;

        let mut sends = Vec::with_capacity(peers.len());
        for conn in peers {
            let shared = shared.clone();
            let payload = payload.clone();
            sends.push(tokio::spawn(async move {
                match conn.send_frame(&payload).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!(peer = %conn.remote(), "broadcast send failed: {e}");
                        if NetError::from(e).is_transport_fault() {
                            shared.drop_peer(&conn, "broadcast send failed").await;
                        }
                        false
                    }
                }
            }));
        }

        let mut delivered = 0;
        for send in sends {
            if matches!(send.await, Ok(true)) {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    /// Gracefully disconnect and remove one peer.
    ///
    /// Returns `true` if the peer was found and removed, `false` if the
    /// address is not currently registered; other peers are unaffected
    /// either way.
    pub async fn kick(&self, addr: SocketAddr) -> bool {
        match self.shared.registry.remove(&addr).await {
            Some(conn) => {
                conn.begin_shutdown();
                self.shared
                    .events
                    .emit(ServerEvent::ClientDisconnected { peer: addr });
                tracing::info!(peer = %addr, "client kicked");
                true
            }
            None => false,
        }
    }

    /// Disconnect every peer (best-effort), stop the accept loop, and
    /// release the listener. Joins all background loops before returning.
    pub async fn stop(&self) {
        let shared = &self.shared;
        // The tasks lock serializes against a registration in flight, so
        // every accepted peer is either drained here or never registered.
        let handles: Vec<_> = {
            let mut tasks = shared.tasks.lock().await;
            shared.running.store(false, Ordering::SeqCst);
            let _ = shared.shutdown_tx.send(());

            let peers = shared.registry.drain().await;
            for conn in &peers {
                conn.begin_shutdown();
            }
            tracing::info!(peers = peers.len(), "server stopping");
            tasks.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
        *shared.local_addr.write().await = None;
        tracing::info!("server stopped");
    }
}

impl<M> Shared<M>
where
    M: Clone + Send + Sync + 'static,
{
    /// Bind with the configured backlog.
    fn bind(&self, addr: SocketAddr) -> Result<TcpListener, NetError> {
        let bind = || -> std::io::Result<TcpListener> {
            let socket = if addr.is_ipv4() {
                TcpSocket::new_v4()?
            } else {
                TcpSocket::new_v6()?
            };
            socket.set_reuseaddr(true)?;
            socket.bind(addr)?;
            socket.listen(self.config.backlog)
        };
        bind().map_err(|source| NetError::Bind { addr, source })
    }

    /// Accept inbound connections until shutdown.
    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        let mut shutdown = self.shutdown_tx.subscribe();
        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown.recv() => {
                    tracing::info!("shutdown signal, stopping accept loop");
                    return;
                }
            };
            match accepted {
                Ok((stream, peer)) => self.register(stream, peer).await,
                Err(e) => tracing::warn!("failed to accept connection: {e}"),
            }
        }
    }

    /// Register an accepted stream and start its loops.
    async fn register(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let conn = match Connection::new(stream, self.config.recv_buffer, self.config.send_buffer)
        {
            Ok(conn) => Arc::new(conn),
            Err(e) => {
                tracing::warn!(%peer, "failed to register connection: {e}");
                return;
            }
        };

        {
            let mut tasks = self.tasks.lock().await;
            if !self.running.load(Ordering::SeqCst) {
                // Lost the race against stop; the stream just closes.
                tracing::debug!(%peer, "dropping connection accepted during shutdown");
                return;
            }

            // An address may only appear once; a stale entry means the
            // old stream died without us noticing yet.
            if let Some(stale) = self.registry.insert(conn.clone()).await {
                stale.begin_shutdown();
            }

            tasks.retain(|h| !h.is_finished());
            tasks.push(tokio::spawn(Self::peer_receive_loop(
                self.clone(),
                conn.clone(),
            )));
            tasks.push(tokio::spawn(Self::peer_keepalive_loop(
                self.clone(),
                conn.clone(),
            )));
        }

        self.events.emit(ServerEvent::ClientConnected { peer });
        tracing::info!(%peer, "client connected");
    }

    /// Remove a peer and emit the disconnect event. Safe against the
    /// racing receive and keep-alive loops: only the caller that actually
    /// removes the entry emits.
    async fn drop_peer(self: &Arc<Self>, conn: &Arc<Connection>, reason: &str) {
        conn.begin_shutdown();
        if self.registry.remove_conn(conn).await {
            tracing::info!(peer = %conn.remote(), reason, "client disconnected");
            self.events.emit(ServerEvent::ClientDisconnected {
                peer: conn.remote(),
            });
        }
    }

    /// Read frames from one peer until shutdown, fault, or clean close.
    async fn peer_receive_loop(self: Arc<Self>, conn: Arc<Connection>) {
        let peer = conn.remote();
        let mut shutdown = conn.shutdown_signal();
        loop {
            let result = tokio::select! {
                result = conn.recv_frame() => result,
                _ = shutdown.recv() => return,
            };
            match result {
                Ok(payload) => match self.codec.decode(&payload) {
                    Ok(message) => self.events.emit(ServerEvent::Received { peer, message }),
                    Err(e) => tracing::warn!(%peer, "dropping undecodable frame: {e}"),
                },
                Err(ProtocolError::Closed) => {
                    self.drop_peer(&conn, "stream closed").await;
                    return;
                }
                Err(e) => {
                    tracing::warn!(%peer, "receive fault: {e}");
                    self.drop_peer(&conn, "receive fault").await;
                    return;
                }
            }
        }
    }

    /// Probe one peer every ping interval; failure removes it.
    async fn peer_keepalive_loop(self: Arc<Self>, conn: Arc<Connection>) {
        let interval = self.config.ping_interval();
        let mut shutdown = conn.shutdown_signal();
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.recv() => return,
            }
            if !conn.is_alive(self.config.probe_timeout()).await {
                self.drop_peer(&conn, "keep-alive probe failed").await;
                return;
            }
        }
    }
}
