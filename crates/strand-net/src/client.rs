//! Client role -- one outbound connection with reconnect and keep-alive.
//!
//! The state machine is `Disconnected → Connecting → Connected`, and back
//! to `Connecting` (auto-reconnect) or `Disconnected` on loss. Entry into
//! `Connecting` is guarded so only one attempt is ever in flight. All
//! background loops are supervised: `disconnect` signals them and joins
//! them before returning.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;

use strand_protocol::{JsonCodec, MessageCodec, ProtocolError};

use crate::config::ClientConfig;
use crate::endpoint::{Connection, ConnectionStatus};
use crate::error::NetError;
use crate::events::{ClientEvent, EventBus};

/// A typed-message client over one TCP connection.
pub struct Client<M> {
    shared: Arc<Shared<M>>,
}

struct Shared<M> {
    target: SocketAddr,
    config: ClientConfig,
    codec: Arc<dyn MessageCodec<M>>,
    status: RwLock<ConnectionStatus>,
    conn: RwLock<Option<Arc<Connection>>>,
    events: EventBus<ClientEvent<M>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    // Client-wide teardown signal; unblocks the reconnect sleep.
    shutdown_tx: broadcast::Sender<()>,
}

impl<M> Client<M>
where
    M: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Client with the default JSON codec. Call [`connect`](Self::connect)
    /// to establish the connection.
    pub fn new(target: SocketAddr, config: ClientConfig) -> Self {
        Self::with_codec(target, config, Arc::new(JsonCodec))
    }

    /// Build a client with default configuration and connect in one call.
    pub async fn connect_to(target: SocketAddr) -> Result<Self, NetError> {
        let client = Self::new(target, ClientConfig::default());
        client.connect().await?;
        Ok(client)
    }
}

impl<M> Client<M>
where
    M: Clone + Send + Sync + 'static,
{
    /// Client with an explicit message codec.
    pub fn with_codec(
        target: SocketAddr,
        config: ClientConfig,
        codec: Arc<dyn MessageCodec<M>>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shared: Arc::new(Shared {
                target,
                config,
                codec,
                status: RwLock::new(ConnectionStatus::Disconnected),
                conn: RwLock::new(None),
                events: EventBus::default(),
                tasks: Mutex::new(Vec::new()),
                shutdown_tx,
            }),
        }
    }

    pub fn target(&self) -> SocketAddr {
        self.shared.target
    }

    pub async fn status(&self) -> ConnectionStatus {
        *self.shared.status.read().await
    }

    /// Subscribe to lifecycle and message events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent<M>> {
        self.shared.events.subscribe()
    }

    /// Establish the connection and start the receive and keep-alive
    /// loops.
    ///
    /// Errors with [`NetError::AlreadyConnected`] on a live connection; a
    /// call that observes an attempt already in flight is a no-op. A
    /// failed dial surfaces synchronously -- auto-reconnect only governs
    /// an established connection that is later lost.
    pub async fn connect(&self) -> Result<(), NetError> {
        let shared = &self.shared;
        {
            let mut status = shared.status.write().await;
            match *status {
                ConnectionStatus::Connected => {
                    return Err(NetError::AlreadyConnected(shared.target))
                }
                ConnectionStatus::Connecting => return Ok(()),
                ConnectionStatus::Disconnected => *status = ConnectionStatus::Connecting,
            }
        }

        let stream = match TcpStream::connect(shared.target).await {
            Ok(stream) => stream,
            Err(e) => {
                *shared.status.write().await = ConnectionStatus::Disconnected;
                return Err(e.into());
            }
        };
        match shared.install(stream).await {
            Ok(()) => Ok(()),
            Err(e) => {
                *shared.status.write().await = ConnectionStatus::Disconnected;
                Err(e)
            }
        }
    }

    /// Gracefully tear down the connection. Idempotent: disconnecting an
    /// already-disconnected client is a no-op. Joins every background
    /// loop before returning, including a pending reconnect loop.
    pub async fn disconnect(&self) {
        let shared = &self.shared;
        // The tasks lock serializes teardown against a concurrent
        // install, so a dial that loses this race is discarded instead of
        // leaking a live connection.
        let handles: Vec<_> = {
            let mut tasks = shared.tasks.lock().await;
            *shared.status.write().await = ConnectionStatus::Disconnected;
            if let Some(conn) = shared.conn.write().await.take() {
                conn.begin_shutdown();
            }
            let _ = shared.shutdown_tx.send(());
            tasks.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
        tracing::info!(peer = %shared.target, "client disconnected");
    }

    /// Serialize and send one message.
    ///
    /// Probes liveness first; a dead or faulting transport either fails
    /// the call, or -- with auto-reconnect enabled -- drops this message,
    /// emits [`ClientEvent::ConnectionLost`], schedules the reconnect
    /// loop, and returns `Ok`.
    pub async fn send(&self, message: &M) -> Result<(), NetError> {
        let shared = &self.shared;
        let conn = shared
            .conn
            .read()
            .await
            .clone()
            .ok_or(NetError::NotConnected)?;

        if !conn.is_alive(shared.config.probe_timeout()).await {
            let err = NetError::Unresponsive(conn.remote());
            return shared.absorb_transport_fault(&conn, err).await;
        }

        let payload = shared.codec.encode(message)?;
        match conn.send_frame(&payload).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let err = NetError::from(e);
                if err.is_transport_fault() {
                    shared.absorb_transport_fault(&conn, err).await
                } else {
                    Err(err)
                }
            }
        }
    }
}

impl<M> Shared<M>
where
    M: Clone + Send + Sync + 'static,
{
    /// Promote a freshly dialed stream to the live connection and start
    /// its loops. Caller must have won the `Connecting` guard; if the
    /// client was torn down while dialing, the stream is discarded.
    ///
    /// The tasks lock is held across the status flip and the spawns so a
    /// concurrent `disconnect` either aborts the install or joins the new
    /// loops -- it can never miss them.
    fn install<'a>(
        self: &'a Arc<Self>,
        stream: TcpStream,
    ) -> Pin<Box<dyn Future<Output = Result<(), NetError>> + Send + 'a>> {
        Box::pin(async move {
            let conn = Arc::new(Connection::new(
                stream,
                self.config.recv_buffer,
                self.config.send_buffer,
            )?);

            let mut tasks = self.tasks.lock().await;
            {
                let mut status = self.status.write().await;
                if *status != ConnectionStatus::Connecting {
                    return Err(NetError::NotConnected);
                }
                *status = ConnectionStatus::Connected;
            }
            *self.conn.write().await = Some(conn.clone());

            tasks.retain(|h| !h.is_finished());
            tasks.push(tokio::spawn(Self::receive_loop(self.clone(), conn.clone())));
            tasks.push(tokio::spawn(Self::keepalive_loop(
                self.clone(),
                conn.clone(),
            )));
            drop(tasks);

            self.events.emit(ClientEvent::Connected {
                peer: conn.remote(),
            });
            tracing::info!(peer = %conn.remote(), "client connected");
            Ok(())
        })
    }

    /// Win the transition out of `Connected`. Exactly one of the racing
    /// loops (receive, keep-alive, send path) gets `true`.
    async fn begin_teardown(&self, next: ConnectionStatus) -> bool {
        let mut status = self.status.write().await;
        if *status != ConnectionStatus::Connected {
            return false;
        }
        *status = next;
        true
    }

    /// Transport became unusable: emit `ConnectionLost`, then either
    /// schedule the reconnect loop or tear down to `Disconnected`.
    async fn handle_lost(self: &Arc<Self>, conn: &Arc<Connection>) {
        let mut tasks = self.tasks.lock().await;
        let next = if self.config.auto_reconnect {
            ConnectionStatus::Connecting
        } else {
            ConnectionStatus::Disconnected
        };
        if !self.begin_teardown(next).await {
            return;
        }

        conn.begin_shutdown();
        *self.conn.write().await = None;
        self.events.emit(ClientEvent::ConnectionLost {
            peer: conn.remote(),
        });
        tracing::warn!(
            peer = %conn.remote(),
            auto_reconnect = self.config.auto_reconnect,
            "connection lost"
        );

        if self.config.auto_reconnect {
            let shared = self.clone();
            tasks.push(tokio::spawn(async move { shared.reconnect_loop().await }));
        }
    }

    async fn absorb_transport_fault(
        self: &Arc<Self>,
        conn: &Arc<Connection>,
        err: NetError,
    ) -> Result<(), NetError> {
        self.handle_lost(conn).await;
        if self.config.auto_reconnect {
            tracing::warn!(peer = %conn.remote(), "send failed, reconnect scheduled: {err}");
            Ok(())
        } else {
            Err(err)
        }
    }

    /// Retry the dial forever, waiting the configured interval before
    /// each attempt, until success or an explicit `disconnect`.
    async fn reconnect_loop(self: Arc<Self>) {
        let interval = self.config.reconnect_interval();
        let mut shutdown = self.shutdown_tx.subscribe();
        loop {
            if *self.status.read().await != ConnectionStatus::Connecting {
                return;
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.recv() => return,
            }

            match TcpStream::connect(self.target).await {
                Ok(stream) => match self.install(stream).await {
                    Ok(()) => {
                        tracing::info!(peer = %self.target, "reconnected");
                        return;
                    }
                    Err(e) => tracing::debug!(peer = %self.target, "reconnect aborted: {e}"),
                },
                Err(e) => {
                    tracing::debug!(peer = %self.target, "reconnect attempt failed: {e}")
                }
            }
        }
    }

    /// Read frames until shutdown. A clean close ends the loop silently;
    /// the keep-alive probe is what subsequently observes the dead stream.
    async fn receive_loop(self: Arc<Self>, conn: Arc<Connection>) {
        let peer = conn.remote();
        let mut shutdown = conn.shutdown_signal();
        loop {
            let result = tokio::select! {
                result = conn.recv_frame() => result,
                _ = shutdown.recv() => return,
            };
            match result {
                Ok(payload) => match self.codec.decode(&payload) {
                    Ok(message) => self.events.emit(ClientEvent::Received { peer, message }),
                    Err(e) => tracing::warn!(%peer, "dropping undecodable frame: {e}"),
                },
                Err(ProtocolError::Closed) => {
                    tracing::debug!(%peer, "stream closed, receive loop exiting");
                    return;
                }
                Err(e) => {
                    tracing::warn!(%peer, "receive fault: {e}");
                    self.handle_lost(&conn).await;
                    return;
                }
            }
        }
    }

    /// Probe liveness every ping interval; on failure apply the
    /// reconnect-or-disconnect decision.
    async fn keepalive_loop(self: Arc<Self>, conn: Arc<Connection>) {
        let interval = self.config.ping_interval();
        let mut shutdown = conn.shutdown_signal();
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.recv() => return,
            }
            if !conn.is_alive(self.config.probe_timeout()).await {
                tracing::debug!(peer = %conn.remote(), "keep-alive probe failed");
                self.handle_lost(&conn).await;
                return;
            }
        }
    }
}
