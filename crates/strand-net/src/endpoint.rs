//! Connection endpoint -- one live peer relationship over a TCP stream.
//!
//! The stream is shared (`Arc<TcpStream>`): the receive loop is the only
//! frame-consuming reader, writers serialize behind an async lock so
//! frames never interleave, and the liveness probe peeks without
//! consuming so it cannot corrupt an in-flight frame read.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex};

use strand_protocol::{framing, ProtocolError};

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// One live peer relationship: the shared stream, buffer caps, the write
/// lock, and the shutdown signal for the loops driving it.
pub struct Connection {
    stream: Arc<TcpStream>,
    remote: SocketAddr,
    recv_buffer: usize,
    send_buffer: usize,
    write_lock: Mutex<()>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Connection {
    pub fn new(
        stream: TcpStream,
        recv_buffer: usize,
        send_buffer: usize,
    ) -> std::io::Result<Self> {
        let remote = stream.peer_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            stream: Arc::new(stream),
            remote,
            recv_buffer,
            send_buffer,
            write_lock: Mutex::new(()),
            shutdown_tx,
        })
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Receiver for the per-connection shutdown signal. Every loop driving
    /// this connection selects on one of these.
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Tell every loop driving this connection to exit. The stream itself
    /// closes once the last clone of the `Arc` drops.
    pub fn begin_shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Write one framed payload. Concurrent senders are serialized.
    pub async fn send_frame(&self, payload: &[u8]) -> Result<(), ProtocolError> {
        let _guard = self.write_lock.lock().await;
        framing::write_frame(&self.stream, payload, self.send_buffer).await
    }

    /// Read the next framed payload. Only the receive loop calls this.
    pub async fn recv_frame(&self) -> Result<Bytes, ProtocolError> {
        framing::read_frame(&self.stream, self.recv_buffer).await
    }

    /// Non-consuming liveness probe with a bounded wait.
    ///
    /// Pending data and an idle-but-open stream both count as alive; EOF
    /// or a socket error count as dead. Never removes bytes, so it is safe
    /// against a concurrent frame read.
    pub async fn is_alive(&self, probe_timeout: Duration) -> bool {
        let mut probe = [0u8; 1];
        match tokio::time::timeout(probe_timeout, self.stream.peek(&mut probe)).await {
            Ok(Ok(0)) => false,
            Ok(Ok(_)) => true,
            Ok(Err(_)) => false,
            // No data inside the window; the stream is open.
            Err(_) => true,
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("remote", &self.remote)
            .field("recv_buffer", &self.recv_buffer)
            .field("send_buffer", &self.send_buffer)
            .finish()
    }
}
