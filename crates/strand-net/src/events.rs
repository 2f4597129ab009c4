//! Event subscription -- broadcast fan-out of lifecycle and message events.
//!
//! Each role owns an [`EventBus`]; every `subscribe` call gets an
//! independent receiver, and registration/removal is safe while loops are
//! emitting. A subscriber that falls behind loses the oldest events
//! (`RecvError::Lagged`) rather than blocking the emitting loop.

use std::net::SocketAddr;

use tokio::sync::broadcast;

/// Events retained per subscriber before the oldest are dropped.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle and message events seen by a client.
#[derive(Debug, Clone)]
pub enum ClientEvent<M> {
    /// Connection established (initial connect or a successful reconnect).
    Connected { peer: SocketAddr },
    /// One framed message arrived and decoded.
    Received { peer: SocketAddr, message: M },
    /// The transport became unusable; reconnect may follow.
    ConnectionLost { peer: SocketAddr },
}

/// Lifecycle and message events seen by a server.
#[derive(Debug, Clone)]
pub enum ServerEvent<M> {
    ClientConnected { peer: SocketAddr },
    ClientDisconnected { peer: SocketAddr },
    Received { peer: SocketAddr, message: M },
}

/// Multi-subscriber event fan-out over a tokio broadcast channel.
#[derive(Debug)]
pub struct EventBus<E> {
    tx: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }

    /// Deliver to all current subscribers. Emitting with no subscribers
    /// is a no-op, not an error.
    pub fn emit(&self, event: E) {
        let _ = self.tx.send(event);
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}
