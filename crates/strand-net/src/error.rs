//! Error taxonomy for the connection roles.

use std::net::SocketAddr;

use strand_protocol::ProtocolError;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Redundant `connect` call on a live connection.
    #[error("already connected to {0}")]
    AlreadyConnected(SocketAddr),
    /// Operation that needs a live connection while there is none.
    #[error("not connected")]
    NotConnected,
    /// Operation referencing an address absent from the server registry.
    #[error("no peer registered at {0}")]
    PeerNotFound(SocketAddr),
    /// Listener could not bind the configured address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    /// No usable network interface for a discovery broadcast.
    #[error("no usable network interface: {0}")]
    NoInterface(std::io::Error),
    /// Liveness probe found the peer dead before a send.
    #[error("peer {0} is not responding")]
    Unresponsive(SocketAddr),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl NetError {
    /// Whether this error marks the underlying transport as unusable
    /// (triggering the reconnect-or-teardown decision).
    pub fn is_transport_fault(&self) -> bool {
        matches!(
            self,
            NetError::Unresponsive(_)
                | NetError::Io(_)
                | NetError::Protocol(
                    ProtocolError::Transfer { .. } | ProtocolError::Closed | ProtocolError::Io(_)
                )
        )
    }
}
