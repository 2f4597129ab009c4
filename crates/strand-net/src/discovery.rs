//! Network discovery -- best-effort presence signaling over UDP broadcast.
//!
//! Independent of the framed protocol. `discover` fires one probe
//! datagram at the broadcast address and reports only whether the send
//! went out; it collects no responses and cannot enumerate hosts (a
//! documented limitation, not a handshake). `host` listens for probes
//! until a zero-length datagram stops it.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::net::UdpSocket;

use strand_protocol::DISCOVERY_PROBE;

use crate::error::NetError;

/// Outcome of one `discover` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryResult {
    /// Whether the probe went out at all.
    pub any: bool,
    /// Count of responders; `None` because this protocol cannot
    /// enumerate.
    pub hosts_count: Option<usize>,
    /// Responder endpoints; `None` because this protocol cannot
    /// enumerate.
    pub hosts: Option<Vec<SocketAddr>>,
}

/// Broadcast one probe datagram to `port`, returning as soon as the first
/// send completes.
///
/// Best-effort and one-shot: a listener on the same segment may observe
/// the probe, but no response is awaited. A bind or send failure means no
/// usable interface could carry the broadcast.
pub async fn discover(port: u16) -> Result<DiscoveryResult, NetError> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .await
        .map_err(NetError::NoInterface)?;
    socket.set_broadcast(true).map_err(NetError::NoInterface)?;

    let target = SocketAddr::from((Ipv4Addr::BROADCAST, port));
    let sent = socket
        .send_to(&[DISCOVERY_PROBE], target)
        .await
        .map_err(NetError::NoInterface)?;
    tracing::debug!(%target, sent, "discovery probe sent");

    Ok(DiscoveryResult {
        any: sent > 0,
        hosts_count: None,
        hosts: None,
    })
}

/// A bound discovery listener. [`run`](Self::run) receives probes until
/// the zero-length stop sentinel arrives.
pub struct DiscoveryListener {
    socket: UdpSocket,
}

impl DiscoveryListener {
    pub async fn bind(addr: IpAddr, port: u16) -> Result<Self, NetError> {
        let bind_addr = SocketAddr::new(addr, port);
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|source| NetError::Bind {
                addr: bind_addr,
                source,
            })?;
        socket.set_broadcast(true).map_err(NetError::Io)?;
        Ok(Self { socket })
    }

    /// Actual bound address (resolves a port-0 bind).
    pub fn local_addr(&self) -> Result<SocketAddr, NetError> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive probes until a zero-length datagram arrives.
    pub async fn run(&self) -> Result<(), NetError> {
        let mut buf = [0u8; 16];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            if len == 0 {
                tracing::debug!(%from, "discovery stop sentinel received");
                return Ok(());
            }
            tracing::debug!(%from, len, "discovery probe received");
        }
    }
}

/// Bind a listener on `addr:port` and run it to completion.
pub async fn host(addr: IpAddr, port: u16) -> Result<(), NetError> {
    DiscoveryListener::bind(addr, port).await?.run().await
}
