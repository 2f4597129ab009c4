//! Peer registry -- thread-safe map of the server's live connections.
//!
//! Maps remote `SocketAddr` → `Arc<Connection>`. The accept loop inserts,
//! the per-peer loops and `kick` remove. Lookups clone the `Arc` under the
//! read lock, so a send racing a removal sees a closed stream (a transfer
//! fault) instead of a half-removed entry.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::endpoint::Connection;

#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<HashMap<SocketAddr, Arc<Connection>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection keyed by its remote address. An address may
    /// only appear once: a stale entry for the same address is returned so
    /// the caller can shut it down.
    pub async fn insert(&self, conn: Arc<Connection>) -> Option<Arc<Connection>> {
        let mut peers = self.inner.write().await;
        let prev = peers.insert(conn.remote(), conn.clone());
        tracing::info!(
            peer = %conn.remote(),
            registry_size = peers.len(),
            replaced_stale = prev.is_some(),
            "registry: peer added"
        );
        prev
    }

    /// Remove a peer by address.
    pub async fn remove(&self, addr: &SocketAddr) -> Option<Arc<Connection>> {
        let mut peers = self.inner.write().await;
        let removed = peers.remove(addr);
        if removed.is_some() {
            tracing::info!(peer = %addr, registry_size = peers.len(), "registry: peer removed");
        }
        removed
    }

    /// Remove `conn`'s address only if it still maps to this exact
    /// connection. Two loops may conclude the same peer is gone; the one
    /// that gets `true` here is the winner, and a newer connection that
    /// reused the address is left alone.
    pub async fn remove_conn(&self, conn: &Arc<Connection>) -> bool {
        let mut peers = self.inner.write().await;
        match peers.get(&conn.remote()) {
            Some(current) if Arc::ptr_eq(current, conn) => {
                peers.remove(&conn.remote());
                tracing::info!(
                    peer = %conn.remote(),
                    registry_size = peers.len(),
                    "registry: peer removed"
                );
                true
            }
            _ => false,
        }
    }

    pub async fn get(&self, addr: &SocketAddr) -> Option<Arc<Connection>> {
        self.inner.read().await.get(addr).cloned()
    }

    /// Snapshot of all live connections (for broadcast).
    pub async fn peers(&self) -> Vec<Arc<Connection>> {
        self.inner.read().await.values().cloned().collect()
    }

    pub async fn addrs(&self) -> Vec<SocketAddr> {
        self.inner.read().await.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Remove and return every peer (for `stop`).
    pub async fn drain(&self) -> Vec<Arc<Connection>> {
        let mut peers = self.inner.write().await;
        peers.drain().map(|(_, conn)| conn).collect()
    }
}
