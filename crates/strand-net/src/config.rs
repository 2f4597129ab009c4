//! Configuration for the client and server roles.
//!
//! Every knob has a serde default so partial TOML sections parse; the
//! `_ms` fields expose `Duration` accessors for the loops.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strand_protocol::{DEFAULT_RECV_BUFFER, DEFAULT_SEND_BUFFER};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Retry connecting on a transport fault instead of tearing down.
    #[serde(default)]
    pub auto_reconnect: bool,
    /// Delay between reconnect attempts.
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    /// Delay between liveness probes.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    /// Bound on a single liveness probe.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Max bytes moved per buffered read.
    #[serde(default = "default_recv_buffer")]
    pub recv_buffer: usize,
    /// Max bytes moved per buffered write.
    #[serde(default = "default_send_buffer")]
    pub send_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: false,
            reconnect_interval_ms: default_reconnect_interval_ms(),
            ping_interval_ms: default_ping_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            recv_buffer: default_recv_buffer(),
            send_buffer: default_send_buffer(),
        }
    }
}

impl ClientConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Max pending inbound connections queued by the listener.
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    /// Delay between per-peer liveness probes.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    /// Bound on a single liveness probe.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Max bytes moved per buffered read.
    #[serde(default = "default_recv_buffer")]
    pub recv_buffer: usize,
    /// Max bytes moved per buffered write.
    #[serde(default = "default_send_buffer")]
    pub send_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            backlog: default_backlog(),
            ping_interval_ms: default_ping_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            recv_buffer: default_recv_buffer(),
            send_buffer: default_send_buffer(),
        }
    }
}

impl ServerConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

// Default value functions
fn default_reconnect_interval_ms() -> u64 {
    2_000
}
fn default_ping_interval_ms() -> u64 {
    15_000
}
fn default_probe_timeout_ms() -> u64 {
    500
}
fn default_recv_buffer() -> usize {
    DEFAULT_RECV_BUFFER
}
fn default_send_buffer() -> usize {
    DEFAULT_SEND_BUFFER
}
fn default_backlog() -> u32 {
    64
}
