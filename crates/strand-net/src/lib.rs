//! Strand Net -- connection roles over the Strand wire protocol.
//!
//! A [`Client`](client::Client) owns one outbound connection with
//! reconnect and keep-alive; a [`Server`](server::Server) accepts many
//! inbound connections into an address-keyed registry with
//! broadcast/unicast/kick. [`discovery`] locates peers on the local
//! segment via UDP broadcast, independent of the framed protocol.

pub mod client;
pub mod config;
pub mod discovery;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod registry;
pub mod server;

pub use client::Client;
pub use config::{ClientConfig, ServerConfig};
pub use discovery::{discover, host, DiscoveryListener, DiscoveryResult};
pub use endpoint::ConnectionStatus;
pub use error::NetError;
pub use events::{ClientEvent, ServerEvent};
pub use server::Server;
