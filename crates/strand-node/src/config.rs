//! Configuration for strand-node. Parsed from strand.toml.

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use strand_net::{ClientConfig, ServerConfig};
use strand_protocol::DEFAULT_DISCOVERY_PORT;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub discovery: DiscoverySection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSection {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySection {
    #[serde(default = "default_discovery_port")]
    pub port: u16,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            port: default_discovery_port(),
        }
    }
}

impl NodeConfig {
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: NodeConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node: NodeSection::default(),
            client: ClientConfig::default(),
            server: ServerConfig::default(),
            discovery: DiscoverySection::default(),
        }
    }
}

// Default value functions
fn default_listen_addr() -> SocketAddr {
    "0.0.0.0:7400".parse().expect("static default address")
}
fn default_discovery_port() -> u16 {
    DEFAULT_DISCOVERY_PORT
}
