//! Strand Node -- command-line exerciser for the Strand transport.
//!
//! Usage:
//!   strand-node serve                    # Run a chat server
//!   strand-node connect 127.0.0.1:7400   # Connect and chat
//!   strand-node discover                 # Send a broadcast probe
//!   strand-node host                     # Listen for broadcast probes

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use strand_net::{discovery, Client, ClientEvent, Server, ServerEvent};

use crate::config::NodeConfig;

#[derive(Parser)]
#[command(name = "strand-node", about = "Strand typed-message transport node")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "strand.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a server; lines typed on stdin are broadcast to every client
    Serve {
        /// Override the configured listen address
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
    /// Connect to a server; lines typed on stdin are sent, replies printed
    Connect {
        /// Server address
        addr: SocketAddr,
        /// Reconnect automatically when the connection drops
        #[arg(long)]
        reconnect: bool,
    },
    /// Send one discovery probe to the local network segment
    Discover {
        /// Override the configured discovery port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Listen for discovery probes until a zero-length datagram arrives
    Host {
        /// Override the configured discovery port
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strand_node=info,strand_net=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = NodeConfig::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Serve { listen } => run_server(cfg, listen).await,
        Commands::Connect { addr, reconnect } => run_client(cfg, addr, reconnect).await,
        Commands::Discover { port } => {
            let port = port.unwrap_or(cfg.discovery.port);
            let result = discovery::discover(port).await?;
            println!("probe sent on port {port}: any={}", result.any);
            Ok(())
        }
        Commands::Host { port } => {
            let port = port.unwrap_or(cfg.discovery.port);
            println!("listening for discovery probes on port {port}...");
            discovery::host("0.0.0.0".parse()?, port).await?;
            println!("stop sentinel received, exiting");
            Ok(())
        }
    }
}

async fn run_server(cfg: NodeConfig, listen: Option<SocketAddr>) -> anyhow::Result<()> {
    let listen = listen.unwrap_or(cfg.node.listen_addr);
    let server: Server<String> = Server::new(listen, cfg.server);
    server.start().await?;
    let bound = server
        .local_addr()
        .await
        .ok_or_else(|| anyhow::anyhow!("server did not report a bound address"))?;
    println!("serving on {bound}; lines typed here are broadcast to all clients");

    let mut events = server.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ServerEvent::ClientConnected { peer }) => println!("* {peer} connected"),
                Ok(ServerEvent::ClientDisconnected { peer }) => println!("* {peer} disconnected"),
                Ok(ServerEvent::Received { peer, message }) => println!("{peer}: {message}"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event printer lagged")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            continue;
        }
        match server.broadcast(&line).await {
            Ok(delivered) => tracing::debug!(delivered, "line broadcast"),
            Err(e) => eprintln!("broadcast failed: {e}"),
        }
    }

    server.stop().await;
    Ok(())
}

async fn run_client(cfg: NodeConfig, addr: SocketAddr, reconnect: bool) -> anyhow::Result<()> {
    let mut client_cfg = cfg.client;
    client_cfg.auto_reconnect = client_cfg.auto_reconnect || reconnect;

    let client: Client<String> = Client::new(addr, client_cfg);
    let mut events = client.subscribe();
    client.connect().await?;
    println!("connected to {addr}; lines typed here are sent to the server");

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ClientEvent::Connected { peer }) => println!("* connected to {peer}"),
                Ok(ClientEvent::ConnectionLost { peer }) => println!("* lost {peer}"),
                Ok(ClientEvent::Received { peer, message }) => println!("{peer}: {message}"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event printer lagged")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            continue;
        }
        if let Err(e) = client.send(&line).await {
            eprintln!("send failed: {e}");
        }
    }

    client.disconnect().await;
    Ok(())
}
