//! Test harness for in-process client/server integration tests.
//!
//! Loopback servers bind port 0; intervals are shortened so liveness and
//! reconnect scenarios resolve within test timeouts.

use std::net::SocketAddr;
use std::time::Duration;

use strand_net::{Client, ClientConfig, ConnectionStatus, Server, ServerConfig};
use tokio::sync::broadcast;

/// Generous upper bound for anything event-driven on loopback.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn server_config() -> ServerConfig {
    ServerConfig {
        ping_interval_ms: 200,
        probe_timeout_ms: 100,
        ..Default::default()
    }
}

pub fn client_config(auto_reconnect: bool) -> ClientConfig {
    ClientConfig {
        auto_reconnect,
        reconnect_interval_ms: 500,
        ping_interval_ms: 200,
        probe_timeout_ms: 100,
        ..Default::default()
    }
}

/// Start a JSON string server on an ephemeral loopback port.
pub async fn start_string_server() -> anyhow::Result<(Server<String>, SocketAddr)> {
    let server = Server::new("127.0.0.1:0".parse()?, server_config());
    server.start().await?;
    let addr = server
        .local_addr()
        .await
        .ok_or_else(|| anyhow::anyhow!("server did not report a bound address"))?;
    Ok((server, addr))
}

/// Receive events until one matches `pred`, or fail at the deadline.
/// Lagged receivers skip ahead rather than failing.
pub async fn wait_for_event<E, F>(
    rx: &mut broadcast::Receiver<E>,
    timeout: Duration,
    mut pred: F,
) -> anyhow::Result<E>
where
    E: Clone,
    F: FnMut(&E) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Ok(event)) => {
                if pred(&event) {
                    return Ok(event);
                }
            }
            Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                tracing::warn!(skipped, "test subscriber lagged");
            }
            Ok(Err(broadcast::error::RecvError::Closed)) => {
                anyhow::bail!("event channel closed while waiting");
            }
            Err(_) => anyhow::bail!("timeout waiting for event"),
        }
    }
}

/// Poll the client status until it reaches `want`, or fail at the
/// deadline.
pub async fn wait_for_status<M>(
    client: &Client<M>,
    want: ConnectionStatus,
    timeout: Duration,
) -> anyhow::Result<()>
where
    M: Clone + Send + Sync + 'static,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if client.status().await == want {
            return Ok(());
        }
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!(
                "timeout waiting for status {want}, have {}",
                client.status().await
            );
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
