//! Connection state-machine tests: idempotent disconnect, Connecting
//! exclusivity, silent close, auto-reconnect.

use std::time::{Duration, Instant};

use strand_net::{Client, ClientEvent, ConnectionStatus, NetError, Server, ServerEvent};

use crate::harness::{
    client_config, server_config, start_string_server, wait_for_event, wait_for_status,
    EVENT_TIMEOUT,
};

#[tokio::test]
async fn test_disconnect_is_idempotent() -> anyhow::Result<()> {
    let (server, addr) = start_string_server().await?;

    let client: Client<String> = Client::new(addr, client_config(false));
    client.connect().await?;
    assert_eq!(client.status().await, ConnectionStatus::Connected);

    client.disconnect().await;
    assert_eq!(client.status().await, ConnectionStatus::Disconnected);

    // Second disconnect is a no-op, not an error.
    client.disconnect().await;
    assert_eq!(client.status().await, ConnectionStatus::Disconnected);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_redundant_connect_is_rejected() -> anyhow::Result<()> {
    let (server, addr) = start_string_server().await?;

    let client: Client<String> = Client::new(addr, client_config(false));
    client.connect().await?;

    match client.connect().await {
        Err(NetError::AlreadyConnected(peer)) => assert_eq!(peer, addr),
        other => panic!("expected AlreadyConnected, got {other:?}"),
    }

    client.disconnect().await;
    server.stop().await;
    Ok(())
}

/// Two racing connect calls must not produce two live streams.
#[tokio::test]
async fn test_concurrent_connect_yields_single_stream() -> anyhow::Result<()> {
    let (server, addr) = start_string_server().await?;
    let mut server_rx = server.subscribe();

    let client: Client<String> = Client::new(addr, client_config(false));
    let (a, b) = tokio::join!(client.connect(), client.connect());
    // One call wins; the other either no-ops or reports AlreadyConnected.
    assert!(a.is_ok() || b.is_ok());
    assert_eq!(client.status().await, ConnectionStatus::Connected);

    wait_for_event(&mut server_rx, EVENT_TIMEOUT, |e| {
        matches!(e, ServerEvent::ClientConnected { .. })
    })
    .await?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.peer_count().await, 1);

    client.disconnect().await;
    server.stop().await;
    Ok(())
}

/// A dial failure surfaces synchronously and leaves the client
/// disconnected.
#[tokio::test]
async fn test_failed_dial_surfaces_error() -> anyhow::Result<()> {
    // Grab a loopback port, then free it so the dial is refused.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let client: Client<String> = Client::new(addr, client_config(false));
    assert!(client.connect().await.is_err());
    assert_eq!(client.status().await, ConnectionStatus::Disconnected);
    Ok(())
}

/// A peer-side close ends the receive loop silently; the keep-alive
/// probe then tears the client down to Disconnected (no reconnect).
#[tokio::test]
async fn test_peer_close_without_reconnect_goes_disconnected() -> anyhow::Result<()> {
    let (server, addr) = start_string_server().await?;
    let mut server_rx = server.subscribe();

    let client: Client<String> = Client::new(addr, client_config(false));
    client.connect().await?;
    let connected = wait_for_event(&mut server_rx, EVENT_TIMEOUT, |e| {
        matches!(e, ServerEvent::ClientConnected { .. })
    })
    .await?;
    let ServerEvent::ClientConnected { peer } = connected else {
        unreachable!()
    };

    assert!(server.kick(peer).await);
    wait_for_status(&client, ConnectionStatus::Disconnected, EVENT_TIMEOUT).await?;

    client.disconnect().await;
    server.stop().await;
    Ok(())
}

/// Auto-reconnect: loss moves the client to Connecting, the first
/// attempt waits out the reconnect interval, and once the server is back
/// the receive loop resumes delivering messages.
#[tokio::test]
async fn test_auto_reconnect_resumes_after_server_restart() -> anyhow::Result<()> {
    let (server, addr) = start_string_server().await?;

    let client: Client<String> = Client::new(addr, client_config(true));
    let mut client_rx = client.subscribe();
    client.connect().await?;
    wait_for_event(&mut client_rx, EVENT_TIMEOUT, |e| {
        matches!(e, ClientEvent::Connected { .. })
    })
    .await?;

    server.stop().await;
    wait_for_event(&mut client_rx, EVENT_TIMEOUT, |e| {
        matches!(e, ClientEvent::ConnectionLost { .. })
    })
    .await?;
    let lost_at = Instant::now();
    wait_for_status(&client, ConnectionStatus::Connecting, EVENT_TIMEOUT).await?;

    // Bring a fresh server up on the same address.
    let revived: Server<String> = Server::new(addr, server_config());
    revived.start().await?;
    let mut revived_rx = revived.subscribe();

    wait_for_event(&mut client_rx, EVENT_TIMEOUT, |e| {
        matches!(e, ClientEvent::Connected { .. })
    })
    .await?;
    // The reconnect loop waits the full interval (500ms) before dialing.
    assert!(
        lost_at.elapsed() >= Duration::from_millis(400),
        "reconnected suspiciously fast: {:?}",
        lost_at.elapsed()
    );
    assert_eq!(client.status().await, ConnectionStatus::Connected);

    // The resumed connection carries traffic both ways.
    client.send(&"back again".to_string()).await?;
    let received = wait_for_event(&mut revived_rx, EVENT_TIMEOUT, |e| {
        matches!(e, ServerEvent::Received { .. })
    })
    .await?;
    let ServerEvent::Received { peer, message } = received else {
        unreachable!()
    };
    assert_eq!(message, "back again");

    revived.send(&"welcome back".to_string(), peer).await?;
    let received = wait_for_event(&mut client_rx, EVENT_TIMEOUT, |e| {
        matches!(e, ClientEvent::Received { .. })
    })
    .await?;
    let ClientEvent::Received { message, .. } = received else {
        unreachable!()
    };
    assert_eq!(message, "welcome back");

    client.disconnect().await;
    revived.stop().await;
    Ok(())
}

/// A connect call that observes a reconnect already in flight is a
/// no-op: one attempt, one stream, one Connected event.
#[tokio::test]
async fn test_connect_during_reconnect_is_noop() -> anyhow::Result<()> {
    let (server, addr) = start_string_server().await?;

    let client: Client<String> = Client::new(addr, client_config(true));
    let mut client_rx = client.subscribe();
    client.connect().await?;
    wait_for_event(&mut client_rx, EVENT_TIMEOUT, |e| {
        matches!(e, ClientEvent::Connected { .. })
    })
    .await?;

    server.stop().await;
    wait_for_status(&client, ConnectionStatus::Connecting, EVENT_TIMEOUT).await?;

    // Explicit connect while the reconnect loop owns the attempt.
    client.connect().await?;
    assert_eq!(client.status().await, ConnectionStatus::Connecting);

    let revived: Server<String> = Server::new(addr, server_config());
    revived.start().await?;
    let mut revived_rx = revived.subscribe();

    wait_for_event(&mut client_rx, EVENT_TIMEOUT, |e| {
        matches!(e, ClientEvent::Connected { .. })
    })
    .await?;

    // Exactly one inbound connection on the revived server.
    wait_for_event(&mut revived_rx, EVENT_TIMEOUT, |e| {
        matches!(e, ServerEvent::ClientConnected { .. })
    })
    .await?;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(revived.peer_count().await, 1);

    client.disconnect().await;
    revived.stop().await;
    Ok(())
}
