//! Discovery listener tests on loopback.

use std::time::Duration;

use strand_net::DiscoveryListener;
use strand_protocol::DISCOVERY_PROBE;
use tokio::net::UdpSocket;

/// Probes keep the listener running; the zero-length sentinel stops it.
#[tokio::test]
async fn test_host_runs_until_stop_sentinel() -> anyhow::Result<()> {
    let listener = DiscoveryListener::bind("127.0.0.1".parse()?, 0).await?;
    let addr = listener.local_addr()?;
    let running = tokio::spawn(async move { listener.run().await });

    let sender = UdpSocket::bind("127.0.0.1:0").await?;
    sender.send_to(&[DISCOVERY_PROBE], addr).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!running.is_finished(), "listener stopped on a probe");

    sender.send_to(&[], addr).await?;
    let outcome = tokio::time::timeout(Duration::from_secs(5), running).await;
    outcome
        .expect("listener did not stop on the sentinel")
        .expect("listener task panicked")?;
    Ok(())
}

/// Two listeners may not share a port without reuse; the second bind is
/// a bind fault, not a hang.
#[tokio::test]
async fn test_port_collision_is_bind_fault() -> anyhow::Result<()> {
    let first = DiscoveryListener::bind("127.0.0.1".parse()?, 0).await?;
    let port = first.local_addr()?.port();

    match DiscoveryListener::bind("127.0.0.1".parse()?, port).await {
        Err(strand_net::NetError::Bind { .. }) => {}
        Ok(_) => panic!("second bind on an occupied port succeeded"),
        Err(other) => panic!("expected Bind fault, got {other:?}"),
    }
    Ok(())
}
