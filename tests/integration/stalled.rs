use crate::*;

/// One MESSAGE payload big enough that a few hundred of them overflow any
/// loopback socket buffer.
fn big_text() -> String {
    "x".repeat(64 * 1024)
}

/// A peer that finishes the handshake and then never reads must not keep
/// shutdown waiting, even with a write parked on its full socket.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_with_a_peer_that_never_reads() -> Result<()> {
    let mut config = test_config();
    config.network.write_timeout_ms = 60_000;
    let (node, _inbox) = OverlayNode::start(config).await?;
    let _stalled = raw_join(&node.listen_addr().to_string(), 1).await?;
    wait_until("the raw peer is registered", || node.connection_count() == 1).await?;

    let body = big_text();
    for _ in 0..200 {
        node.send(Packet::new(PacketKind::Message, format!("s:alice:{body}")));
    }
    // Give the send worker time to block on the full socket.
    tokio::time::sleep(Duration::from_millis(300)).await;

    tokio::time::timeout(Duration::from_secs(3), node.shutdown())
        .await
        .context("shutdown hung behind a write to a peer that never reads")?;
    assert!(node.is_shut_down());
    assert_eq!(node.connection_count(), 0);
    Ok(())
}

/// A write that stalls past the write timeout drops that peer and the
/// flood carries on to everybody else.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stalled_peer_is_dropped_and_flooding_continues() -> Result<()> {
    let mut config = test_config();
    config.network.write_timeout_ms = 300;
    let alice = ChatClient::start(config, "alice").await?;
    let mut bob = spawn_client("bob").await?;
    link(&bob, &alice).await?;
    let _stalled = raw_join(&addr_of(&alice), 1).await?;
    wait_until("alice holds both links", || alice.node().connection_count() == 2).await?;

    let body = big_text();
    for _ in 0..200 {
        alice.send(ChatMessage::shared(body.clone()));
    }
    wait_until("the stalled peer is dropped", || {
        alice.node().connection_count() == 1
    })
    .await?;
    assert_eq!(alice.node().peers(), vec![addr_of(&bob)]);

    alice.send(ChatMessage::shared("after"));
    let heard = tokio::time::timeout(SETTLE, async {
        while let Some(message) = bob.recv().await {
            if message.text == "after" {
                return true;
            }
        }
        false
    })
    .await
    .context("bob never heard the message sent after the stall")?;
    assert!(heard);

    alice.shutdown().await;
    bob.shutdown().await;
    Ok(())
}
