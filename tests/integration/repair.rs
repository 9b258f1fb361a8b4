use crate::*;

/// Carol joined through the hub and heard about bob by gossip. When the hub
/// dies, carol re-attaches to bob on her own and chat keeps flowing.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_primary_loss_repairs_through_gossip() -> Result<()> {
    let hub = spawn_client("hub").await?;
    let mut bob = spawn_client("bob").await?;
    let carol = spawn_client("carol").await?;
    let bob_addr = addr_of(&bob);

    link(&bob, &hub).await?;
    link(&carol, &hub).await?;
    wait_until("carol learns bob", || {
        carol.node().known_addresses().contains(&bob_addr)
    })
    .await?;
    assert!(carol.node().peers().iter().all(|p| *p != bob_addr));

    hub.shutdown().await;

    wait_until("carol is linked to bob", || {
        carol.node().has_primary() && carol.node().peers().contains(&bob_addr)
    })
    .await?;

    bob.drain();
    carol.send(ChatMessage::shared("still here"));
    let got = tokio::time::timeout(SETTLE, bob.recv())
        .await?
        .context("bob inbox closed")?;
    assert_eq!(got.text, "still here");

    carol.shutdown().await;
    bob.shutdown().await;
    Ok(())
}

/// With nowhere to go, repair gives up and the node stays up, partitioned.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_repair_without_alternatives_gives_up() -> Result<()> {
    let hub = spawn_client("hub").await?;
    let bob = spawn_client("bob").await?;
    link(&bob, &hub).await?;
    assert!(bob.node().has_primary());

    hub.shutdown().await;
    wait_until("bob drops the dead link", || bob.node().connection_count() == 0).await?;

    // Five short rounds: 100 + 200 + 400 + 800 ms of backoff.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!bob.node().has_primary());
    assert!(!bob.node().is_shut_down());

    bob.shutdown().await;
    Ok(())
}

/// A manual join after a failed repair restores connectivity.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_manual_join_after_partition() -> Result<()> {
    let hub = spawn_client("hub").await?;
    let bob = spawn_client("bob").await?;
    let mut carol = spawn_client("carol").await?;
    link(&bob, &hub).await?;

    hub.shutdown().await;
    wait_until("bob drops the dead link", || bob.node().connection_count() == 0).await?;

    link(&bob, &carol).await?;
    assert!(bob.node().has_primary());
    carol.drain();
    bob.send(ChatMessage::shared("back"));
    let got = tokio::time::timeout(SETTLE, carol.recv())
        .await?
        .context("carol inbox closed")?;
    assert_eq!(got.text, "back");

    bob.shutdown().await;
    carol.shutdown().await;
    Ok(())
}

/// Losing a peer that joined through us removes that link only. The primary
/// stays and no repair dial goes out.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_losing_an_inbound_peer_does_not_repair() -> Result<()> {
    let hub = spawn_client("hub").await?;
    let alice = spawn_client("alice").await?;
    let bob = spawn_client("bob").await?;
    let (hub_addr, bob_addr) = (addr_of(&hub), addr_of(&bob));

    link(&alice, &hub).await?;
    link(&bob, &alice).await?;
    assert!(alice.node().has_primary());
    assert_eq!(alice.node().connection_count(), 2);
    wait_until("alice records bob", || {
        alice.node().known_addresses().contains(&bob_addr)
    })
    .await?;
    // Let the join gossip settle before taking the baseline.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let known_before = alice.node().known_addresses();

    bob.shutdown().await;
    wait_until("alice drops bob's link", || {
        alice.node().connection_count() == 1
    })
    .await?;
    assert!(alice.node().has_primary());
    assert_eq!(alice.node().peers(), vec![hub_addr.clone()]);

    // Longer than the first repair rounds would take.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(alice.node().connection_count(), 1);
    assert_eq!(alice.node().peers(), vec![hub_addr]);
    assert_eq!(alice.node().known_addresses(), known_before);

    alice.shutdown().await;
    hub.shutdown().await;
    Ok(())
}
