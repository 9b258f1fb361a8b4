use crate::*;

/// Joining nodes learn each other's listen addresses through the node they
/// both joined, without ever connecting directly.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_addresses_spread_through_hub() -> Result<()> {
    let hub = spawn_client("hub").await?;
    let bob = spawn_client("bob").await?;
    let carol = spawn_client("carol").await?;
    let (hub_addr, bob_addr, carol_addr) = (addr_of(&hub), addr_of(&bob), addr_of(&carol));

    link(&bob, &hub).await?;
    link(&carol, &hub).await?;

    // Carol asked with GET_IP after bob was already known to the hub.
    wait_until("carol learns bob", || {
        carol.node().known_addresses().contains(&bob_addr)
    })
    .await?;
    // Bob heard the hub announce carol's arrival.
    wait_until("bob learns carol", || {
        bob.node().known_addresses().contains(&carol_addr)
    })
    .await?;

    let known = carol.node().known_addresses();
    assert_eq!(known.first(), Some(&hub_addr), "join target is heard first");
    assert_eq!(
        known.iter().filter(|a| **a == bob_addr).count(),
        1,
        "no duplicates: {known:?}"
    );
    assert_eq!(bob.node().connection_count(), 1);
    assert_eq!(carol.node().connection_count(), 1);

    for client in [&hub, &bob, &carol] {
        client.shutdown().await;
    }
    Ok(())
}
