use crate::*;

/// Full mesh: every node gets a message exactly once despite the
/// redundant paths.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_mesh_delivers_exactly_once() -> Result<()> {
    let mut alice = spawn_client("alice").await?;
    let mut bob = spawn_client("bob").await?;
    let mut carol = spawn_client("carol").await?;

    link(&bob, &alice).await?;
    link(&carol, &alice).await?;
    link(&carol, &bob).await?;
    for client in [&alice, &bob, &carol] {
        assert_eq!(client.node().connection_count(), 2);
    }

    alice.send(ChatMessage::shared("hello mesh"));

    let window = Duration::from_millis(800);
    let (at_alice, at_bob, at_carol) = tokio::join!(
        collect(&mut alice, window),
        collect(&mut bob, window),
        collect(&mut carol, window)
    );
    assert_eq!(texts(&at_alice), vec!["hello mesh"], "local echo only once");
    assert_eq!(texts(&at_bob), vec!["hello mesh"]);
    assert_eq!(texts(&at_carol), vec!["hello mesh"]);
    assert_eq!(at_carol[0].sender, "alice");

    for client in [&alice, &bob, &carol] {
        client.shutdown().await;
    }
    Ok(())
}

/// Line topology: the middle node relays to the far end.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_message_crosses_two_hops() -> Result<()> {
    let alice = spawn_client("alice").await?;
    let bob = spawn_client("bob").await?;
    let mut carol = spawn_client("carol").await?;

    link(&bob, &alice).await?;
    link(&carol, &bob).await?;
    assert_eq!(alice.node().connection_count(), 1);

    alice.send(ChatMessage::shared("over the hill"));

    let received = collect(&mut carol, Duration::from_millis(800)).await;
    assert_eq!(texts(&received), vec!["over the hill"]);

    for client in [&alice, &bob, &carol] {
        client.shutdown().await;
    }
    Ok(())
}

/// Messages flow both ways over a single link, texts with colons intact.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_replies_flow_back() -> Result<()> {
    let mut alice = spawn_client("alice").await?;
    let mut bob = spawn_client("bob").await?;
    link(&bob, &alice).await?;

    bob.send(ChatMessage::shared("ping at 12:00:01"));
    let got = tokio::time::timeout(SETTLE, alice.recv())
        .await?
        .context("alice inbox closed")?;
    assert_eq!(got.text, "ping at 12:00:01");
    assert_eq!(got.sender, "bob");

    alice.send(ChatMessage::shared("pong"));
    let at_bob = collect(&mut bob, Duration::from_millis(500)).await;
    assert_eq!(texts(&at_bob), vec!["ping at 12:00:01", "pong"]);

    alice.shutdown().await;
    bob.shutdown().await;
    Ok(())
}
