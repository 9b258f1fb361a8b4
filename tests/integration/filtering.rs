use crate::*;

/// A blocked sender's messages are relayed but never shown.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_block_list_hides_sender() -> Result<()> {
    let alice = spawn_client("alice").await?;
    let mut bob = spawn_client("bob").await?;
    let mut carol = spawn_client("carol").await?;
    link(&bob, &alice).await?;
    link(&carol, &bob).await?;

    assert!(bob.block("alice"));
    alice.send(ChatMessage::shared("can you hear me"));

    let window = Duration::from_millis(800);
    let (at_bob, at_carol) = tokio::join!(collect(&mut bob, window), collect(&mut carol, window));
    assert!(at_bob.is_empty(), "bob blocked alice: {at_bob:?}");
    // Bob still relays to carol.
    assert_eq!(texts(&at_carol), vec!["can you hear me"]);

    bob.unblock("alice");
    alice.send(ChatMessage::shared("and now"));
    assert_eq!(texts(&collect(&mut bob, window).await), vec!["and now"]);

    for client in [&alice, &bob, &carol] {
        client.shutdown().await;
    }
    Ok(())
}

/// Private messages are flooded to everyone but shown only to the
/// addressee and the sender.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_private_message_reaches_only_addressee() -> Result<()> {
    let mut alice = spawn_client("alice").await?;
    let mut bob = spawn_client("bob").await?;
    let mut carol = spawn_client("carol").await?;
    link(&bob, &alice).await?;
    link(&carol, &alice).await?;

    alice.send(ChatMessage::private("carol", "psst"));

    let window = Duration::from_millis(800);
    let (at_alice, at_bob, at_carol) = tokio::join!(
        collect(&mut alice, window),
        collect(&mut bob, window),
        collect(&mut carol, window)
    );
    assert_eq!(texts(&at_alice), vec!["psst"], "sender sees its own private message");
    assert!(at_bob.is_empty(), "bob is not the addressee: {at_bob:?}");
    assert_eq!(texts(&at_carol), vec!["psst"]);
    assert!(at_carol[0].is_private());
    assert_eq!(at_carol[0].addressee(), Some("carol"));

    for client in [&alice, &bob, &carol] {
        client.shutdown().await;
    }
    Ok(())
}
