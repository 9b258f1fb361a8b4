use crate::*;

/// LOGIN on join, ONLINE heartbeats keep the entry, LOGOUT removes it.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_presence_follows_login_and_logout() -> Result<()> {
    let mut alice = spawn_client("alice").await?;
    let bob = spawn_client("bob").await?;
    link(&bob, &alice).await?;

    wait_until("alice sees bob", || {
        alice.drain();
        alice.presence_snapshot() == vec!["bob".to_string()]
    })
    .await?;

    // Several stale windows later bob is still there thanks to heartbeats.
    tokio::time::sleep(Duration::from_secs(4)).await;
    alice.drain();
    alice.refresh_presence();
    assert_eq!(alice.presence_snapshot(), vec!["bob"]);

    bob.shutdown().await;
    wait_until("bob logs out", || {
        alice.drain();
        alice.presence_snapshot().is_empty()
    })
    .await?;

    alice.shutdown().await;
    Ok(())
}

/// A peer that vanishes without LOGOUT ages out after the stale window.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_silent_peer_ages_out() -> Result<()> {
    let mut alice = spawn_client("alice").await?;
    let bob = spawn_client("bob").await?;
    link(&bob, &alice).await?;

    wait_until("alice sees bob", || {
        alice.drain();
        alice.presence_snapshot().contains(&"bob".to_string())
    })
    .await?;

    // Dropping skips the goodbye.
    drop(bob);
    let gone_after = tokio::time::Instant::now();
    wait_until("bob ages out", || {
        alice.drain();
        alice.presence_snapshot().is_empty()
    })
    .await?;
    assert!(
        gone_after.elapsed() >= Duration::from_secs(1),
        "evicted by staleness, not by a logout"
    );

    alice.shutdown().await;
    Ok(())
}

/// A rename shows up as a notice from the old name and moves presence.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rename_is_announced() -> Result<()> {
    let mut alice = spawn_client("alice").await?;
    let bob = spawn_client("bob").await?;
    link(&bob, &alice).await?;

    assert!(bob.set_nickname("robert"));
    let notice = tokio::time::timeout(SETTLE, alice.recv())
        .await?
        .context("alice inbox closed")?;
    assert_eq!(notice.sender, "bob");
    assert_eq!(notice.text, "changed nickname to robert");

    wait_until("presence moves to the new name", || {
        alice.drain();
        alice.presence_snapshot() == vec!["robert".to_string()]
    })
    .await?;

    alice.shutdown().await;
    bob.shutdown().await;
    Ok(())
}
