//! meshchat integration test harness.
//!
//! Every test builds a small mesh of real nodes on loopback TCP inside the
//! test process. Listeners bind port 0, so tests can run in parallel.
//!
//!   cargo test --test integration
//!
//! Timing knobs are shrunk (see `test_config`) so presence and repair
//! scenarios finish in seconds.

use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use meshchat_core::{ChatMessage, MeshConfig, Packet, PacketKind, StreamDeframer};
use meshchat_node::{ChatClient, OverlayNode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

mod filtering;
mod flood;
mod gossip;
mod presence;
mod repair;
mod stalled;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Upper bound for anything that should happen "soon".
pub const SETTLE: Duration = Duration::from_secs(10);

/// Loopback config with short timers.
pub fn test_config() -> MeshConfig {
    let mut config = MeshConfig::default();
    config.network.bind_addr = "127.0.0.1".into();
    config.network.listen_port = 0;
    config.handshake.confirmation_poll_ms = 20;
    config.handshake.timeout_secs = 3;
    config.repair.max_rounds = 5;
    config.repair.initial_backoff_ms = 100;
    config.repair.max_backoff_ms = 800;
    config.presence.heartbeat_secs = 1;
    config.presence.refresh_secs = 1;
    config.presence.stale_secs = 3;
    config
}

pub async fn spawn_client(nickname: &str) -> Result<ChatClient> {
    ChatClient::start(test_config(), nickname)
        .await
        .with_context(|| format!("failed to start {nickname}"))
}

/// `host:port` other nodes join `client` on.
pub fn addr_of(client: &ChatClient) -> String {
    client.node().listen_addr().to_string()
}

/// Join `joiner` to `target` and wait until both sides list the link.
pub async fn link(joiner: &ChatClient, target: &ChatClient) -> Result<()> {
    let before = target.node().connection_count();
    joiner
        .join(&addr_of(target))
        .await
        .with_context(|| format!("{} failed to join {}", joiner.nickname(), target.nickname()))?;
    wait_until("accepting side registers the link", || {
        target.node().connection_count() > before
    })
    .await
}

/// Join `target` by hand and return the socket without ever reading from
/// it again. The node sees a peer announcing `listen_port`.
pub async fn raw_join(target: &str, listen_port: u16) -> Result<TcpStream> {
    let handshake = async {
        let mut stream = TcpStream::connect(target).await?;
        stream
            .write_all(&Packet::new(PacketKind::Connection, "").encode()?)
            .await?;

        let mut deframer = StreamDeframer::new();
        let mut buf = [0u8; 256];
        let reply = loop {
            if let Some(frame) = deframer.next_frame() {
                break Packet::decode(&frame)?;
            }
            let n = stream.read(&mut buf).await?;
            ensure!(n > 0, "{target} closed during the handshake");
            deframer.push(&buf[..n])?;
        };
        ensure!(
            reply.kind() == PacketKind::Confirmation,
            "expected CONFIRMATION, got {}",
            reply.kind()
        );

        let confirm = Packet::new(PacketKind::Confirmation, listen_port.to_string());
        stream.write_all(&confirm.encode()?).await?;
        Ok::<_, anyhow::Error>(stream)
    };
    tokio::time::timeout(SETTLE, handshake)
        .await
        .with_context(|| format!("handshake with {target} timed out"))?
}

/// Poll `check` every 20ms until it holds or `SETTLE` passes.
pub async fn wait_until(what: &str, mut check: impl FnMut() -> bool) -> Result<()> {
    let deadline = tokio::time::Instant::now() + SETTLE;
    while !check() {
        if tokio::time::Instant::now() >= deadline {
            bail!("timed out waiting until {what}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Ok(())
}

/// Every message `client` receives within `window`.
pub async fn collect(client: &mut ChatClient, window: Duration) -> Vec<ChatMessage> {
    let deadline = tokio::time::Instant::now() + window;
    let mut messages = Vec::new();
    while let Ok(Some(message)) = tokio::time::timeout_at(deadline, client.recv()).await {
        messages.push(message);
    }
    messages
}

/// Texts of `messages`, for compact assertions.
pub fn texts(messages: &[ChatMessage]) -> Vec<&str> {
    messages.iter().map(|m| m.text.as_str()).collect()
}
