//! Chat client: nicknames, presence and filtering on top of an
//! [`OverlayNode`].
//!
//! The client owns the node's inbox. Presence packets are consumed here and
//! never surface as messages; chat messages are decoded and filtered
//! against the block list and private addressing before they are returned.

mod blocklist;
mod presence;

pub use blocklist::BlockList;
pub use presence::PresenceTable;

use std::sync::{Arc, RwLock};

use tokio_util::sync::CancellationToken;

use meshchat_core::{ChatMessage, MeshConfig, Packet, PacketKind};

use crate::error::NodeError;
use crate::node::{Inbox, OverlayNode};
use crate::task::RepeatingTask;

pub struct ChatClient {
    shared: Arc<ClientShared>,
    inbox: Inbox,
    heartbeat: RepeatingTask,
    refresher: RepeatingTask,
    shutdown: CancellationToken,
}

struct ClientShared {
    node: Arc<OverlayNode>,
    nickname: RwLock<String>,
    presence: PresenceTable,
    blocked: BlockList,
}

impl ClientShared {
    fn nickname(&self) -> String {
        self.nickname
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Flood a presence packet carrying `nickname`.
    fn announce(&self, kind: PacketKind, nickname: String) -> Packet {
        let packet = Packet::new(kind, nickname);
        self.node.mark_received(packet.id());
        self.node.send(packet.clone());
        packet
    }
}

impl ChatClient {
    /// Start a node and the client's heartbeat and presence tasks.
    pub async fn start(config: MeshConfig, nickname: impl Into<String>) -> Result<Self, NodeError> {
        let presence = config.presence.clone();
        let (node, inbox) = OverlayNode::start(config).await?;

        let shared = Arc::new(ClientShared {
            node,
            nickname: RwLock::new(nickname.into()),
            presence: PresenceTable::new(),
            blocked: BlockList::new(),
        });

        let shutdown = CancellationToken::new();
        let heartbeat = RepeatingTask::new("heartbeat", presence.heartbeat(), &shutdown);
        let refresher = RepeatingTask::new("presence-refresh", presence.refresh(), &shutdown);

        let s = shared.clone();
        heartbeat.start(move || {
            s.announce(PacketKind::Online, s.nickname());
            std::future::ready(())
        });

        let s = shared.clone();
        let stale_after = presence.stale_after();
        refresher.start(move || {
            let evicted = s.presence.evict_stale(stale_after);
            if evicted > 0 {
                tracing::debug!(evicted, "presence entries expired");
            }
            std::future::ready(())
        });

        tracing::info!(nickname = %shared.nickname(), "chat client started");
        Ok(Self {
            shared,
            inbox,
            heartbeat,
            refresher,
            shutdown,
        })
    }

    /// Start with the configured nickname and join `network.join` if set.
    pub async fn connect(config: MeshConfig) -> Result<Self, NodeError> {
        let join = config.network.join_addr().map(str::to_owned);
        let nickname = config.chat.nickname.clone();
        let client = Self::start(config, nickname).await?;
        if let Some(addr) = join {
            client.join(&addr).await?;
        }
        Ok(client)
    }

    /// Join the mesh through `addr` and announce this client.
    pub async fn join(&self, addr: &str) -> Result<(), NodeError> {
        self.shared.node.join(addr).await?;
        self.shared.announce(PacketKind::Login, self.nickname());
        Ok(())
    }

    // ── Messages ─────────────────────────────────────────────────────────────

    /// Stamp `message` with this client's nickname and flood it.
    ///
    /// The message is also delivered to this client's own inbox once.
    pub fn send(&self, mut message: ChatMessage) -> ChatMessage {
        message.sender = self.nickname();
        let packet = Packet::new(PacketKind::Message, message.encode());
        let node = &self.shared.node;
        node.mark_received(packet.id());
        node.deliver_local(packet.clone());
        node.send(packet);
        message
    }

    /// Handle the next inbox packet, if any.
    ///
    /// Returns `None` when the inbox is empty and also when the packet was
    /// presence traffic or a filtered message.
    pub fn poll(&mut self) -> Option<ChatMessage> {
        let packet = self.inbox.try_recv().ok()?;
        self.handle(packet)
    }

    /// Handle every packet already in the inbox and return the messages
    /// among them.
    pub fn drain(&mut self) -> Vec<ChatMessage> {
        let mut messages = Vec::new();
        while let Ok(packet) = self.inbox.try_recv() {
            messages.extend(self.handle(packet));
        }
        messages
    }

    /// Wait for the next message meant for this client.
    pub async fn recv(&mut self) -> Option<ChatMessage> {
        loop {
            let packet = self.inbox.recv().await?;
            if let Some(message) = self.handle(packet) {
                return Some(message);
            }
        }
    }

    fn handle(&self, packet: Packet) -> Option<ChatMessage> {
        match packet.kind() {
            PacketKind::Online | PacketKind::Login => {
                self.shared.presence.touch(packet.payload());
                None
            }
            PacketKind::Logout => {
                self.shared.presence.remove(packet.payload());
                None
            }
            PacketKind::Message => {
                let message = match ChatMessage::decode(packet.payload()) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!(id = packet.id(), error = %e, "dropping undecodable message");
                        return None;
                    }
                };
                if self.shared.blocked.is_blocked(&message.sender) {
                    tracing::debug!(sender = %message.sender, "message from blocked sender dropped");
                    return None;
                }
                if message.is_private() {
                    let me = self.nickname();
                    let to_me = message.addressee() == Some(me.as_str());
                    if !to_me && message.sender != me {
                        return None;
                    }
                }
                Some(message)
            }
            other => {
                tracing::trace!(kind = %other, "ignoring non-chat packet");
                None
            }
        }
    }

    // ── Nickname ─────────────────────────────────────────────────────────────

    pub fn nickname(&self) -> String {
        self.shared.nickname()
    }

    /// Rename this client. The room hears "changed nickname to <new>" from
    /// the old name, then presence moves over.
    ///
    /// Returns false if `new` is blank or unchanged.
    pub fn set_nickname(&self, new: &str) -> bool {
        let new = new.trim();
        let old = self.nickname();
        if new.is_empty() || new == old {
            return false;
        }

        self.send(ChatMessage::shared(format!("changed nickname to {new}")));
        self.shared.announce(PacketKind::Logout, old.clone());
        *self
            .shared
            .nickname
            .write()
            .unwrap_or_else(|p| p.into_inner()) = new.to_owned();
        self.shared.announce(PacketKind::Login, new.to_owned());

        tracing::info!(old = %old, new = %new, "nickname changed");
        true
    }

    // ── Presence ─────────────────────────────────────────────────────────────

    /// Sorted nicknames heard from within the presence window.
    pub fn presence_snapshot(&self) -> Vec<String> {
        self.shared.presence.snapshot()
    }

    /// Evict stale presence entries now instead of waiting for the refresh
    /// task. Returns how many were dropped.
    pub fn refresh_presence(&self) -> usize {
        let stale_after = self.shared.node.config().presence.stale_after();
        self.shared.presence.evict_stale(stale_after)
    }

    // ── Block list ───────────────────────────────────────────────────────────

    pub fn block(&self, nickname: &str) -> bool {
        self.shared.blocked.block(nickname)
    }

    pub fn unblock(&self, nickname: &str) -> bool {
        self.shared.blocked.unblock(nickname)
    }

    pub fn is_blocked(&self, nickname: &str) -> bool {
        self.shared.blocked.is_blocked(nickname)
    }

    pub fn blocked(&self) -> Vec<String> {
        self.shared.blocked.snapshot()
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    pub fn node(&self) -> &Arc<OverlayNode> {
        &self.shared.node
    }

    /// Stop the client's tasks, say goodbye and shut the node down.
    pub async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        self.heartbeat.stop();
        self.refresher.stop();

        let node = &self.shared.node;
        let logout = Packet::new(PacketKind::Logout, self.nickname());
        node.mark_received(logout.id());
        let told = node.send_now(logout).await;
        tracing::debug!(peers = told, "sent logout");

        node.shutdown().await;
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.shared.node.abort();
    }
}
