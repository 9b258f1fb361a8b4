//! The overlay node: listener, connection table, flood routing and repair.
//!
//! Task layout once started:
//!
//! ```text
//!   accept loop ──► handshake ──► register ──► reader (per connection)
//!                                                 │ decoded packets
//!                                                 ▼
//!   send() ──► send queue ──► SendWorker      dispatch loop ──► inbox
//!                               │  write failure      │
//!                               ▼                     ▼
//!                       connection_lost ──► repair worker
//! ```
//!
//! Every task selects on the node's cancellation token and exits at its
//! next await point after `shutdown`.

mod dispatch;
mod handshake;
mod reader;
mod repair;
mod send_worker;

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use meshchat_core::{MeshConfig, Packet, PacketKind};

use crate::addresses::KnownAddresses;
use crate::connection::{ConnId, Connection, ConnectionTable, Direction};
use crate::dedup::SeenSet;
use crate::error::NodeError;
use crate::task::RepeatingTask;

use handshake::Handshaken;
use send_worker::SendWorker;

/// Packets addressed to the application layer, in arrival order.
pub type Inbox = mpsc::UnboundedReceiver<Packet>;

/// Counters for logging and tests.
#[derive(Debug, Default)]
pub struct NodeStats {
    /// Packets accepted onto the send queue.
    pub queued: AtomicU64,
    /// Inbound packets dropped because their id was already seen.
    pub duplicates: AtomicU64,
    /// Packets pushed to the inbox.
    pub delivered: AtomicU64,
}

pub struct OverlayNode {
    config: MeshConfig,
    listen_addr: SocketAddr,
    connections: ConnectionTable,
    known: KnownAddresses,
    sent: SeenSet,
    received: SeenSet,
    send_tx: mpsc::UnboundedSender<Packet>,
    inbound_tx: mpsc::UnboundedSender<(ConnId, Packet)>,
    inbox_tx: mpsc::UnboundedSender<Packet>,
    repair_tx: mpsc::UnboundedSender<()>,
    handshake_lock: Mutex<()>,
    stats: NodeStats,
    pruner: RepeatingTask,
    shutdown: CancellationToken,
}

impl OverlayNode {
    /// Bind the listener and spawn the node's background tasks.
    pub async fn start(config: MeshConfig) -> Result<(Arc<Self>, Inbox), NodeError> {
        let bind = config.network.listen_on();
        let listener = TcpListener::bind(&bind)
            .await
            .map_err(|source| NodeError::Bind {
                addr: bind.clone(),
                source,
            })?;
        let listen_addr = listener.local_addr()?;

        let (send_tx, send_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (repair_tx, repair_rx) = mpsc::unbounded_channel();

        let shutdown = CancellationToken::new();
        let window = config.dedup.window();
        let connections = ConnectionTable::new(config.network.write_timeout());
        let pruner = RepeatingTask::new("dedup-prune", config.dedup.prune_every(), &shutdown);

        let node = Arc::new(Self {
            config,
            listen_addr,
            connections,
            known: KnownAddresses::new(),
            sent: SeenSet::new(window),
            received: SeenSet::new(window),
            send_tx,
            inbound_tx,
            inbox_tx,
            repair_tx,
            handshake_lock: Mutex::new(()),
            stats: NodeStats::default(),
            pruner,
            shutdown,
        });

        tokio::spawn(node.clone().accept_loop(listener));
        tokio::spawn(node.clone().dispatch_loop(inbound_rx));
        tokio::spawn(node.clone().repair_loop(repair_rx));
        let worker = SendWorker::new(node.clone(), send_rx, node.shutdown.clone());
        tokio::spawn(async move {
            if let Err(e) = worker.run().await {
                tracing::error!(error = %e, "send worker failed");
            }
        });

        let sent = node.sent.clone();
        let received = node.received.clone();
        node.pruner.start(move || {
            let pruned = sent.prune() + received.prune();
            if pruned > 0 {
                tracing::debug!(pruned, "forgot expired packet ids");
            }
            std::future::ready(())
        });

        tracing::info!(listen = %listen_addr, "overlay node listening");
        Ok((node, inbox_rx))
    }

    // ── Joining ──────────────────────────────────────────────────────────────

    /// Connect to the mesh through the node listening on `addr`.
    ///
    /// The new connection becomes this node's primary link.
    pub async fn join(self: &Arc<Self>, addr: &str) -> Result<(), NodeError> {
        if self.shutdown.is_cancelled() {
            return Err(NodeError::ShutDown);
        }

        {
            let _guard = self.handshake_lock.lock().await;
            let hs = handshake::connect(
                addr,
                self.listen_addr.port(),
                &self.config.handshake,
                &self.config.network,
            )
            .await?;
            let conn = self.register(hs, Direction::Outbound);
            self.connections.set_primary(conn.id);
            self.known.add(addr);
        }

        let question = Packet::new(PacketKind::GetIp, "");
        self.received.insert(question.id());
        self.send(question);

        tracing::info!(peer = addr, "joined mesh");
        Ok(())
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("accept loop shutting down");
                    return;
                }

                result = listener.accept() => {
                    let (stream, remote) = match result {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            continue;
                        }
                    };
                    tokio::spawn(self.clone().handle_inbound(stream, remote));
                }
            }
        }
    }

    async fn handle_inbound(self: Arc<Self>, stream: TcpStream, remote: SocketAddr) {
        let hs = tokio::select! {
            _ = self.shutdown.cancelled() => return,
            result = handshake::accept(
                stream,
                remote,
                &self.config.handshake,
                &self.config.network,
            ) => match result {
                Ok(hs) => hs,
                Err(e) => {
                    tracing::warn!(peer = %remote, error = %e, "inbound handshake failed");
                    return;
                }
            },
        };

        let listen = hs.listen_addr.clone();
        {
            let _guard = self.handshake_lock.lock().await;
            if self.shutdown.is_cancelled() {
                return;
            }
            self.register(hs, Direction::Inbound);
            self.known.add(&listen);
        }

        self.send(Packet::new(PacketKind::Ip, format!("/{listen}")));
        tracing::info!(peer = %remote, listen = %listen, "peer joined through us");
    }

    /// Put a handshaken socket in the table and start its reader.
    fn register(self: &Arc<Self>, hs: Handshaken, direction: Direction) -> Arc<Connection> {
        let (read, write) = hs.stream.into_split();
        let conn = self.connections.insert(
            direction,
            hs.peer_addr,
            hs.local_addr,
            hs.listen_addr,
            write,
            self.shutdown.child_token(),
        );
        tracing::debug!(
            conn = conn.id,
            peer = %conn.peer_addr,
            listen = %conn.listen_addr,
            ?direction,
            "connection registered"
        );
        tokio::spawn(reader::read_loop(self.clone(), conn.clone(), read, hs.deframer));
        conn
    }

    // ── Sending ──────────────────────────────────────────────────────────────

    /// Queue `packet` for flooding to every connection.
    ///
    /// Returns false if a packet with the same id was already sent.
    pub fn send(&self, packet: Packet) -> bool {
        if !self.sent.insert(packet.id()) {
            tracing::trace!(id = packet.id(), "already sent, dropping");
            return false;
        }
        if self.send_tx.send(packet).is_err() {
            return false;
        }
        self.stats.queued.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Flood `packet` right away, bypassing the send queue.
    ///
    /// Used for last words before shutdown. Returns how many connections
    /// took the frame.
    pub async fn send_now(&self, packet: Packet) -> usize {
        if !self.sent.insert(packet.id()) {
            return 0;
        }
        send_worker::flood(self, &packet).await
    }

    /// Record `id` as received so the packet is dropped if it loops back.
    pub fn mark_received(&self, id: u64) -> bool {
        self.received.insert(id)
    }

    /// Push a packet straight to this node's inbox.
    pub fn deliver_local(&self, packet: Packet) {
        if self.inbox_tx.send(packet).is_ok() {
            self.stats.delivered.fetch_add(1, Ordering::Relaxed);
        }
    }

    // ── Failures ─────────────────────────────────────────────────────────────

    /// Drop a connection whose read or write failed.
    ///
    /// Losing the primary link requests repair. Safe to call more than once
    /// for the same id; only the first call acts.
    pub(crate) fn connection_lost(&self, id: ConnId, reason: &str) {
        let Some(conn) = self.connections.remove(id) else {
            return;
        };
        conn.abort();

        if self.shutdown.is_cancelled() {
            return;
        }
        if self.connections.clear_primary_if(id) {
            tracing::warn!(
                peer = %conn.peer_addr,
                listen = %conn.listen_addr,
                reason,
                "primary connection lost, repairing"
            );
            let _ = self.repair_tx.send(());
        } else {
            tracing::info!(peer = %conn.peer_addr, reason, "peer connection dropped");
        }
    }

    // ── Introspection ────────────────────────────────────────────────────────

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Listen addresses of the peers currently connected.
    pub fn peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self
            .connections
            .snapshot()
            .iter()
            .map(|c| c.listen_addr.clone())
            .collect();
        peers.sort();
        peers
    }

    pub fn known_addresses(&self) -> Vec<String> {
        self.known.snapshot()
    }

    pub fn has_primary(&self) -> bool {
        self.connections.primary().is_some()
    }

    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Whether `addr` names this node's own listener.
    pub(crate) fn is_own_address(&self, addr: &str) -> bool {
        let Ok(addr) = addr.parse::<SocketAddr>() else {
            return false;
        };
        if addr.port() != self.listen_addr.port() {
            return false;
        }
        let ip = addr.ip();
        ip.is_loopback()
            || ip.is_unspecified()
            || ip == self.listen_addr.ip()
            || self.local_ips().contains(&ip)
    }

    /// IPs peers have seen this node connect from.
    fn local_ips(&self) -> Vec<IpAddr> {
        self.connections
            .snapshot()
            .iter()
            .map(|c| c.local_addr.ip())
            .collect()
    }

    // ── Shutdown ─────────────────────────────────────────────────────────────

    /// Stop every task and close every connection.
    pub async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        self.pruner.stop();
        for conn in self.connections.drain() {
            conn.close().await;
        }
        tracing::info!(listen = %self.listen_addr, "overlay node shut down");
    }

    /// Synchronous variant of `shutdown` for drop paths. Sockets close as
    /// their last handles drop instead of being shut down in place.
    pub fn abort(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        self.pruner.stop();
        for conn in self.connections.drain() {
            conn.abort();
        }
    }
}
