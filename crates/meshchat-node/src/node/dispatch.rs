//! Inbound packet routing.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;

use meshchat_core::{Packet, PacketKind};

use super::OverlayNode;
use crate::connection::ConnId;

impl OverlayNode {
    pub(super) async fn dispatch_loop(self: Arc<Self>, mut inbound: mpsc::UnboundedReceiver<(ConnId, Packet)>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::debug!("dispatch loop shutting down");
                    return;
                }

                next = inbound.recv() => match next {
                    Some((conn, packet)) => self.dispatch(conn, packet),
                    None => return,
                },
            }
        }
    }

    /// Route one decoded packet.
    ///
    /// Each id is handled at most once; repeats are dropped before any
    /// side effect.
    pub(crate) fn dispatch(&self, conn: ConnId, packet: Packet) {
        if !self.received.insert(packet.id()) {
            self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(conn, id = packet.id(), kind = %packet.kind(), "duplicate dropped");
            return;
        }

        match packet.kind() {
            PacketKind::Message | PacketKind::Online | PacketKind::Login | PacketKind::Logout => {
                self.deliver_local(packet.clone());
                self.send(packet);
            }

            PacketKind::Ip => {
                match gossiped_address(packet.payload()) {
                    Some(addr) => {
                        if self.known.add(addr) {
                            tracing::debug!(conn, addr, "learned address");
                        }
                    }
                    None => {
                        tracing::warn!(conn, payload = packet.payload(), "malformed IP packet");
                    }
                }
                self.send(packet);
            }

            PacketKind::GetIp => {
                let question = packet.id();
                self.send(packet);
                for addr in self.known.snapshot() {
                    self.send(Packet::new(PacketKind::Ip, format!("{question}/{addr}")));
                }
            }

            PacketKind::Connection | PacketKind::Confirmation | PacketKind::Data => {
                tracing::trace!(conn, kind = %packet.kind(), "ignoring packet outside handshake");
            }
        }
    }
}

/// Address part of an IP payload `"<tag>/<host:port>"`.
fn gossiped_address(payload: &str) -> Option<&str> {
    let (_, addr) = payload.split_once('/')?;
    let addr = addr.trim();
    (!addr.is_empty()).then_some(addr)
}
