//! Send worker: dequeues outbound packets and floods them to every
//! connection in turn.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use meshchat_core::Packet;

use super::OverlayNode;

pub(super) struct SendWorker {
    node: Arc<OverlayNode>,
    queue: mpsc::UnboundedReceiver<Packet>,
    shutdown: CancellationToken,
}

impl SendWorker {
    pub fn new(
        node: Arc<OverlayNode>,
        queue: mpsc::UnboundedReceiver<Packet>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            node,
            queue,
            shutdown,
        }
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("send worker shutting down");
                    return Ok(());
                }

                next = self.queue.recv() => {
                    let packet = match next {
                        Some(p) => p,
                        None => {
                            tracing::info!("send queue closed, send worker exiting");
                            return Ok(());
                        }
                    };
                    flood(&self.node, &packet).await;
                }
            }
        }
    }
}

/// Write `packet` to every live connection, in table order.
///
/// A peer whose write fails or stalls past the write timeout is dropped and
/// the rest still get the frame. Returns how many connections took it.
pub(super) async fn flood(node: &OverlayNode, packet: &Packet) -> usize {
    let frame = match packet.encode() {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(packet = %packet, error = %e, "cannot frame packet, dropping");
            return 0;
        }
    };

    let targets = node.connections.snapshot();
    tracing::trace!(packet = %packet, peers = targets.len(), "flooding");

    let mut written = 0;
    for conn in targets {
        if node.shutdown.is_cancelled() {
            break;
        }
        if conn.is_closed() {
            continue;
        }
        match conn.send(&frame).await {
            Ok(()) => written += 1,
            Err(e) => {
                tracing::debug!(conn = conn.id, peer = %conn.peer_addr, error = %e, "write failed");
                node.connection_lost(conn.id, &e.to_string());
            }
        }
    }
    written
}
