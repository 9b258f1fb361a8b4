//! Per-connection reader: turns the byte stream into packets.

use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;

use meshchat_core::{Packet, StreamDeframer};

use super::OverlayNode;
use crate::connection::Connection;

pub(super) async fn read_loop(
    node: Arc<OverlayNode>,
    conn: Arc<Connection>,
    mut reader: OwnedReadHalf,
    mut deframer: StreamDeframer,
) {
    let mut buf = vec![0u8; node.config.network.read_buffer.max(1)];

    // Frames that arrived together with the handshake.
    forward_frames(&node, &conn, &mut deframer);

    let reason = loop {
        tokio::select! {
            _ = conn.closed() => {
                tracing::trace!(conn = conn.id, "reader stopped");
                return;
            }

            result = reader.read(&mut buf) => match result {
                Ok(0) => break "closed by peer".to_string(),
                Ok(n) => {
                    let pushed = deframer.push(&buf[..n]);
                    forward_frames(&node, &conn, &mut deframer);
                    if let Err(e) = pushed {
                        break format!("unreadable stream: {e}");
                    }
                }
                Err(e) => break e.to_string(),
            },
        }
    };

    node.connection_lost(conn.id, &reason);
}

fn forward_frames(node: &OverlayNode, conn: &Connection, deframer: &mut StreamDeframer) {
    while let Some(frame) = deframer.next_frame() {
        match Packet::decode(&frame) {
            Ok(packet) => {
                tracing::trace!(conn = conn.id, packet = %packet, "received");
                if node.inbound_tx.send((conn.id, packet)).is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(conn = conn.id, peer = %conn.peer_addr, error = %e, "dropping undecodable frame");
            }
        }
    }
}
