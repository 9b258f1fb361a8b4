//! Join handshake.
//!
//! Connecting side:  CONNECTION →, ← CONFIRMATION, CONFIRMATION(listen port) →
//! Accepting side:   ← CONNECTION, CONFIRMATION →, ← CONFIRMATION(listen port)
//!
//! Handshake reads go through a `StreamDeframer`. Whatever it buffered
//! beyond the last handshake frame is handed to the connection's reader.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use meshchat_core::config::{HandshakeConfig, NetworkConfig};
use meshchat_core::{Packet, PacketKind, StreamDeframer};

use crate::error::NodeError;

/// A socket that completed the handshake.
pub(crate) struct Handshaken {
    pub stream: TcpStream,
    pub deframer: StreamDeframer,
    pub peer_addr: SocketAddr,
    pub local_addr: SocketAddr,
    /// `host:port` the peer accepts joins on.
    pub listen_addr: String,
}

/// Dial `addr` and run the connecting side of the handshake.
pub(crate) async fn connect(
    addr: &str,
    own_port: u16,
    config: &HandshakeConfig,
    network: &NetworkConfig,
) -> Result<Handshaken, NodeError> {
    let handshake = async {
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|source| NodeError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        let mut deframer = StreamDeframer::with_max_frame(network.max_frame_bytes);
        let mut buf = vec![0u8; network.read_buffer.max(1)];

        write_packet(&mut stream, &Packet::new(PacketKind::Connection, "")).await?;

        let reply = read_packet(&mut stream, &mut deframer, &mut buf, addr, config.poll_interval()).await?;
        expect(&reply, PacketKind::Confirmation, addr)?;

        write_packet(
            &mut stream,
            &Packet::new(PacketKind::Confirmation, own_port.to_string()),
        )
        .await?;

        tracing::debug!(peer = addr, "join handshake complete");
        Ok(Handshaken {
            stream,
            deframer,
            peer_addr,
            local_addr,
            listen_addr: addr.to_string(),
        })
    };

    tokio::time::timeout(config.timeout(), handshake)
        .await
        .map_err(|_| NodeError::HandshakeTimeout(addr.to_string()))?
}

/// Run the accepting side of the handshake on a freshly accepted socket.
pub(crate) async fn accept(
    mut stream: TcpStream,
    remote: SocketAddr,
    config: &HandshakeConfig,
    network: &NetworkConfig,
) -> Result<Handshaken, NodeError> {
    let peer = remote.to_string();
    let handshake = async {
        let local_addr = stream.local_addr()?;
        let mut deframer = StreamDeframer::with_max_frame(network.max_frame_bytes);
        let mut buf = vec![0u8; network.read_buffer.max(1)];

        let hello = read_packet(&mut stream, &mut deframer, &mut buf, &peer, config.poll_interval()).await?;
        expect(&hello, PacketKind::Connection, &peer)?;

        write_packet(&mut stream, &Packet::new(PacketKind::Confirmation, "")).await?;

        let confirm = read_packet(&mut stream, &mut deframer, &mut buf, &peer, config.poll_interval()).await?;
        expect(&confirm, PacketKind::Confirmation, &peer)?;

        let port: u16 = confirm
            .payload()
            .trim()
            .parse()
            .map_err(|_| NodeError::InvalidListenPort(peer.clone(), confirm.payload().to_string()))?;
        let listen_addr = SocketAddr::new(remote.ip(), port).to_string();

        tracing::debug!(peer = %remote, listen = %listen_addr, "accept handshake complete");
        Ok(Handshaken {
            stream,
            deframer,
            peer_addr: remote,
            local_addr,
            listen_addr,
        })
    };

    tokio::time::timeout(config.timeout(), handshake)
        .await
        .map_err(|_| NodeError::HandshakeTimeout(peer.clone()))?
}

async fn write_packet(stream: &mut TcpStream, packet: &Packet) -> Result<(), NodeError> {
    let frame = packet.encode()?;
    stream.write_all(&frame).await?;
    Ok(())
}

/// Wait for the next complete frame, re-polling every `poll` while the
/// socket stays quiet. The caller bounds the total wait.
async fn read_packet(
    stream: &mut TcpStream,
    deframer: &mut StreamDeframer,
    buf: &mut [u8],
    peer: &str,
    poll: Duration,
) -> Result<Packet, NodeError> {
    loop {
        if let Some(frame) = deframer.next_frame() {
            return Ok(Packet::decode(&frame)?);
        }
        match tokio::time::timeout(poll, stream.read(buf)).await {
            Err(_) => {
                tracing::trace!(peer, "no handshake reply yet");
            }
            Ok(Ok(0)) => return Err(NodeError::Closed(peer.to_string())),
            Ok(Ok(n)) => {
                deframer.push(&buf[..n])?;
            }
            Ok(Err(e)) => return Err(e.into()),
        }
    }
}

fn expect(packet: &Packet, kind: PacketKind, peer: &str) -> Result<(), NodeError> {
    if packet.kind() == kind {
        Ok(())
    } else {
        Err(NodeError::UnexpectedPacket {
            peer: peer.to_string(),
            expected: kind,
            got: packet.kind(),
        })
    }
}
