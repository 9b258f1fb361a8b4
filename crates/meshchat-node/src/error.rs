use std::io;

use meshchat_core::wire::{PacketKind, WireError};

/// Failures surfaced by the overlay node.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("handshake with {peer}: expected {expected}, got {got}")]
    UnexpectedPacket {
        peer: String,
        expected: PacketKind,
        got: PacketKind,
    },

    #[error("handshake with {0} timed out")]
    HandshakeTimeout(String),

    #[error("{0} sent an invalid listen port: {1:?}")]
    InvalidListenPort(String, String),

    #[error("connection to {0} closed")]
    Closed(String),

    #[error("node is shut down")]
    ShutDown,

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl NodeError {
    /// Worth retrying against the same or another peer.
    pub fn is_transient(&self) -> bool {
        match self {
            NodeError::Connect { .. }
            | NodeError::HandshakeTimeout(_)
            | NodeError::Closed(_)
            | NodeError::Io(_) => true,
            NodeError::Bind { .. }
            | NodeError::UnexpectedPacket { .. }
            | NodeError::InvalidListenPort(..)
            | NodeError::ShutDown
            | NodeError::Wire(_) => false,
        }
    }
}
