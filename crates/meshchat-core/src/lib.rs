//! meshchat-core: wire format, stream de-framing, chat message schema and
//! configuration. No I/O; the node crate drives sockets.

pub mod config;
pub mod deframe;
pub mod message;
pub mod wire;

pub use config::MeshConfig;
pub use deframe::StreamDeframer;
pub use message::{ChatMessage, MessageKind};
pub use wire::{Packet, PacketKind, WireError};
