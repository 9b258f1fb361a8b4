//! meshchat-node: the flood-routing overlay and the chat client on top.
//!
//! [`OverlayNode`] owns the sockets: it accepts and dials peers, floods
//! packets to every connection, deduplicates by packet id, gossips known
//! addresses and repairs its primary link. [`ChatClient`] adds nicknames,
//! presence and message filtering.

pub mod addresses;
pub mod client;
pub mod connection;
pub mod dedup;
pub mod error;
pub mod node;
pub mod task;

pub use addresses::KnownAddresses;
pub use client::{BlockList, ChatClient, PresenceTable};
pub use connection::{ConnId, Connection, ConnectionTable};
pub use dedup::SeenSet;
pub use error::NodeError;
pub use node::{Inbox, NodeStats, OverlayNode};
pub use task::RepeatingTask;
