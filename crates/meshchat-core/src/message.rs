//! Chat message schema: the text carried inside a MESSAGE packet.
//!
//! ```text
//! shared:  s:<sender>:<text>
//! private: p:<addressee>:<sender>:<text>
//! ```
//!
//! Fields are colon-separated. Everything after the sender is the text,
//! so the text itself may contain colons.

use std::fmt;

const SEPARATOR: char = ':';

/// Who a message is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Everyone in the room.
    Shared,
    /// One addressee (the sender sees it too).
    Private,
}

impl MessageKind {
    pub fn tag(self) -> &'static str {
        match self {
            MessageKind::Shared => "s",
            MessageKind::Private => "p",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "s" => Some(MessageKind::Shared),
            "p" => Some(MessageKind::Private),
            _ => None,
        }
    }
}

/// Application-level chat message.
///
/// Kind and addressee are fixed by the constructor: a private message
/// always has an addressee and a shared one never does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    kind: MessageKind,
    pub text: String,
    /// Nickname of the author. Stamped by the client on send.
    pub sender: String,
    addressee: Option<String>,
}

impl ChatMessage {
    /// Message for the whole room. The sender is filled in on send.
    pub fn shared(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Shared,
            text: text.into(),
            sender: String::new(),
            addressee: None,
        }
    }

    /// Message for a single nickname.
    pub fn private(addressee: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Private,
            text: text.into(),
            sender: String::new(),
            addressee: Some(addressee.into()),
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn is_private(&self) -> bool {
        self.kind == MessageKind::Private
    }

    /// Target nickname of a private message.
    pub fn addressee(&self) -> Option<&str> {
        self.addressee.as_deref()
    }

    /// Payload text for a MESSAGE packet.
    pub fn encode(&self) -> String {
        match &self.addressee {
            None => format!("s:{}:{}", self.sender, self.text),
            Some(to) => format!("p:{}:{}:{}", to, self.sender, self.text),
        }
    }

    /// Parse a MESSAGE payload.
    pub fn decode(payload: &str) -> Result<Self, MessageError> {
        let tag = payload.split(SEPARATOR).next().unwrap_or_default();
        let kind = MessageKind::from_tag(tag)
            .ok_or_else(|| MessageError::UnknownMessageKind(tag.to_owned()))?;

        // The last field keeps every remaining separator.
        let field_count = match kind {
            MessageKind::Shared => 3,
            MessageKind::Private => 4,
        };
        let mut fields = payload.splitn(field_count, SEPARATOR).skip(1);

        let addressee = match kind {
            MessageKind::Private => Some(fields.next().ok_or(MessageError::MissingField("addressee"))?),
            MessageKind::Shared => None,
        };
        let sender = fields.next().ok_or(MessageError::MissingField("sender"))?;
        let text = fields.next().ok_or(MessageError::MissingField("text"))?;

        Ok(Self {
            kind,
            text: text.to_owned(),
            sender: sender.to_owned(),
            addressee: addressee.map(str::to_owned),
        })
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MessageKind::Shared => write!(f, "{}: {}", self.sender, self.text),
            MessageKind::Private => write!(f, "(private) {}: {}", self.sender, self.text),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("unknown message kind: {0:?}")]
    UnknownMessageKind(String),

    #[error("message is missing its {0} field")]
    MissingField(&'static str),
}
