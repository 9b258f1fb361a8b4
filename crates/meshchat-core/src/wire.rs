//! meshchat wire format: the frame every packet travels in.
//!
//! ```text
//! [kind: 1 byte][id: 8 bytes][size: 8 bytes][payload: size bytes]
//! ```
//!
//! `id` and `size` are written as 8 little-endian base-255 digits, each
//! digit stored as `digit + 1`. No header byte is ever zero, so a zero byte
//! on the stream is always a protocol error.
//!
//! The payload is UTF-8 text. `size` is its length in bytes and is never
//! stored separately from the payload itself.

use std::fmt;

use rand::Rng;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Digits used for each of the `id` and `size` header fields.
pub const FIELD_DIGITS: usize = 8;

/// Full header length: kind byte + id digits + size digits.
pub const HEADER_LEN: usize = 1 + FIELD_DIGITS + FIELD_DIGITS;

/// Radix of the header digit encoding.
const BASE: u64 = 255;

/// Smallest value that no longer fits in `FIELD_DIGITS` base-255 digits (255^8).
pub const FIELD_LIMIT: u64 = 17_878_103_347_812_890_625;

/// Exclusive upper bound for packet ids produced or assigned locally.
///
/// Every id below 2^60 fits in the 8-digit field. The full u64 range does
/// not (255^8 < 2^64), so generation and `set_id` share this bound.
pub const ID_LIMIT: u64 = 1 << 60;

// ── Packet kind ───────────────────────────────────────────────────────────────

/// What a packet means to the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Join request, first frame on a fresh outbound socket.
    Connection,
    /// Join acceptance; the joiner's reply carries its listen port.
    Confirmation,
    /// Gossip question: "which addresses do you know?"
    GetIp,
    /// Gossip answer or new-peer announcement, `"<tag>/<host:port>"`.
    Ip,
    /// A nickname entered the room.
    Login,
    /// A nickname left the room.
    Logout,
    /// Chat message, payload encoded by [`crate::message`].
    Message,
    /// Presence heartbeat carrying a nickname.
    Online,
    /// Untagged data. Has no wire byte and cannot be framed.
    Data,
}

impl PacketKind {
    /// One-letter wire tag. `Data` has an empty tag.
    pub fn tag(self) -> Option<u8> {
        match self {
            PacketKind::Connection => Some(b'c'),
            PacketKind::Confirmation => Some(b'y'),
            PacketKind::GetIp => Some(b'g'),
            PacketKind::Ip => Some(b'z'),
            PacketKind::Login => Some(b'n'),
            PacketKind::Logout => Some(b'o'),
            PacketKind::Message => Some(b's'),
            PacketKind::Online => Some(b'l'),
            PacketKind::Data => None,
        }
    }
}

impl TryFrom<u8> for PacketKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            b'c' => Ok(PacketKind::Connection),
            b'y' => Ok(PacketKind::Confirmation),
            b'g' => Ok(PacketKind::GetIp),
            b'z' => Ok(PacketKind::Ip),
            b'n' => Ok(PacketKind::Login),
            b'o' => Ok(PacketKind::Logout),
            b's' => Ok(PacketKind::Message),
            b'l' => Ok(PacketKind::Online),
            other => Err(WireError::UnknownPacketKind(other)),
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketKind::Connection => "CONNECTION",
            PacketKind::Confirmation => "CONFIRMATION",
            PacketKind::GetIp => "GET_IP",
            PacketKind::Ip => "IP",
            PacketKind::Login => "LOGIN",
            PacketKind::Logout => "LOGOUT",
            PacketKind::Message => "MESSAGE",
            PacketKind::Online => "ONLINE",
            PacketKind::Data => "DATA",
        };
        f.write_str(name)
    }
}

// ── Packet ────────────────────────────────────────────────────────────────────

/// The wire-level unit of the overlay.
///
/// `id` is the network-wide deduplication key. It is random unless supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    kind: PacketKind,
    id: u64,
    payload: String,
}

impl Packet {
    /// New packet with a fresh random id.
    pub fn new(kind: PacketKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            id: random_id(),
            payload: payload.into(),
        }
    }

    /// New packet with an explicit id. The id must be below [`ID_LIMIT`].
    pub fn with_id(kind: PacketKind, id: u64, payload: impl Into<String>) -> Result<Self, WireError> {
        check_id(id)?;
        Ok(Self {
            kind,
            id,
            payload: payload.into(),
        })
    }

    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Reassign the id. Rejects values outside `0..ID_LIMIT`.
    pub fn set_id(&mut self, id: u64) -> Result<(), WireError> {
        check_id(id)?;
        self.id = id;
        Ok(())
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn into_payload(self) -> String {
        self.payload
    }

    /// Payload length in bytes: the value written to the `size` field.
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// Serialize into a complete frame.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let tag = self.kind.tag().ok_or(WireError::UnencodableKind(self.kind))?;
        let size = self.size() as u64;
        if size >= FIELD_LIMIT {
            return Err(WireError::PayloadTooLarge(self.size()));
        }

        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.push(tag);
        write_digits(&mut out, self.id);
        write_digits(&mut out, size);
        out.extend_from_slice(self.payload.as_bytes());
        Ok(out)
    }

    /// Parse one frame from the front of `bytes`.
    ///
    /// Bytes past the declared payload are ignored. Ids read from the wire
    /// are taken as-is; only locally assigned ids are range checked.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < HEADER_LEN {
            return Err(WireError::MalformedFrame);
        }
        let kind = PacketKind::try_from(bytes[0])?;
        let id = read_digits(&bytes[1..1 + FIELD_DIGITS])?;
        let size = peek_payload_size(bytes)?;

        let end = HEADER_LEN
            .checked_add(size)
            .ok_or(WireError::MalformedFrame)?;
        let body = bytes.get(HEADER_LEN..end).ok_or(WireError::MalformedFrame)?;
        let payload = std::str::from_utf8(body)
            .map_err(|_| WireError::InvalidPayload)?
            .to_owned();

        Ok(Self { kind, id, payload })
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {} : {}", self.kind, self.id, self.payload)
    }
}

/// Random id in the canonical range.
pub fn random_id() -> u64 {
    rand::thread_rng().gen_range(0..ID_LIMIT)
}

/// Declared payload size of the frame at the front of `buffer`.
///
/// Only the header is inspected. Fails with `MalformedFrame` when fewer
/// than [`HEADER_LEN`] bytes are available.
pub fn peek_payload_size(buffer: &[u8]) -> Result<usize, WireError> {
    if buffer.len() < HEADER_LEN {
        return Err(WireError::MalformedFrame);
    }
    let size = read_digits(&buffer[1 + FIELD_DIGITS..HEADER_LEN])?;
    usize::try_from(size).map_err(|_| WireError::MalformedFrame)
}

fn check_id(id: u64) -> Result<(), WireError> {
    if id < ID_LIMIT {
        Ok(())
    } else {
        Err(WireError::IdOutOfRange(id))
    }
}

fn write_digits(out: &mut Vec<u8>, mut value: u64) {
    for _ in 0..FIELD_DIGITS {
        out.push((value % BASE) as u8 + 1);
        value /= BASE;
    }
}

fn read_digits(field: &[u8]) -> Result<u64, WireError> {
    let mut value = 0u64;
    let mut scale = 1u64;
    for (i, &byte) in field.iter().enumerate() {
        if byte == 0 {
            return Err(WireError::MalformedFrame);
        }
        value += u64::from(byte - 1) * scale;
        if i + 1 < field.len() {
            scale *= BASE;
        }
    }
    Ok(value)
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when framing or parsing packets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("malformed frame")]
    MalformedFrame,

    #[error("unknown packet kind byte: 0x{0:02x}")]
    UnknownPacketKind(u8),

    #[error("packet kind {0} has no wire tag")]
    UnencodableKind(PacketKind),

    #[error("payload is not valid UTF-8")]
    InvalidPayload,

    #[error("payload length {0} does not fit the size field")]
    PayloadTooLarge(usize),

    #[error("packet id {0} outside 0..2^60")]
    IdOutOfRange(u64),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
