//! Frame type definitions.
//!
//! Unknown type bytes are rejected through `TryFrom`, never a panic.

use crate::error::EnzoError;
use std::fmt;

// ── MessageType ──────────────────────────────────────────────────

/// The first byte of every frame.
///
/// - `0x08..0x0A`: Link-level (close, liveness)
/// - `0x0B..0x0D`: Application traffic
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// The peer is closing the connection.
    Close = 0x08,
    /// Liveness probe; answered with a `Pong` carrying the same id.
    Ping = 0x09,
    /// Answer to a `Ping`.
    Pong = 0x0A,
    /// Request or push owned by an installed plugin.
    Plugin = 0x0B,
    /// Application request or push.
    Post = 0x0C,
    /// Reply to a `Post` or `Plugin` frame.
    Back = 0x0D,
}

impl TryFrom<u8> for MessageType {
    type Error = EnzoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x08 => Ok(MessageType::Close),
            0x09 => Ok(MessageType::Ping),
            0x0A => Ok(MessageType::Pong),
            0x0B => Ok(MessageType::Plugin),
            0x0C => Ok(MessageType::Post),
            0x0D => Ok(MessageType::Back),
            _ => Err(EnzoError::UnknownVariant {
                type_name: "MessageType",
                value: value as u64,
            }),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl MessageType {
    /// Returns `true` if the peer is expected to answer this frame.
    pub fn expects_response(&self) -> bool {
        matches!(
            self,
            MessageType::Ping | MessageType::Plugin | MessageType::Post
        )
    }

    /// Returns `true` for frames that settle a pending request.
    pub fn is_reply(&self) -> bool {
        matches!(self, MessageType::Back | MessageType::Pong)
    }
}
