//! Connection lifecycle state machine.
//!
//! `ConnectionState` models the lifecycle of the client's single
//! link, with validated transitions that return `Result` instead of
//! panicking.

use crate::error::EnzoError;

// ── ConnectionState ──────────────────────────────────────────────

/// The current phase of the client connection.
///
/// ```text
///  Disconnected ──► Connecting ──► Connected
///       ▲             ▲    │          │
///       │             │    ▼          ▼
///       └──────────── Reconnecting ◄──┘
///
///  any ──► ClosedByUser ──► Connecting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No link and no reconnection scheduled.
    #[default]
    Disconnected,

    /// Transport opening or Ping/Pong handshake in progress.
    Connecting,

    /// Handshake complete; ready for traffic.
    Connected,

    /// Waiting out the backoff delay before the next attempt.
    Reconnecting,

    /// Closed by `disconnect()`; no automatic reconnection.
    ClosedByUser,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
            Self::ClosedByUser => write!(f, "ClosedByUser"),
        }
    }
}

impl ConnectionState {
    /// Returns `true` when the link is established and handshaken.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` while a link is being opened or a retry is pending.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }

    /// Returns `true` when nothing will happen without a new `connect()`.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Disconnected | Self::ClosedByUser)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        match (self, next) {
            (_, ClosedByUser) => true,
            (Disconnected | ClosedByUser | Reconnecting, Connecting) => true,
            (Connecting, Connected) => true,
            (Connecting | Connected, Reconnecting) => true,
            (Connecting | Connected | Reconnecting, Disconnected) => true,
            _ => false,
        }
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn transition(&mut self, next: ConnectionState) -> Result<(), EnzoError> {
        if !self.can_transition_to(next) {
            return Err(EnzoError::Other(format!(
                "invalid transition {self} -> {next}"
            )));
        }
        *self = next;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
