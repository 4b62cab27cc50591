//! Domain-specific error types for the enzo protocol.
//!
//! All fallible operations return `Result<T, EnzoError>`.
//! Malformed input is reported as a value, never as a panic.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the enzo protocol.
#[derive(Debug, Error)]
pub enum EnzoError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// The buffer is too short to hold a frame header.
    #[error("frame too short: {len} bytes (header is {min})")]
    FrameTooShort { len: usize, min: usize },

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// The declared payload length does not match the bytes received.
    #[error("invalid payload length: declared {declared}, got {actual}")]
    InvalidPayloadLength { declared: usize, actual: usize },

    /// The key/data envelope inside a frame is inconsistent.
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),

    /// A frame exceeded the maximum encodable size.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// UTF-8 conversion failed.
    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The WebSocket layer reported an error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The endpoint address cannot be served by any transport.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A frame was written while no link was established.
    #[error("not connected")]
    NotConnected,

    /// The link dropped before the request settled.
    #[error("connection lost")]
    ConnectionLost,

    /// The client was disconnected by the user.
    #[error("connection closed")]
    ConnectionClosed,

    /// Establishing the connection failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// An internal channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Serialization Errors ─────────────────────────────────────
    /// JSON serialization or deserialization of a payload failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Application Errors ───────────────────────────────────────
    /// `Context::write` was called on a context that already replied.
    #[error("context already replied")]
    AlreadyReplied,

    /// A request with the same correlation token is still in flight.
    #[error("duplicate message id: {0}")]
    DuplicateMessageId(String),

    /// A plugin with this name is already installed.
    #[error("plugin already installed: {0}")]
    PluginAlreadyInstalled(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl EnzoError {
    /// Returns `true` for errors that retrying the connection cannot fix.
    pub fn is_fatal(&self) -> bool {
        use tokio_tungstenite::tungstenite::Error as WsError;

        matches!(
            self,
            EnzoError::InvalidAddress(_) | EnzoError::WebSocket(WsError::Url(_))
        )
    }

    /// Returns `true` if this error is a request deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, EnzoError::Timeout(_))
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for EnzoError {
    fn from(s: String) -> Self {
        EnzoError::Other(s)
    }
}

impl From<&str> for EnzoError {
    fn from(s: &str) -> Self {
        EnzoError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for EnzoError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        EnzoError::ChannelClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for EnzoError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        EnzoError::ChannelClosed
    }
}
