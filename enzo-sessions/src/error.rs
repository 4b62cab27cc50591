//! Errors returned by session operations.

use enzo_core::EnzoError;
use thiserror::Error;

use crate::wire::ValueTag;

#[derive(Debug, Error)]
pub enum SessionsError {
    /// The plugin was used before `Client::install`.
    #[error("sessions plugin is not installed")]
    NotInstalled,

    /// The server answered with no data at all.
    #[error("empty response")]
    Empty,

    /// The server reported a failure, e.g. a missing key.
    #[error("server error: {0}")]
    Remote(String),

    /// The stored value has a different type than requested.
    #[error("type mismatch: expected {expected:?}, found {found:#04x}")]
    TypeMismatch { expected: ValueTag, found: u8 },

    /// A response or value did not have the expected shape.
    #[error("malformed response: {0}")]
    Malformed(&'static str),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] EnzoError),
}

impl SessionsError {
    /// Returns `true` if the server reported the key as absent or expired.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionsError::Remote(msg) if msg.contains("not found"))
    }
}
