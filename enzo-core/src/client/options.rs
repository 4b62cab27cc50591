//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::state::BackoffOptions;

/// Options recognised by `Client::new`.
///
/// Every field has a default, so a config file only needs the values it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Endpoint URI: `ws://host:port/path` or `tcp://host:port`.
    pub address: String,
    /// Connect as soon as the client is constructed.
    pub auto_connect: bool,
    /// Reconnect automatically after an unexpected disconnect.
    pub always_reconnect: bool,
    /// Deadline for `emit`, in milliseconds.
    pub request_timeout_ms: u64,
    /// Window after which an unanswered request is acknowledged, in milliseconds.
    pub auto_ack_ms: u64,
    /// Ping interval while connected, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Deadline for opening the transport plus the handshake, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Deadline for a Pong, in milliseconds.
    pub ping_timeout_ms: u64,
    /// Reconnection delays.
    pub backoff: BackoffOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            address: "ws://127.0.0.1:8080/ws".into(),
            auto_connect: true,
            always_reconnect: true,
            request_timeout_ms: 6_000,
            auto_ack_ms: 3_000,
            heartbeat_interval_ms: 15_000,
            connect_timeout_ms: 5_000,
            ping_timeout_ms: 5_000,
            backoff: BackoffOptions::default(),
        }
    }
}

impl ClientOptions {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn auto_ack(&self) -> Duration {
        Duration::from_millis(self.auto_ack_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }
}
