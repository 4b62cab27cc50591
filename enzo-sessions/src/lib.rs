//! # enzo-sessions
//!
//! Client for the server-side sessions store: a key-value map kept per
//! connection, reached through the `sessions|<op>` plugin keys.
//!
//! ```no_run
//! # async fn demo(client: enzo_core::Client) -> Result<(), enzo_sessions::SessionsError> {
//! let mut sessions = enzo_sessions::Sessions::new();
//! client.install(&mut sessions)?;
//! sessions.set_string("user", "ada", 0).await?;
//! assert_eq!(sessions.get_string("user").await?.as_deref(), Some("ada"));
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod wire;

use bytes::Bytes;
use enzo_core::{MessageType, Plugin, PluginHost};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use error::SessionsError;
pub use wire::ValueTag;

/// Plugin name and key prefix.
pub const PLUGIN_NAME: &str = "sessions";

/// A TTL of zero keeps the value until the connection ends.
pub const NO_EXPIRY: i32 = 0;

/// The sessions plugin. Install it on a client before use.
#[derive(Debug, Default)]
pub struct Sessions {
    host: Option<PluginHost>,
}

impl Plugin for Sessions {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn install(&mut self, host: PluginHost, message_type: MessageType) {
        tracing::debug!(%message_type, "sessions plugin installed");
        self.host = Some(host);
    }
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_installed(&self) -> bool {
        self.host.is_some()
    }

    /// Send `op` and unwrap the status envelope of the reply.
    async fn call(&self, op: &str, body: Bytes) -> Result<Bytes, SessionsError> {
        let host = self.host.as_ref().ok_or(SessionsError::NotInstalled)?;
        let reply = host.request(op, body).await?;
        wire::decode_response(reply.data())
    }

    // ── Reads ────────────────────────────────────────────────────

    /// The stored value, tag byte included. `None` when it is empty.
    pub async fn get_raw(&self, key: &str) -> Result<Option<Bytes>, SessionsError> {
        let value = self.call("get", wire::encode_get(key)).await?;
        Ok((!value.is_empty()).then_some(value))
    }

    pub async fn get_i32(&self, key: &str) -> Result<Option<i32>, SessionsError> {
        let Some(value) = self.get_raw(key).await? else {
            return Ok(None);
        };
        let rest = wire::expect_tag(&value, ValueTag::Int32)?;
        wire::decode_i32(rest).map(Some)
    }

    pub async fn get_string(&self, key: &str) -> Result<Option<String>, SessionsError> {
        let Some(value) = self.get_raw(key).await? else {
            return Ok(None);
        };
        let rest = wire::expect_tag(&value, ValueTag::String)?;
        let text = std::str::from_utf8(rest)
            .map_err(|_| SessionsError::Malformed("string value is not utf-8"))?;
        Ok(Some(text.to_owned()))
    }

    pub async fn get_bool(&self, key: &str) -> Result<Option<bool>, SessionsError> {
        let Some(value) = self.get_raw(key).await? else {
            return Ok(None);
        };
        let rest = wire::expect_tag(&value, ValueTag::Bool)?;
        Ok(Some(rest.first() == Some(&0x01)))
    }

    /// A string value parsed as JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SessionsError> {
        match self.get_string(key).await? {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Store `value` under `key` with its type tag.
    ///
    /// `ttl` is in seconds: zero never expires, a negative value deletes.
    pub async fn set_raw(
        &self,
        key: &str,
        tag: ValueTag,
        value: &[u8],
        ttl: i32,
    ) -> Result<(), SessionsError> {
        self.call("set", wire::encode_set(key, ttl, tag, value))
            .await
            .map(drop)
    }

    pub async fn set_i32(&self, key: &str, value: i32, ttl: i32) -> Result<(), SessionsError> {
        self.set_raw(key, ValueTag::Int32, &value.to_le_bytes(), ttl)
            .await
    }

    pub async fn set_string(&self, key: &str, value: &str, ttl: i32) -> Result<(), SessionsError> {
        self.set_raw(key, ValueTag::String, value.as_bytes(), ttl)
            .await
    }

    pub async fn set_bool(&self, key: &str, value: bool, ttl: i32) -> Result<(), SessionsError> {
        self.set_raw(key, ValueTag::Bool, &[value as u8], ttl).await
    }

    /// Store `value` as a JSON string.
    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: i32,
    ) -> Result<(), SessionsError> {
        let text = serde_json::to_string(value)?;
        self.set_string(key, &text, ttl).await
    }

    /// Change the expiry of an existing key. A negative `ttl` deletes it.
    pub async fn ttl(&self, key: &str, ttl: i32) -> Result<(), SessionsError> {
        self.call("ttl", wire::encode_ttl(key, ttl)).await.map(drop)
    }

    /// Remove `key`. The server does not answer deletes, so the empty
    /// acknowledgement counts as success.
    pub async fn del(&self, key: &str) -> Result<(), SessionsError> {
        match self.set_raw(key, ValueTag::Bool, &[], -1).await {
            Err(SessionsError::Empty) => Ok(()),
            other => other,
        }
    }

    /// Number of keys stored for this connection.
    pub async fn sizes(&self) -> Result<i32, SessionsError> {
        let body = self.call("sizes", Bytes::new()).await?;
        wire::decode_i32(&body)
    }

    /// Remove every key stored for this connection.
    pub async fn clean(&self) -> Result<(), SessionsError> {
        match self.call("clean", Bytes::new()).await {
            Ok(_) | Err(SessionsError::Empty) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn operations_require_install() {
        let sessions = Sessions::new();
        assert!(!sessions.is_installed());
        assert!(matches!(
            sessions.get_raw("k").await,
            Err(SessionsError::NotInstalled)
        ));
        assert!(matches!(sessions.clean().await, Err(SessionsError::NotInstalled)));
    }
}
