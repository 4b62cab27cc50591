//! The per-message handle given to handlers and returned by requests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::client::Outbound;
use crate::coerce::{self, IntoPayload};
use crate::error::EnzoError;
use crate::frame::Frame;
use crate::id::MessageId;
use crate::message::MessageType;

/// One received message: a push or request from the peer, or the reply
/// to one of our requests.
///
/// Cloning is cheap; all clones share the "replied" flag, so the peer
/// gets at most one reply no matter how many handlers saw the message.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    message_type: MessageType,
    long_running: bool,
    id: MessageId,
    key: String,
    data: Bytes,
    replied: AtomicBool,
    outbound: Outbound,
}

impl Context {
    fn from_frame(frame: Frame, replied: bool, outbound: Outbound) -> Self {
        let (key, data) = frame
            .envelope
            .map(|e| (e.key, e.data))
            .unwrap_or_default();
        Self {
            inner: Arc::new(Inner {
                message_type: frame.message_type,
                long_running: frame.long_running,
                id: frame.id,
                key,
                data,
                replied: AtomicBool::new(replied),
                outbound,
            }),
        }
    }

    /// A request or push from the peer that still owes a reply.
    pub(crate) fn incoming(frame: Frame, outbound: Outbound) -> Self {
        Self::from_frame(frame, false, outbound)
    }

    /// The answer to one of our requests; it cannot be replied to.
    pub(crate) fn reply(frame: Frame, outbound: Outbound) -> Self {
        Self::from_frame(frame, true, outbound)
    }

    pub fn id(&self) -> MessageId {
        self.inner.id
    }

    pub fn token(&self) -> String {
        self.inner.id.token()
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    pub fn data(&self) -> &Bytes {
        &self.inner.data
    }

    pub fn message_type(&self) -> MessageType {
        self.inner.message_type
    }

    pub fn is_long_running(&self) -> bool {
        self.inner.long_running
    }

    pub fn is_replied(&self) -> bool {
        self.inner.replied.load(Ordering::Acquire)
    }

    /// The data as a UTF-8 string.
    pub fn text(&self) -> Result<String, EnzoError> {
        coerce::bytes_to_string(&self.inner.data)
    }

    /// The data parsed as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, EnzoError> {
        Ok(serde_json::from_slice(&self.inner.data)?)
    }

    /// Reply to this message.
    ///
    /// Only the first reply is sent; later calls return
    /// [`EnzoError::AlreadyReplied`]. Nothing is sent if `data` cannot
    /// be converted.
    pub fn write(&self, data: impl IntoPayload) -> Result<(), EnzoError> {
        let data = data.into_payload()?;
        if !self.claim_reply() {
            return Err(EnzoError::AlreadyReplied);
        }
        let frame = Frame::back(self.inner.id, self.inner.key.clone(), data);
        self.inner.outbound.send(frame, None)
    }

    /// Send a new short-lived request over the same client.
    pub async fn emit(&self, key: &str, data: impl IntoPayload) -> Result<Context, EnzoError> {
        let frame = Frame::post(key, data.into_payload()?);
        self.inner.outbound.request(frame).await
    }

    /// Mark the context replied; `false` if it already was.
    pub(crate) fn claim_reply(&self) -> bool {
        !self.inner.replied.swap(true, Ordering::AcqRel)
    }

    /// The empty reply sent when no handler answered in time.
    pub(crate) fn auto_reply(&self) -> Frame {
        Frame::back(self.inner.id, self.inner.key.clone(), Bytes::new())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("message_type", &self.inner.message_type)
            .field("id", &self.inner.id)
            .field("key", &self.inner.key)
            .field("data_len", &self.inner.data.len())
            .field("long_running", &self.inner.long_running)
            .field("replied", &self.is_replied())
            .finish()
    }
}
