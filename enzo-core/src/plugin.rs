//! Extension point for protocol plugins.
//!
//! A plugin owns a name and speaks on the reserved `Plugin` frame type
//! with keys of the form `"<name>|<op>"`. It never touches the client
//! directly, only the narrowed surface of [`PluginHost`].

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;

use crate::client::Outbound;
use crate::coerce::{self, IntoPayload};
use crate::context::Context;
use crate::correlation::Settle;
use crate::error::EnzoError;
use crate::frame::{Envelope, Frame};
use crate::id::MessageId;
use crate::message::MessageType;
use crate::router::{HandlerId, Router};

pub trait Plugin {
    /// Unique name; also the key prefix of every frame the plugin sends.
    fn name(&self) -> &str;

    /// Called once by `Client::install`.
    fn install(&mut self, host: PluginHost, message_type: MessageType);
}

/// The part of a client a plugin may use.
#[derive(Clone)]
pub struct PluginHost {
    name: Arc<str>,
    outbound: Outbound,
    router: Arc<Router>,
    message_type: MessageType,
}

impl PluginHost {
    pub(crate) fn new(
        name: String,
        outbound: Outbound,
        router: Arc<Router>,
        message_type: MessageType,
    ) -> Self {
        Self {
            name: name.into(),
            outbound,
            router,
            message_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// The wire key for `op`: `"<name>|<op>"`.
    pub fn key(&self, op: &str) -> String {
        format!("{}|{}", self.name, op)
    }

    /// A plugin frame for `op` with a fresh id.
    pub fn frame(&self, op: &str, data: Bytes) -> Frame {
        Frame::new(
            self.message_type,
            false,
            MessageId::random(),
            Some(Envelope::new(self.key(op), data)),
        )
    }

    /// Queue a frame; see `Client::write`.
    pub fn write(&self, frame: Frame, on_settle: Option<Settle>) -> Result<(), EnzoError> {
        self.outbound.send(frame, on_settle)
    }

    /// Send `op` and wait for the reply.
    pub async fn request(&self, op: &str, data: impl IntoPayload) -> Result<Context, EnzoError> {
        let frame = self.frame(op, data.into_payload()?);
        self.outbound.request(frame).await
    }

    /// Handle pushes addressed to `op`.
    pub fn on<F, Fut>(&self, op: &str, handler: F) -> HandlerId
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.router.on(self.key(op), handler)
    }

    pub fn off(&self, op: &str, id: HandlerId) -> bool {
        self.router.off(&self.key(op), id)
    }

    pub fn string_to_bytes(&self, s: &str) -> Bytes {
        coerce::string_to_bytes(s)
    }

    pub fn bytes_to_string(&self, bytes: &[u8]) -> Result<String, EnzoError> {
        coerce::bytes_to_string(bytes)
    }
}

impl std::fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHost")
            .field("name", &self.name)
            .field("message_type", &self.message_type)
            .finish()
    }
}
