//! Message transports.
//!
//! The driver only needs a way to push whole messages out and to pull
//! whole messages in. `Connector` opens such a pair for an address.

mod memory;
mod tcp;
mod ws;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::EnzoError;

pub use memory::{MemoryConnector, MemoryListener, MemoryPeer};
pub use tcp::TcpConnector;
pub use ws::WsConnector;

/// Outbound half of a link.
#[async_trait]
pub trait MessageSink: Send {
    async fn send(&mut self, message: Bytes) -> Result<(), EnzoError>;

    /// Close the link with a normal closure.
    async fn close(&mut self) -> Result<(), EnzoError>;
}

/// Inbound half of a link. `None` means the peer closed it.
#[async_trait]
pub trait MessageStream: Send {
    async fn recv(&mut self) -> Option<Result<Bytes, EnzoError>>;
}

/// One opened link.
pub struct Connection {
    pub sink: Box<dyn MessageSink>,
    pub stream: Box<dyn MessageStream>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, address: &str) -> Result<Connection, EnzoError>;
}

/// Picks the transport from the address scheme: `ws://` or `tcp://`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConnector;

#[async_trait]
impl Connector for DefaultConnector {
    async fn connect(&self, address: &str) -> Result<Connection, EnzoError> {
        if address.starts_with("ws://") || address.starts_with("wss://") {
            WsConnector.connect(address).await
        } else if address.starts_with("tcp://") {
            TcpConnector.connect(address).await
        } else {
            Err(EnzoError::InvalidAddress(address.to_string()))
        }
    }
}
