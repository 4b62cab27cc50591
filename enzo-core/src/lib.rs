//! # enzo-core
//!
//! Client side of the enzo protocol: request/response, pushes and
//! liveness over a single persistent duplex connection.
//!
//! This crate contains:
//! - **Wire types**: `Frame`, `Envelope`, `MessageType`, `MessageId`
//! - **Codec**: `FrameCodec` for framing byte-stream transports via `tokio_util`
//! - **Client**: `Client`, a cloneable handle onto one connection driver
//! - **Routing**: `Router` and `Context` for inbound pushes and replies
//! - **State**: `ConnectionState` and reconnection `Backoff`
//! - **Transport**: `Connector` with WebSocket, TCP and in-memory links
//! - **Plugins**: `Plugin` and `PluginHost`
//! - **Error**: `EnzoError`, a `thiserror`-based error hierarchy

pub mod client;
pub mod codec;
pub mod coerce;
pub mod context;
mod correlation;
pub mod error;
pub mod frame;
pub mod id;
pub mod message;
pub mod plugin;
pub mod router;
pub mod state;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use client::{Client, ClientOptions, LifecycleEvent};
pub use codec::FrameCodec;
pub use coerce::{IntoPayload, Json};
pub use context::Context;
pub use correlation::Settle;
pub use error::EnzoError;
pub use frame::{Envelope, Frame, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use id::{ID_LENGTH, MessageId, encode_token};
pub use message::MessageType;
pub use plugin::{Plugin, PluginHost};
pub use router::{HandlerId, Router};
pub use state::{Backoff, BackoffOptions, ConnectionState};
pub use transport::{
    Connection, Connector, DefaultConnector, MemoryConnector, MemoryListener, MemoryPeer,
    MessageSink, MessageStream, TcpConnector, WsConnector,
};
