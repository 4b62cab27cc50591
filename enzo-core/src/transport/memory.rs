//! In-process transport.
//!
//! `MemoryConnector::pair` returns a connector for the client and a
//! listener standing in for the server. Every `connect` hands the
//! listener a `MemoryPeer` that speaks raw frames.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::{Connection, Connector, MessageSink, MessageStream};
use crate::error::EnzoError;
use crate::frame::Frame;
use crate::message::MessageType;

#[derive(Debug, Clone)]
pub struct MemoryConnector {
    accepts: mpsc::UnboundedSender<MemoryPeer>,
}

impl MemoryConnector {
    pub fn pair() -> (MemoryConnector, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        (MemoryConnector { accepts: tx }, MemoryListener { accepts: rx })
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, _address: &str) -> Result<Connection, EnzoError> {
        let (to_peer, from_client) = mpsc::unbounded_channel();
        let (to_client, from_peer) = mpsc::unbounded_channel();

        let peer = MemoryPeer {
            tx: Some(to_client),
            rx: from_client,
        };
        self.accepts.send(peer).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "listener dropped")
        })?;

        Ok(Connection {
            sink: Box::new(ChannelSink(Some(to_peer))),
            stream: Box::new(ChannelStream(from_peer)),
        })
    }
}

#[derive(Debug)]
pub struct MemoryListener {
    accepts: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryListener {
    /// Wait for the next client connection.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accepts.recv().await
    }
}

// ── MemoryPeer ───────────────────────────────────────────────────

/// The server side of one in-memory link.
#[derive(Debug)]
pub struct MemoryPeer {
    tx: Option<mpsc::UnboundedSender<Bytes>>,
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl MemoryPeer {
    /// Next raw message; `None` once the client closed the link.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Next message, decoded.
    pub async fn recv_frame(&mut self) -> Result<Frame, EnzoError> {
        let bytes = self.recv().await.ok_or(EnzoError::ConnectionClosed)?;
        Frame::decode(&bytes)
    }

    /// Next frame that is not a Ping; Pings are answered on the way.
    pub async fn recv_request(&mut self) -> Result<Frame, EnzoError> {
        loop {
            let frame = self.recv_frame().await?;
            if frame.message_type != MessageType::Ping {
                return Ok(frame);
            }
            self.send_frame(&Frame::pong(frame.id))?;
        }
    }

    pub fn send(&self, message: Bytes) -> Result<(), EnzoError> {
        let tx = self.tx.as_ref().ok_or(EnzoError::ConnectionClosed)?;
        tx.send(message)?;
        Ok(())
    }

    pub fn send_frame(&self, frame: &Frame) -> Result<(), EnzoError> {
        self.send(frame.encode()?)
    }

    /// Answer the client's opening Ping.
    pub async fn accept_handshake(&mut self) -> Result<(), EnzoError> {
        let ping = self.recv_frame().await?;
        if ping.message_type != MessageType::Ping {
            return Err(EnzoError::MalformedFrame("expected handshake ping"));
        }
        self.send_frame(&Frame::pong(ping.id))
    }

    /// Drop the server side of the link; the client sees a close.
    pub fn close(&mut self) {
        self.tx = None;
    }
}

// ── Client halves ────────────────────────────────────────────────

struct ChannelSink(Option<mpsc::UnboundedSender<Bytes>>);

#[async_trait]
impl MessageSink for ChannelSink {
    async fn send(&mut self, message: Bytes) -> Result<(), EnzoError> {
        let tx = self.0.as_ref().ok_or(EnzoError::ConnectionClosed)?;
        tx.send(message).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer dropped").into()
        })
    }

    async fn close(&mut self) -> Result<(), EnzoError> {
        self.0 = None;
        Ok(())
    }
}

struct ChannelStream(mpsc::UnboundedReceiver<Bytes>);

#[async_trait]
impl MessageStream for ChannelStream {
    async fn recv(&mut self) -> Option<Result<Bytes, EnzoError>> {
        self.0.recv().await.map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn messages_flow_both_ways() {
        let (connector, mut listener) = MemoryConnector::pair();
        let mut conn = connector.connect("memory").await.unwrap();
        let mut peer = listener.accept().await.unwrap();

        conn.sink.send(Bytes::from_static(b"up")).await.unwrap();
        assert_eq!(peer.recv().await.unwrap(), Bytes::from_static(b"up"));

        peer.send(Bytes::from_static(b"down")).unwrap();
        assert_eq!(conn.stream.recv().await.unwrap().unwrap(), Bytes::from_static(b"down"));
    }

    #[tokio::test]
    async fn peer_close_ends_the_stream() {
        let (connector, mut listener) = MemoryConnector::pair();
        let mut conn = connector.connect("memory").await.unwrap();
        let mut peer = listener.accept().await.unwrap();

        peer.close();
        assert!(conn.stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn client_close_is_seen_by_peer() {
        let (connector, mut listener) = MemoryConnector::pair();
        let mut conn = connector.connect("memory").await.unwrap();
        let mut peer = listener.accept().await.unwrap();

        conn.sink.close().await.unwrap();
        assert!(peer.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropped_listener_refuses() {
        let (connector, listener) = MemoryConnector::pair();
        drop(listener);
        assert!(matches!(
            connector.connect("memory").await,
            Err(EnzoError::Connection(_))
        ));
    }
}
