//! TCP transport: frames delimited by `FrameCodec`.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use super::{Connection, Connector, MessageSink, MessageStream};
use crate::codec::FrameCodec;
use crate::error::EnzoError;

type FramedTcp = Framed<TcpStream, FrameCodec>;

/// Connects to `tcp://host:port`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl TcpConnector {
    /// Wrap an already established stream, e.g. one accepted by a listener.
    pub fn from_stream(stream: TcpStream) -> Connection {
        let (writer, reader) = Framed::new(stream, FrameCodec::default()).split();
        Connection {
            sink: Box::new(TcpSink(writer)),
            stream: Box::new(TcpReader(reader)),
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, address: &str) -> Result<Connection, EnzoError> {
        let host = address.strip_prefix("tcp://").unwrap_or(address);
        if host.is_empty() {
            return Err(EnzoError::InvalidAddress(address.to_string()));
        }
        let stream = TcpStream::connect(host).await?;
        stream.set_nodelay(true)?;
        Ok(Self::from_stream(stream))
    }
}

struct TcpSink(SplitSink<FramedTcp, Bytes>);

#[async_trait]
impl MessageSink for TcpSink {
    async fn send(&mut self, message: Bytes) -> Result<(), EnzoError> {
        self.0.send(message).await
    }

    async fn close(&mut self) -> Result<(), EnzoError> {
        self.0.close().await
    }
}

struct TcpReader(SplitStream<FramedTcp>);

#[async_trait]
impl MessageStream for TcpReader {
    async fn recv(&mut self) -> Option<Result<Bytes, EnzoError>> {
        self.0.next().await
    }
}
